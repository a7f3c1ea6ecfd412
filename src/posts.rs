//! Post repository: queries and admin mutations over the indexed rows.
//!
//! Reconciliation owns the content-derived columns; everything here either
//! reads, accounts reads (`view_count`), or applies the small set of admin
//! overrides (visibility, metadata edits, deletion). Lookups that can miss
//! return `Option`/`bool` rather than errors so callers decide what absence
//! means.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::models::{clamp_page_params, format_ts_iso, page_offset, Page};

/// Listing row: everything but the body.
#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub category: String,
    pub view_count: i64,
    pub is_hidden: bool,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
}

/// Full post, body included.
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub category: String,
    pub content: String,
    pub file_path: String,
    pub file_hash: String,
    pub view_count: i64,
    pub is_hidden: bool,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
}

/// One category with its visible post count.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: i64,
}

/// Admin metadata edit; absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostMetaUpdate {
    pub title: Option<String>,
    pub category: Option<String>,
    pub slug: Option<String>,
    pub is_hidden: Option<bool>,
}

const SUMMARY_COLUMNS: &str =
    "id, slug, title, category, view_count, is_hidden, created_at, updated_at";
const DETAIL_COLUMNS: &str = "id, slug, title, category, content, file_path, file_hash, \
     view_count, is_hidden, created_at, updated_at";

fn summary_from_row(row: &SqliteRow) -> PostSummary {
    PostSummary {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        category: row.get("category"),
        view_count: row.get("view_count"),
        is_hidden: row.get("is_hidden"),
        created_at: format_ts_iso(row.get("created_at")),
        updated_at: format_ts_iso(row.get("updated_at")),
    }
}

fn detail_from_row(row: &SqliteRow) -> PostDetail {
    PostDetail {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        category: row.get("category"),
        content: row.get("content"),
        file_path: row.get("file_path"),
        file_hash: row.get("file_hash"),
        view_count: row.get("view_count"),
        is_hidden: row.get("is_hidden"),
        created_at: format_ts_iso(row.get("created_at")),
        updated_at: format_ts_iso(row.get("updated_at")),
    }
}

/// Visible posts, newest first, with optional category and substring search.
pub async fn list_public(
    pool: &SqlitePool,
    page: i64,
    size: i64,
    category: Option<&str>,
    search: Option<&str>,
) -> Result<Page<PostSummary>> {
    let (page, size) = clamp_page_params(page, size);

    let mut conditions = vec!["is_hidden = 0".to_string()];
    let mut binds: Vec<String> = Vec::new();

    if let Some(category) = category {
        conditions.push("category = ?".to_string());
        binds.push(category.to_string());
    }
    if let Some(term) = search {
        let term = term.trim();
        if !term.is_empty() {
            conditions.push("(title LIKE ? OR content LIKE ?)".to_string());
            let pattern = format!("%{}%", term);
            binds.push(pattern.clone());
            binds.push(pattern);
        }
    }
    let where_sql = conditions.join(" AND ");

    let count_sql = format!("SELECT COUNT(*) FROM posts WHERE {}", where_sql);
    let mut count_query = sqlx::query_scalar(&count_sql);
    for bind in &binds {
        count_query = count_query.bind(bind);
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;

    let list_sql = format!(
        "SELECT {} FROM posts WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        SUMMARY_COLUMNS, where_sql
    );
    let mut list_query = sqlx::query(&list_sql);
    for bind in &binds {
        list_query = list_query.bind(bind);
    }
    let rows = list_query
        .bind(size)
        .bind(page_offset(page, size))
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    Ok(Page {
        total,
        page,
        size,
        items: rows.iter().map(summary_from_row).collect(),
    })
}

/// Every post, hidden ones included unless filtered.
pub async fn list_admin(
    pool: &SqlitePool,
    page: i64,
    size: i64,
    hidden: Option<bool>,
) -> Result<Page<PostSummary>> {
    let (page, size) = clamp_page_params(page, size);

    let where_sql = match hidden {
        Some(true) => "WHERE is_hidden = 1",
        Some(false) => "WHERE is_hidden = 0",
        None => "",
    };

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM posts {}", where_sql))
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM posts {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        SUMMARY_COLUMNS, where_sql
    ))
    .bind(size)
    .bind(page_offset(page, size))
    .fetch_all(pool)
    .await?;

    Ok(Page {
        total,
        page,
        size,
        items: rows.iter().map(summary_from_row).collect(),
    })
}

pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<PostDetail>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", DETAIL_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(detail_from_row))
}

pub async fn get_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<PostDetail>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM posts WHERE slug = ?",
        DETAIL_COLUMNS
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(detail_from_row))
}

/// Read-traffic accounting. The only code path that writes `view_count`.
pub async fn increment_view_count(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Categories of visible posts with their counts. Posts sitting directly in
/// the content root have no category and are not listed here.
pub async fn list_categories(pool: &SqlitePool) -> Result<Vec<CategoryCount>> {
    let rows = sqlx::query(
        r#"
        SELECT category, COUNT(*) AS count
        FROM posts
        WHERE is_hidden = 0 AND category != ''
        GROUP BY category
        ORDER BY category ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| CategoryCount {
            name: row.get("category"),
            count: row.get("count"),
        })
        .collect())
}

/// Apply an admin metadata edit. Returns false if the post does not exist.
pub async fn update_meta(pool: &SqlitePool, id: i64, changes: &PostMetaUpdate) -> Result<bool> {
    let mut sets = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    if let Some(ref title) = changes.title {
        sets.push("title = ?");
        binds.push(title.clone());
    }
    if let Some(ref category) = changes.category {
        sets.push("category = ?");
        binds.push(category.clone());
    }
    if let Some(ref slug) = changes.slug {
        sets.push("slug = ?");
        binds.push(slug.clone());
    }

    let hidden_bind = changes.is_hidden;
    if hidden_bind.is_some() {
        sets.push("is_hidden = ?");
    }

    if sets.is_empty() {
        // Nothing to change; report whether the row exists.
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?;
        return Ok(exists > 0);
    }

    sets.push("updated_at = ?");
    let sql = format!("UPDATE posts SET {} WHERE id = ?", sets.join(", "));

    let mut query = sqlx::query(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    if let Some(hidden) = hidden_bind {
        query = query.bind(hidden);
    }
    let result = query
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update post")?;

    Ok(result.rows_affected() > 0)
}

/// Admin visibility toggle. Returns false if the post does not exist.
pub async fn set_hidden(pool: &SqlitePool, id: i64, hidden: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE posts SET is_hidden = ? WHERE id = ?")
        .bind(hidden)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove a post row; its comments go with it via the cascade.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
