//! Comment repository and thread assembly.
//!
//! Comments live in one flat table; a reply points at its parent by id.
//! Threads are assembled on read by iterative passes over that flat set:
//! depth falls out of walking rows in creation order (a parent always
//! precedes its replies), and children are attached deepest-first so no
//! recursion is needed anywhere. A hidden comment takes its whole subtree
//! out of public view; deleting one removes the subtree through the
//! foreign-key cascade.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;

use crate::models::{clamp_page_params, format_ts_iso, page_offset, Page};

/// One comment in an assembled thread, public shape. Author emails stay
/// out of public payloads.
#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    pub id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub author_name: String,
    pub author_link: Option<String>,
    pub level: i64,
    pub reply_count: i64,
    pub created_at: String, // ISO8601
    pub replies: Vec<CommentNode>,
}

/// Flat moderation row, admin shape.
#[derive(Debug, Clone, Serialize)]
pub struct AdminComment {
    pub id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub author_link: Option<String>,
    pub is_hidden: bool,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
}

/// Incoming comment submission.
#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    pub post_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    pub content: String,
    pub author_name: String,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub author_link: Option<String>,
}

/// What happened to a submission. Absence of the post or a bad parent is an
/// expected outcome, not a fault.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(i64),
    PostNotFound,
    InvalidParent,
}

/// Validate and store a new comment.
///
/// The post must exist and be visible; a reply's parent must be a visible
/// comment on that same post.
pub async fn create(pool: &SqlitePool, input: &NewComment) -> Result<CreateOutcome> {
    let post_hidden: Option<bool> = sqlx::query_scalar("SELECT is_hidden FROM posts WHERE id = ?")
        .bind(input.post_id)
        .fetch_optional(pool)
        .await?;
    match post_hidden {
        Some(false) => {}
        _ => return Ok(CreateOutcome::PostNotFound),
    }

    if let Some(parent_id) = input.parent_id {
        let parent = sqlx::query("SELECT post_id, is_hidden FROM comments WHERE id = ?")
            .bind(parent_id)
            .fetch_optional(pool)
            .await?;
        let valid = parent
            .map(|row| {
                row.get::<i64, _>("post_id") == input.post_id && !row.get::<bool, _>("is_hidden")
            })
            .unwrap_or(false);
        if !valid {
            return Ok(CreateOutcome::InvalidParent);
        }
    }

    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        INSERT INTO comments (post_id, parent_id, content, author_name, author_email,
                              author_link, is_hidden, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(input.post_id)
    .bind(input.parent_id)
    .bind(&input.content)
    .bind(&input.author_name)
    .bind(&input.author_email)
    .bind(&input.author_link)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(CreateOutcome::Created(result.last_insert_rowid()))
}

/// Raw material for thread assembly.
struct ThreadRow {
    id: i64,
    post_id: i64,
    parent_id: Option<i64>,
    content: String,
    author_name: String,
    author_link: Option<String>,
    created_at: i64,
}

fn thread_row(row: &SqliteRow) -> ThreadRow {
    ThreadRow {
        id: row.get("id"),
        post_id: row.get("post_id"),
        parent_id: row.get("parent_id"),
        content: row.get("content"),
        author_name: row.get("author_name"),
        author_link: row.get("author_link"),
        created_at: row.get("created_at"),
    }
}

/// Assemble a nested thread from flat rows ordered by creation.
///
/// First pass walks rows in creation order computing each node's level from
/// its parent's; a row whose parent is not in the set (hidden or gone) is
/// dropped along with everything under it. Second pass attaches children to
/// parents deepest level first, so a parent is still addressable in the map
/// while its children move in. Roots come back in creation order.
fn assemble(rows: Vec<ThreadRow>) -> Vec<CommentNode> {
    let mut levels: HashMap<i64, i64> = HashMap::new();
    let mut nodes: HashMap<i64, CommentNode> = HashMap::new();
    // (id, parent_id, level) in creation order.
    let mut accepted: Vec<(i64, Option<i64>, i64)> = Vec::new();

    for row in rows {
        let level = match row.parent_id {
            None => 0,
            Some(parent_id) => match levels.get(&parent_id) {
                Some(parent_level) => parent_level + 1,
                None => continue,
            },
        };
        levels.insert(row.id, level);
        accepted.push((row.id, row.parent_id, level));
        nodes.insert(
            row.id,
            CommentNode {
                id: row.id,
                post_id: row.post_id,
                parent_id: row.parent_id,
                content: row.content,
                author_name: row.author_name,
                author_link: row.author_link,
                level,
                reply_count: 0,
                created_at: format_ts_iso(row.created_at),
                replies: Vec::new(),
            },
        );
    }

    let mut attach_order = accepted.clone();
    attach_order.sort_by_key(|(id, _, level)| (std::cmp::Reverse(*level), *id));
    for (id, parent_id, _) in attach_order {
        let Some(parent_id) = parent_id else { continue };
        let node = nodes.remove(&id).expect("child node present by construction");
        let parent = nodes
            .get_mut(&parent_id)
            .expect("parent outlives children by level order");
        parent.reply_count += 1;
        parent.replies.push(node);
    }

    accepted
        .iter()
        .filter(|(_, parent_id, _)| parent_id.is_none())
        .filter_map(|(id, _, _)| nodes.remove(id))
        .collect()
}

async fn visible_thread_rows(pool: &SqlitePool, post_id: i64) -> Result<Vec<ThreadRow>> {
    let rows = sqlx::query(
        r#"
        SELECT id, post_id, parent_id, content, author_name, author_link, created_at
        FROM comments
        WHERE post_id = ? AND is_hidden = 0
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(thread_row).collect())
}

/// Visible comment tree for one post, top-level page windowed.
///
/// `total` counts visible top-level comments; replies ride along nested in
/// their parents and do not affect pagination.
pub async fn thread_for_post(
    pool: &SqlitePool,
    post_id: i64,
    page: i64,
    size: i64,
) -> Result<Page<CommentNode>> {
    let (page, size) = clamp_page_params(page, size);
    let roots = assemble(visible_thread_rows(pool, post_id).await?);

    let total = roots.len() as i64;
    let items = roots
        .into_iter()
        .skip(page_offset(page, size) as usize)
        .take(size as usize)
        .collect();

    Ok(Page {
        total,
        page,
        size,
        items,
    })
}

/// Direct and nested replies under one visible comment, or None if the
/// comment itself is absent or hidden.
pub async fn replies_for_comment(
    pool: &SqlitePool,
    comment_id: i64,
) -> Result<Option<Vec<CommentNode>>> {
    let target = sqlx::query("SELECT post_id, is_hidden FROM comments WHERE id = ?")
        .bind(comment_id)
        .fetch_optional(pool)
        .await?;
    let post_id = match target {
        Some(row) if !row.get::<bool, _>("is_hidden") => row.get::<i64, _>("post_id"),
        _ => return Ok(None),
    };

    let roots = assemble(visible_thread_rows(pool, post_id).await?);

    // Iterative search for the node; its subtree was already assembled.
    let mut stack: Vec<CommentNode> = roots;
    while let Some(node) = stack.pop() {
        if node.id == comment_id {
            return Ok(Some(node.replies));
        }
        stack.extend(node.replies);
    }
    Ok(Some(Vec::new()))
}

/// All comments for moderation, newest first, optionally filtered by
/// visibility or post.
pub async fn list_admin(
    pool: &SqlitePool,
    page: i64,
    size: i64,
    hidden: Option<bool>,
    post_id: Option<i64>,
) -> Result<Page<AdminComment>> {
    let (page, size) = clamp_page_params(page, size);

    let mut conditions: Vec<String> = Vec::new();
    match hidden {
        Some(true) => conditions.push("is_hidden = 1".to_string()),
        Some(false) => conditions.push("is_hidden = 0".to_string()),
        None => {}
    }
    if post_id.is_some() {
        conditions.push("post_id = ?".to_string());
    }
    let where_sql = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM comments {}", where_sql);
    let mut count_query = sqlx::query_scalar(&count_sql);
    if let Some(post_id) = post_id {
        count_query = count_query.bind(post_id);
    }
    let total: i64 = count_query.fetch_one(pool).await?;

    let list_sql = format!(
        r#"
        SELECT id, post_id, parent_id, content, author_name, author_email,
               author_link, is_hidden, created_at, updated_at
        FROM comments {}
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );
    let mut list_query = sqlx::query(&list_sql);
    if let Some(post_id) = post_id {
        list_query = list_query.bind(post_id);
    }
    let rows = list_query
        .bind(size)
        .bind(page_offset(page, size))
        .fetch_all(pool)
        .await?;

    let items = rows
        .iter()
        .map(|row| AdminComment {
            id: row.get("id"),
            post_id: row.get("post_id"),
            parent_id: row.get("parent_id"),
            content: row.get("content"),
            author_name: row.get("author_name"),
            author_email: row.get("author_email"),
            author_link: row.get("author_link"),
            is_hidden: row.get("is_hidden"),
            created_at: format_ts_iso(row.get("created_at")),
            updated_at: format_ts_iso(row.get("updated_at")),
        })
        .collect();

    Ok(Page {
        total,
        page,
        size,
        items,
    })
}

/// Moderation visibility toggle. Returns false if the comment is absent.
pub async fn set_hidden(pool: &SqlitePool, id: i64, hidden: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE comments SET is_hidden = ?, updated_at = ? WHERE id = ?")
        .bind(hidden)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove a comment and, through the cascade, everything under it.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
