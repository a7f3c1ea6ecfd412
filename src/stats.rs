//! Index statistics and health overview.
//!
//! One gather pass feeds both the `flog stats` CLI command and the admin
//! stats endpoint: post and comment totals, view counts, the per-category
//! breakdown, and the most recent activity.

use anyhow::Result;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::models::format_ts_iso;

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub total_posts: i64,
    pub visible_posts: i64,
    pub hidden_posts: i64,
    pub total_comments: i64,
    pub visible_comments: i64,
    pub total_views: i64,
    pub categories: Vec<CategoryStat>,
    pub recent_posts: Vec<RecentPost>,
    pub recent_comments: Vec<RecentComment>,
}

/// Post count per category, hidden posts included.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryStat {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentPost {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub view_count: i64,
    pub created_at: String, // ISO8601
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentComment {
    pub id: i64,
    pub post_id: i64,
    pub author_name: String,
    pub created_at: String, // ISO8601
}

const RECENT_LIMIT: i64 = 5;

pub async fn gather(pool: &SqlitePool) -> Result<StatsReport> {
    let total_posts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await?;
    let visible_posts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE is_hidden = 0")
        .fetch_one(pool)
        .await?;
    let total_comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
        .fetch_one(pool)
        .await?;
    let visible_comments: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE is_hidden = 0")
            .fetch_one(pool)
            .await?;
    let total_views: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(view_count), 0) FROM posts")
        .fetch_one(pool)
        .await?;

    let category_rows = sqlx::query(
        "SELECT category, COUNT(*) AS count FROM posts GROUP BY category ORDER BY count DESC, category ASC",
    )
    .fetch_all(pool)
    .await?;
    let categories = category_rows
        .iter()
        .map(|row| CategoryStat {
            name: row.get("category"),
            count: row.get("count"),
        })
        .collect();

    let recent_post_rows = sqlx::query(
        "SELECT id, slug, title, view_count, created_at FROM posts ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(RECENT_LIMIT)
    .fetch_all(pool)
    .await?;
    let recent_posts = recent_post_rows
        .iter()
        .map(|row| RecentPost {
            id: row.get("id"),
            slug: row.get("slug"),
            title: row.get("title"),
            view_count: row.get("view_count"),
            created_at: format_ts_iso(row.get("created_at")),
        })
        .collect();

    let recent_comment_rows = sqlx::query(
        "SELECT id, post_id, author_name, created_at FROM comments ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(RECENT_LIMIT)
    .fetch_all(pool)
    .await?;
    let recent_comments = recent_comment_rows
        .iter()
        .map(|row| RecentComment {
            id: row.get("id"),
            post_id: row.get("post_id"),
            author_name: row.get("author_name"),
            created_at: format_ts_iso(row.get("created_at")),
        })
        .collect();

    Ok(StatsReport {
        total_posts,
        visible_posts,
        hidden_posts: total_posts - visible_posts,
        total_comments,
        visible_comments,
        total_views,
        categories,
        recent_posts,
        recent_comments,
    })
}

/// Run the stats command: query the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    crate::migrate::run_migrations(&pool).await?;
    let report = gather(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Flog — Index Stats");
    println!("==================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!(
        "  Posts:       {} ({} visible, {} hidden)",
        report.total_posts, report.visible_posts, report.hidden_posts
    );
    println!(
        "  Comments:    {} ({} visible)",
        report.total_comments, report.visible_comments
    );
    println!("  Views:       {}", report.total_views);

    if !report.categories.is_empty() {
        println!();
        println!("  By category:");
        println!("  {:<32} {:>6}", "CATEGORY", "POSTS");
        println!("  {}", "-".repeat(40));
        for c in &report.categories {
            let name = if c.name.is_empty() { "(none)" } else { &c.name };
            println!("  {:<32} {:>6}", name, c.count);
        }
    }

    if !report.recent_posts.is_empty() {
        println!();
        println!("  Recent posts:");
        for p in &report.recent_posts {
            println!(
                "    {}  {} ({} views)",
                format_ts_relative(&p.created_at),
                p.title,
                p.view_count
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Render an ISO timestamp as a relative age (e.g. "3 days ago").
fn format_ts_relative(iso: &str) -> String {
    let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(iso) else {
        return iso.to_string();
    };
    let delta = chrono::Utc::now().timestamp() - parsed.timestamp();

    if delta < 0 {
        return iso.to_string();
    }
    if delta < 3600 {
        let mins = (delta / 60).max(1);
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        iso.to_string()
    }
}
