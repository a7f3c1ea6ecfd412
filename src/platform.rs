//! Site metadata: a single pinned row, seeded from config.

use anyhow::Result;
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::config::SiteConfig;
use crate::models::Platform;

/// Insert the platform row if it does not exist yet. Later config changes
/// do not overwrite it; the row is owned by the admin API once seeded.
pub async fn ensure_platform(pool: &SqlitePool, site: &SiteConfig) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO platform (id, title, description, footer) VALUES (1, ?, ?, ?)",
    )
    .bind(&site.title)
    .bind(&site.description)
    .bind(&site.footer)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_platform(pool: &SqlitePool) -> Result<Option<Platform>> {
    let row = sqlx::query("SELECT title, description, footer FROM platform WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| Platform {
        title: row.get("title"),
        description: row.get("description"),
        footer: row.get("footer"),
    }))
}

/// Partial admin update; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub footer: Option<String>,
}

pub async fn update_platform(
    pool: &SqlitePool,
    changes: &PlatformUpdate,
) -> Result<Option<Platform>> {
    sqlx::query(
        r#"
        UPDATE platform
        SET title = COALESCE(?, title),
            description = COALESCE(?, description),
            footer = COALESCE(?, footer)
        WHERE id = 1
        "#,
    )
    .bind(&changes.title)
    .bind(&changes.description)
    .bind(&changes.footer)
    .execute(pool)
    .await?;

    get_platform(pool).await
}
