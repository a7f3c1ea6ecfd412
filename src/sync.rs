//! Content reconciliation engine.
//!
//! Coordinates the full sync flow: scan → diff → transactional apply. The
//! scanner produces one descriptor per file on disk, the planner diffs those
//! descriptors against the persisted index keyed by relative path, and the
//! applier commits the resulting plan in a single transaction. A failed run
//! rolls back in full and leaves the prior index state intact.
//!
//! Only one reconciliation may be in flight at a time; a second caller is
//! rejected with [`SyncError::AlreadyRunning`] rather than queued. Reads
//! (post serving, view counting) are not blocked by a running sync.

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::models::{FileDescriptor, SyncSummary};
use crate::scanner;

/// Why a reconciliation run failed.
///
/// The stage matters to callers: a [`SyncError::Scan`] means the filesystem
/// could not be trusted and nothing was planned; a [`SyncError::Apply`] means
/// the store rejected the plan and the transaction rolled back. Either way
/// the index is exactly as it was before the run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("scan failed: {0:#}")]
    Scan(anyhow::Error),
    #[error("apply failed: {0:#}")]
    Apply(anyhow::Error),
    #[error("a sync is already running")]
    AlreadyRunning,
}

/// The slice of a persisted row the planner needs for classification.
#[derive(Debug, Clone)]
pub struct IndexedPost {
    pub id: i64,
    pub file_path: String,
    pub file_hash: String,
}

/// Classified work for one reconciliation run.
///
/// The three sets are disjoint by construction: every scanned descriptor
/// lands in `creates` or `updates` (or is dropped as a no-op), and every
/// index row not claimed by a descriptor lands in `deletes`.
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub creates: Vec<FileDescriptor>,
    pub updates: Vec<(i64, FileDescriptor)>,
    pub deletes: Vec<IndexedPost>,
}

impl SyncPlan {
    pub fn summary(&self) -> SyncSummary {
        SyncSummary {
            added: self.creates.len() as u64,
            updated: self.updates.len() as u64,
            deleted: self.deletes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Bulk-load the persisted index, keyed by relative file path.
///
/// One query regardless of index size; the planner's cost stays linear.
pub async fn load_index(pool: &SqlitePool) -> Result<HashMap<String, IndexedPost>> {
    let rows = sqlx::query("SELECT id, file_path, file_hash FROM posts")
        .fetch_all(pool)
        .await
        .context("Failed to load post index")?;

    let mut index = HashMap::with_capacity(rows.len());
    for row in rows {
        let post = IndexedPost {
            id: row.get("id"),
            file_path: row.get("file_path"),
            file_hash: row.get("file_hash"),
        };
        index.insert(post.file_path.clone(), post);
    }
    Ok(index)
}

/// Diff the scanned descriptors against the persisted index.
///
/// Each descriptor consumes its index entry: a hash mismatch becomes an
/// update, a match becomes a no-op, a miss becomes a create. Whatever is
/// left of the index afterwards was not seen on disk and becomes a delete.
/// An empty scan therefore tears down the whole index; that is the intended
/// answer to an emptied or removed content root, not an accident.
pub fn plan(scanned: Vec<FileDescriptor>, mut index: HashMap<String, IndexedPost>) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for descriptor in scanned {
        match index.remove(&descriptor.relative_path) {
            Some(existing) => {
                if existing.file_hash != descriptor.content_hash {
                    plan.updates.push((existing.id, descriptor));
                }
            }
            None => plan.creates.push(descriptor),
        }
    }

    plan.deletes = index.into_values().collect();
    // HashMap drains in arbitrary order; sort so logs and tests are stable.
    plan.deletes.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    plan
}

/// Apply a plan inside a single transaction and report what changed.
///
/// Deletes run before updates and creates: a file move shows up as a delete
/// at the old path plus a create at the new one carrying the same slug, and
/// the old row has to be gone before the new row can claim the slug.
///
/// Creates populate every field from the descriptor, with visibility taken
/// from front matter and a zero view count. Updates rewrite only the
/// content-derived fields; `slug`, `view_count` and `is_hidden` belong to
/// their original owners (creation, readers, admin) and are left alone.
pub async fn apply(pool: &SqlitePool, plan: &SyncPlan) -> Result<SyncSummary> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    for dead in &plan.deletes {
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(dead.id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to delete post for {}", dead.file_path))?;
    }

    for (post_id, descriptor) in &plan.updates {
        sqlx::query(
            r#"
            UPDATE posts
            SET title = ?, category = ?, content = ?, file_hash = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&descriptor.title)
        .bind(&descriptor.category)
        .bind(&descriptor.content)
        .bind(&descriptor.content_hash)
        .bind(now)
        .bind(*post_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to update post for {}", descriptor.relative_path))?;
    }

    for descriptor in &plan.creates {
        sqlx::query(
            r#"
            INSERT INTO posts (slug, title, category, content, file_path, file_hash,
                               view_count, is_hidden, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(&descriptor.slug)
        .bind(&descriptor.title)
        .bind(&descriptor.category)
        .bind(&descriptor.content)
        .bind(&descriptor.relative_path)
        .bind(&descriptor.content_hash)
        .bind(descriptor.is_hidden)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert post for {}", descriptor.relative_path))?;
    }

    tx.commit().await?;
    Ok(plan.summary())
}

/// Run one full reconciliation: scan, diff, apply.
///
/// The guard enforces the single-writer rule. Callers hold one guard per
/// store (the server keeps it in shared state); a caller finding it taken
/// gets [`SyncError::AlreadyRunning`] immediately. An empty plan is
/// reported as all zeros without opening a write transaction.
pub async fn run_sync(
    config: &Config,
    pool: &SqlitePool,
    guard: &Mutex<()>,
) -> Result<SyncSummary, SyncError> {
    let _running = guard.try_lock().map_err(|_| SyncError::AlreadyRunning)?;

    let scanned = scanner::scan_content_dir(config).map_err(SyncError::Scan)?;
    let index = load_index(pool).await.map_err(SyncError::Apply)?;

    let plan = plan(scanned, index);
    info!(
        creates = plan.creates.len(),
        updates = plan.updates.len(),
        deletes = plan.deletes.len(),
        "sync planned"
    );
    if plan.is_empty() {
        return Ok(plan.summary());
    }

    let summary = apply(pool, &plan).await.map_err(SyncError::Apply)?;
    info!(
        added = summary.added,
        updated = summary.updated,
        deleted = summary.deleted,
        "sync applied"
    );
    Ok(summary)
}

/// CLI entry point for `flog sync`; prints the run outcome to stdout.
pub async fn run_sync_cli(config: &Config, dry_run: bool) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    crate::migrate::run_migrations(&pool).await?;

    if dry_run {
        let scanned = scanner::scan_content_dir(config)?;
        let scanned_count = scanned.len();
        let index = load_index(&pool).await?;
        let plan = plan(scanned, index);

        println!("sync (dry-run)");
        println!("  scanned: {} files", scanned_count);
        println!("  would add: {}", plan.creates.len());
        println!("  would update: {}", plan.updates.len());
        println!("  would delete: {}", plan.deletes.len());

        pool.close().await;
        return Ok(());
    }

    let guard = Mutex::new(());
    let summary = run_sync(config, &pool, &guard).await?;

    println!("sync");
    println!("  added: {}", summary.added);
    println!("  updated: {}", summary.updated);
    println!("  deleted: {}", summary.deleted);
    if summary.is_noop() {
        println!("  no changes");
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::memory_pool;

    fn descriptor(path: &str, hash: &str) -> FileDescriptor {
        let slug = path
            .rsplit('/')
            .next()
            .unwrap()
            .trim_end_matches(".md")
            .to_string();
        FileDescriptor {
            relative_path: path.to_string(),
            slug: slug.clone(),
            title: slug,
            category: match path.rsplit_once('/') {
                Some((dir, _)) => dir.to_string(),
                None => String::new(),
            },
            content: format!("body of {}", path),
            content_hash: hash.to_string(),
            is_hidden: false,
        }
    }

    fn indexed(id: i64, path: &str, hash: &str) -> (String, IndexedPost) {
        (
            path.to_string(),
            IndexedPost {
                id,
                file_path: path.to_string(),
                file_hash: hash.to_string(),
            },
        )
    }

    #[test]
    fn test_plan_fresh_index_is_all_creates() {
        let scanned = vec![descriptor("a.md", "h1"), descriptor("b.md", "h2")];
        let plan = plan(scanned, HashMap::new());
        assert_eq!(plan.creates.len(), 2);
        assert!(plan.updates.is_empty());
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_plan_matching_hash_is_noop() {
        let scanned = vec![descriptor("a.md", "h1")];
        let index = HashMap::from([indexed(1, "a.md", "h1")]);
        let plan = plan(scanned, index);
        assert!(plan.is_empty());
        assert_eq!(plan.summary(), SyncSummary::default());
    }

    #[test]
    fn test_plan_hash_mismatch_is_update() {
        let scanned = vec![descriptor("a.md", "h2")];
        let index = HashMap::from([indexed(7, "a.md", "h1")]);
        let plan = plan(scanned, index);
        assert!(plan.creates.is_empty());
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].0, 7);
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_plan_unmatched_rows_are_deletes() {
        let scanned = vec![descriptor("keep.md", "h1")];
        let index = HashMap::from([
            indexed(1, "keep.md", "h1"),
            indexed(2, "gone.md", "h2"),
            indexed(3, "also-gone.md", "h3"),
        ]);
        let plan = plan(scanned, index);
        assert!(plan.creates.is_empty());
        assert!(plan.updates.is_empty());
        let deleted: Vec<&str> = plan.deletes.iter().map(|d| d.file_path.as_str()).collect();
        assert_eq!(deleted, vec!["also-gone.md", "gone.md"]);
    }

    #[test]
    fn test_plan_empty_scan_tears_down_everything() {
        let index = HashMap::from([indexed(1, "a.md", "h1"), indexed(2, "b.md", "h2")]);
        let plan = plan(Vec::new(), index);
        assert_eq!(plan.deletes.len(), 2);
        assert_eq!(
            plan.summary(),
            SyncSummary {
                added: 0,
                updated: 0,
                deleted: 2
            }
        );
    }

    #[test]
    fn test_plan_mixed_classification() {
        let scanned = vec![
            descriptor("changed.md", "new-hash"),
            descriptor("fresh.md", "h-f"),
            descriptor("same.md", "h-s"),
        ];
        let index = HashMap::from([
            indexed(1, "changed.md", "old-hash"),
            indexed(2, "same.md", "h-s"),
            indexed(3, "removed.md", "h-r"),
        ]);
        let plan = plan(scanned, index);
        assert_eq!(
            plan.summary(),
            SyncSummary {
                added: 1,
                updated: 1,
                deleted: 1
            }
        );
        assert_eq!(plan.creates[0].relative_path, "fresh.md");
        assert_eq!(plan.updates[0].1.relative_path, "changed.md");
        assert_eq!(plan.deletes[0].file_path, "removed.md");
    }

    #[tokio::test]
    async fn test_apply_create_populates_row() {
        let pool = memory_pool().await;
        let mut d = descriptor("tech/post.md", "hash-1");
        d.is_hidden = true;

        let summary = apply(
            &pool,
            &SyncPlan {
                creates: vec![d],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(summary.added, 1);

        let row = sqlx::query(
            "SELECT slug, title, category, file_hash, view_count, is_hidden FROM posts WHERE file_path = ?",
        )
        .bind("tech/post.md")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row.get::<String, _>("slug"), "post");
        assert_eq!(row.get::<String, _>("category"), "tech");
        assert_eq!(row.get::<String, _>("file_hash"), "hash-1");
        assert_eq!(row.get::<i64, _>("view_count"), 0);
        assert!(row.get::<bool, _>("is_hidden"));
    }

    #[tokio::test]
    async fn test_apply_update_preserves_views_and_visibility() {
        let pool = memory_pool().await;
        apply(
            &pool,
            &SyncPlan {
                creates: vec![descriptor("a.md", "h1")],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Reader traffic and an admin hide happen between syncs.
        sqlx::query("UPDATE posts SET view_count = 41, is_hidden = 1 WHERE file_path = 'a.md'")
            .execute(&pool)
            .await
            .unwrap();
        let id: i64 = sqlx::query_scalar("SELECT id FROM posts WHERE file_path = 'a.md'")
            .fetch_one(&pool)
            .await
            .unwrap();

        let mut changed = descriptor("a.md", "h2");
        changed.title = "New Title".to_string();
        let summary = apply(
            &pool,
            &SyncPlan {
                updates: vec![(id, changed)],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(summary.updated, 1);

        let row = sqlx::query("SELECT title, file_hash, view_count, is_hidden FROM posts WHERE id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("title"), "New Title");
        assert_eq!(row.get::<String, _>("file_hash"), "h2");
        assert_eq!(row.get::<i64, _>("view_count"), 41);
        assert!(row.get::<bool, _>("is_hidden"));
    }

    #[tokio::test]
    async fn test_apply_delete_cascades_to_comments() {
        let pool = memory_pool().await;
        apply(
            &pool,
            &SyncPlan {
                creates: vec![descriptor("a.md", "h1")],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let id: i64 = sqlx::query_scalar("SELECT id FROM posts WHERE file_path = 'a.md'")
            .fetch_one(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO comments (post_id, content, author_name, created_at, updated_at) VALUES (?, 'hi', 'bob', 0, 0)",
        )
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();

        let summary = apply(
            &pool,
            &SyncPlan {
                deletes: vec![IndexedPost {
                    id,
                    file_path: "a.md".to_string(),
                    file_hash: "h1".to_string(),
                }],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(summary.deleted, 1);

        let posts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&pool)
            .await
            .unwrap();
        let comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!((posts, comments), (0, 0));
    }

    #[tokio::test]
    async fn test_apply_file_move_keeps_slug_free() {
        let pool = memory_pool().await;
        apply(
            &pool,
            &SyncPlan {
                creates: vec![descriptor("old/intro.md", "h1")],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let id: i64 = sqlx::query_scalar("SELECT id FROM posts WHERE file_path = 'old/intro.md'")
            .fetch_one(&pool)
            .await
            .unwrap();

        // Same slug arrives under a new path while the old row dies. Deletes
        // run first inside the transaction, so the unique slug survives.
        let summary = apply(
            &pool,
            &SyncPlan {
                creates: vec![descriptor("new/intro.md", "h1")],
                deletes: vec![IndexedPost {
                    id,
                    file_path: "old/intro.md".to_string(),
                    file_hash: "h1".to_string(),
                }],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!((summary.added, summary.deleted), (1, 1));

        let path: String = sqlx::query_scalar("SELECT file_path FROM posts WHERE slug = 'intro'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(path, "new/intro.md");
    }

    #[tokio::test]
    async fn test_apply_failure_rolls_back_whole_plan() {
        let pool = memory_pool().await;
        apply(
            &pool,
            &SyncPlan {
                creates: vec![descriptor("kept.md", "h1")],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Second create collides on slug with the first one in the same
        // plan, so the insert fails after the delete already executed.
        let id: i64 = sqlx::query_scalar("SELECT id FROM posts WHERE file_path = 'kept.md'")
            .fetch_one(&pool)
            .await
            .unwrap();
        let result = apply(
            &pool,
            &SyncPlan {
                creates: vec![descriptor("a/dup.md", "h2"), descriptor("b/dup.md", "h3")],
                deletes: vec![IndexedPost {
                    id,
                    file_path: "kept.md".to_string(),
                    file_hash: "h1".to_string(),
                }],
                ..Default::default()
            },
        )
        .await;
        assert!(result.is_err());

        // Rollback restored the deleted row and discarded the first create.
        let paths: Vec<String> = sqlx::query_scalar("SELECT file_path FROM posts ORDER BY file_path")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(paths, vec!["kept.md".to_string()]);
    }

    #[tokio::test]
    async fn test_run_sync_end_to_end_and_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.content.root = dir.path().join("posts");
        std::fs::create_dir_all(config.content.root.join("tech")).unwrap();
        std::fs::write(
            config.content.root.join("tech/first.md"),
            "---\ntitle: First\n---\nhello",
        )
        .unwrap();

        let pool = memory_pool().await;
        let guard = Mutex::new(());

        let first = run_sync(&config, &pool, &guard).await.unwrap();
        assert_eq!(
            first,
            SyncSummary {
                added: 1,
                updated: 0,
                deleted: 0
            }
        );

        let second = run_sync(&config, &pool, &guard).await.unwrap();
        assert!(second.is_noop());
    }

    #[tokio::test]
    async fn test_run_sync_rejected_while_running() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.content.root = dir.path().to_path_buf();

        let pool = memory_pool().await;
        let guard = Mutex::new(());
        let held = guard.lock().await;

        let result = run_sync(&config, &pool, &guard).await;
        assert!(matches!(result, Err(SyncError::AlreadyRunning)));
        drop(held);

        assert!(run_sync(&config, &pool, &guard).await.is_ok());
    }
}
