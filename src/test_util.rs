//! Shared helpers for unit tests.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Fresh in-memory database with the full schema applied.
///
/// Capped at one connection: each in-memory SQLite connection is its own
/// database, so a larger pool would hand out empty ones.
pub(crate) async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    crate::migrate::run_migrations(&pool).await.unwrap();
    pool
}
