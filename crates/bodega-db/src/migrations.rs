//! # Schema Migrations
//!
//! The schema ships inside the binary: every file of `migrations/sqlite/` at
//! the workspace root is embedded at compile time.
//!
//! New schema changes go in a new `NNN_description.sql` file. Applied files
//! are checksummed by sqlx, so an edited migration fails on the next start.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies whatever the store is missing.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let pending = pending_count(pool).await?;
    if pending == 0 {
        debug!("Schema up to date");
        return Ok(());
    }

    MIGRATOR.run(pool).await?;
    info!(applied = pending, "Schema migrated");
    Ok(())
}

/// Embedded migrations the store hasn't applied yet.
pub async fn pending_count(pool: &SqlitePool) -> DbResult<usize> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if tracked == 0 {
        return Ok(MIGRATOR.iter().count());
    }

    let applied: Vec<i64> =
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;

    Ok(MIGRATOR
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .count())
}
