//! # Store Connection
//!
//! Opens the SQLite store shared by every register, mobile device and the
//! back office of one installation.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig ──► connect_options()   file (WAL) or private :memory:        │
//! │           ──► pool_options()      sizing, idle policy                   │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │              Database::new ──► migrations (optional) ──► Database       │
//! │                                                                         │
//! │  Database hands out one repository per store:                           │
//! │    products()  stock()  tickets()  cash()  cortes()  transfers()        │
//! │                                                                         │
//! │  Reads run in parallel. Writes queue on SQLite's single write lock for  │
//! │  at most `busy_timeout`, then surface as DbError::Busy.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::cash::CashMovementRepository;
use crate::repository::corte::CorteRepository;
use crate::repository::product::ProductRepository;
use crate::repository::stock::StockRepository;
use crate::repository::ticket::TicketRepository;
use crate::repository::transfer::TransferRepository;

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Where the store lives and how its pool behaves.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/bodega/bodega.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, or `:memory:` for a private throwaway store.
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Wait for a free pooled connection.
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    /// Wait on a locked database before a write reports busy.
    pub busy_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed store at `path`, created on first use.
    ///
    /// Five connections, 5 s busy wait, migrations on.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Private in-memory store for tests and demos.
    ///
    /// Exactly one connection, kept forever: every in-memory SQLite
    /// connection is a separate database.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            connect_timeout: Duration::from_secs(5),
            ..DbConfig::new(MEMORY_PATH)
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }

    pub fn max_connections(self, max_connections: u32) -> Self {
        DbConfig {
            max_connections,
            ..self
        }
    }

    pub fn min_connections(self, min_connections: u32) -> Self {
        DbConfig {
            min_connections,
            ..self
        }
    }

    pub fn connect_timeout(self, connect_timeout: Duration) -> Self {
        DbConfig {
            connect_timeout,
            ..self
        }
    }

    pub fn busy_timeout(self, busy_timeout: Duration) -> Self {
        DbConfig {
            busy_timeout,
            ..self
        }
    }

    pub fn run_migrations(self, run_migrations: bool) -> Self {
        DbConfig {
            run_migrations,
            ..self
        }
    }

    /// Per-connection SQLite settings.
    ///
    /// Foreign keys on, NORMAL sync. File stores use WAL so registers can
    /// read while a sale commits.
    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let parse = |url: &str| {
            SqliteConnectOptions::from_str(url).map_err(|e| DbError::ConnectionFailed(e.to_string()))
        };

        let options = if self.is_in_memory() {
            parse("sqlite::memory:")?
        } else {
            parse(&format!("sqlite://{}?mode=rwc", self.database_path.display()))?
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true)
        };

        Ok(options
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout))
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.connect_timeout);

        if self.is_in_memory() {
            // Closing the only connection would drop the whole store
            options.idle_timeout(None).max_lifetime(None)
        } else {
            options.idle_timeout(Some(self.idle_timeout))
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the store. Clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and, unless disabled, brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening store");

        let pool = config
            .pool_options()
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(
            max_connections = config.max_connections,
            in_memory = config.is_in_memory(),
            "Pool ready"
        );

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Applies pending migrations. Does nothing when the schema is current.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Migrations embedded in this build but not yet applied to the store.
    pub async fn pending_migrations(&self) -> DbResult<usize> {
        migrations::pending_count(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Catalog: products and their stock snapshot.
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Stock rows, adjustments and the movement trail.
    pub fn stock(&self) -> StockRepository {
        StockRepository::new(self.pool.clone())
    }

    /// Store and mobile tickets.
    pub fn tickets(&self) -> TicketRepository {
        TicketRepository::new(self.pool.clone())
    }

    pub fn cash(&self) -> CashMovementRepository {
        CashMovementRepository::new(self.pool.clone())
    }

    pub fn cortes(&self) -> CorteRepository {
        CorteRepository::new(self.pool.clone())
    }

    pub fn transfers(&self) -> TransferRepository {
        TransferRepository::new(self.pool.clone())
    }

    /// Closes the pool. Repository calls fail afterwards.
    pub async fn close(&self) {
        info!("Closing store");
        self.pool.close().await;
    }

    /// Whether the store answers a trivial query.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        assert_eq!(db.pending_migrations().await.unwrap(), 0);

        // Running again is a no-op
        db.run_migrations().await.unwrap();
        assert_eq!(db.products().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unmigrated_store_reports_pending() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();
        assert!(db.pending_migrations().await.unwrap() > 0);

        db.run_migrations().await.unwrap();
        assert_eq!(db.pending_migrations().await.unwrap(), 0);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/bodega-test.db")
            .max_connections(10)
            .min_connections(2)
            .busy_timeout(Duration::from_secs(1));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert!(!config.is_in_memory());

        let memory = DbConfig::in_memory();
        assert!(memory.is_in_memory());
        assert_eq!(memory.max_connections, 1);
    }

    #[tokio::test]
    async fn test_closed_pool_fails_health_check() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }
}
