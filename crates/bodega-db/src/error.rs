//! # Store Errors
//!
//! ```text
//! sqlx::Error ──► DbError ──► ServiceError (bodega-service)
//!                    ▲
//!                    └── raised directly by repositories when a guarded
//!                        UPDATE matches no row (StockConflict / Conflict)
//! ```
//!
//! Constraint failures are told apart with [`sqlx::error::ErrorKind`], so the
//! mapping doesn't depend on SQLite's message wording except for lock
//! detection.

use sqlx::error::{DatabaseError, ErrorKind};
use thiserror::Error;

/// SQLite primary result codes for a locked store (`SQLITE_BUSY`,
/// `SQLITE_LOCKED`).
const BUSY_CODES: [i32; 2] = [5, 6];

#[derive(Debug, Error)]
pub enum DbError {
    /// Product, ticket, corte or transfer id doesn't exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A caller-supplied value is already taken: a box or piece code used by
    /// another product.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// SQLite rejected a row on a UNIQUE or PRIMARY KEY constraint. Carries
    /// the constraint text as reported.
    ///
    /// ## When This Occurs
    /// - Two inserts racing on the same product code between the clash check
    ///   and the INSERT
    /// - A key the store assigns itself (ticket number, line key) already
    ///   present, e.g. after a counter row was edited by hand
    #[error("Key collision: {0}")]
    KeyCollision(String),

    /// A ticket or transfer line names a product that doesn't exist.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A row broke a CHECK constraint (negative stock, non-positive cash
    /// movement, unknown enum text).
    #[error("Check constraint failed: {0}")]
    CheckViolation(String),

    /// A conditional stock decrement matched no row.
    ///
    /// ## When This Occurs
    /// ```text
    /// Register A reads L1=5 ─┐
    /// Register B reads L1=5 ─┤   both plan to take 5
    ///                        │
    /// A commits: L1 5 → 0    │
    /// B: UPDATE ... WHERE quantity >= 5  → 0 rows → StockConflict
    /// ```
    /// The transaction is rolled back; nothing of the operation is visible.
    #[error("Stock changed concurrently for product {product_id} at {location}")]
    StockConflict { product_id: String, location: String },

    /// A compare-and-swap update found the row in a different state.
    ///
    /// ## When This Occurs
    /// - Catalog edit against a stale `version`
    /// - Two devices updating the same mobile order at once
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: String, id: String },

    /// The store stayed locked past the busy timeout.
    #[error("Database is busy: {0}")]
    Busy(String),

    /// The store couldn't be opened, or the pool is closed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Any other statement failure reported by SQLite.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// No pooled connection freed up within the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn stock_conflict(product_id: impl Into<String>, location: impl Into<String>) -> Self {
        DbError::StockConflict {
            product_id: product_id.into(),
            location: location.into(),
        }
    }

    pub fn conflict(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::Conflict {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Whether rerunning the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::StockConflict { .. }
                | DbError::Conflict { .. }
                | DbError::KeyCollision(_)
                | DbError::Busy(_)
                | DbError::PoolExhausted
        )
    }

    fn from_database(err: &dyn DatabaseError) -> Self {
        let message = err.message().to_string();
        match err.kind() {
            ErrorKind::UniqueViolation => DbError::KeyCollision(message),
            ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { message },
            ErrorKind::CheckViolation | ErrorKind::NotNullViolation => {
                DbError::CheckViolation(message)
            }
            _ if is_locked(err, &message) => DbError::Busy(message),
            _ => DbError::QueryFailed(message),
        }
    }
}

fn is_locked(err: &dyn DatabaseError, message: &str) -> bool {
    let by_code = err.code().is_some_and(|code| {
        // Extended codes carry the primary code in the low byte
        code.parse::<i32>()
            .map(|c| BUSY_CODES.contains(&(c & 0xff)))
            .unwrap_or(false)
    });
    by_code || message.contains("database is locked")
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => DbError::from_database(db_err.as_ref()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DbError::stock_conflict("p1", "L1").is_transient());
        assert!(DbError::conflict("MobileTicket", "L1-M-1").is_transient());
        assert!(DbError::Busy("database is locked".to_string()).is_transient());
        assert!(!DbError::not_found("Product", "p1").is_transient());
        assert!(!DbError::duplicate("box_code", "CJ-1").is_transient());
        assert!(DbError::KeyCollision("UNIQUE constraint failed".to_string()).is_transient());
        assert!(!DbError::CheckViolation("quantity".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_store_key_collision_keeps_constraint_text() {
        let db = crate::Database::new(crate::DbConfig::in_memory()).await.unwrap();
        let insert = "INSERT INTO location_counters (location, kind, value) VALUES ('L1', 'ticket', 1)";
        sqlx::query(insert).execute(db.pool()).await.unwrap();

        let err = DbError::from(sqlx::query(insert).execute(db.pool()).await.unwrap_err());
        match &err {
            DbError::KeyCollision(message) => {
                assert!(message.contains("location_counters.location"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_transient());
        assert!(!err.to_string().contains("unknown"));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            DbError::from(sqlx::Error::RowNotFound),
            DbError::NotFound { .. }
        ));
    }
}
