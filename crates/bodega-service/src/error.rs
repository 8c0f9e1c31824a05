//! # Service Error Type
//!
//! One error type for every service operation, classified for the caller.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Bodega POS                             │
//! │                                                                         │
//! │  CoreError::InsufficientStock ───┐                                      │
//! │  CoreError::InvalidAmount ───────┤                                      │
//! │  ValidationError ────────────────┼──► ServiceError ──► ErrorResponse    │
//! │  DbError::StockConflict ─────────┤       │               { code,        │
//! │  DbError::ConnectionFailed ──────┘       │                 class,       │
//! │                                          ▼                 message }    │
//! │                              ErrorClass::FixInput  (change the request) │
//! │                              ErrorClass::TryAgain  (same request later) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry
//! Operations that race on stock rows, sequence counters or mobile order
//! state run through [`retry_on_conflict`]: a `ConcurrencyConflict` on the
//! first attempt re-runs the whole operation once, from fresh reads.

use std::future::Future;

use bodega_core::{CoreError, ValidationError};
use bodega_db::DbError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Attempts made by [`retry_on_conflict`]: the first try plus one retry.
const MAX_ATTEMPTS: u32 = 2;

/// Errors returned by every service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or missing input, rejected before any write.
    #[error("{0}")]
    Validation(String),

    /// Product, ticket, order or corte doesn't exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Not enough stock to cover the request.
    ///
    /// ## When This Occurs
    /// - A sale line exceeds the pooled stock of its location
    /// - A transfer line exceeds its source location
    /// - A negative adjustment exceeds the row
    #[error("Insufficient stock for {product} at {location}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        location: String,
        available: i64,
        requested: i64,
    },

    /// Another writer changed the same stock row, counter or order first.
    #[error("Concurrent update: {0}")]
    ConcurrencyConflict(String),

    /// The store (or another dependency) could not serve the request.
    #[error("Service unavailable: {0}")]
    DependencyUnavailable(String),
}

/// How the caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The request itself must change.
    FixInput,
    /// The same request may succeed later.
    TryAgain,
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    InsufficientStock,
    ConcurrencyConflict,
    DependencyUnavailable,
}

/// What a UI or API layer receives.
///
/// ```json
/// {
///   "code": "INSUFFICIENT_STOCK",
///   "class": "fix_input",
///   "message": "Insufficient stock for PZ-1 at L1: available 13, requested 15"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub class: ErrorClass,
    pub message: String,
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Validation(_) => ErrorCode::ValidationError,
            ServiceError::NotFound { .. } => ErrorCode::NotFound,
            ServiceError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            ServiceError::ConcurrencyConflict(_) => ErrorCode::ConcurrencyConflict,
            ServiceError::DependencyUnavailable(_) => ErrorCode::DependencyUnavailable,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::Validation(_)
            | ServiceError::NotFound { .. }
            | ServiceError::InsufficientStock { .. } => ErrorClass::FixInput,
            ServiceError::ConcurrencyConflict(_) | ServiceError::DependencyUnavailable(_) => {
                ErrorClass::TryAgain
            }
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::ConcurrencyConflict(_))
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code(),
            class: self.class(),
            message: self.to_string(),
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => ServiceError::not_found("Product", id),
            CoreError::TicketNotFound(id) => ServiceError::not_found("Ticket", id),
            CoreError::InsufficientStock {
                product,
                location,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                product,
                location,
                available,
                requested,
            },
            CoreError::Validation(e) => ServiceError::Validation(e.to_string()),
            other => ServiceError::Validation(other.to_string()),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

/// Converts database errors to service errors.
///
/// Store failures are logged here with their detail and surfaced with a
/// generic message.
impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => {
                ServiceError::Validation(format!("{} '{}' already exists", field, value))
            }
            DbError::ForeignKeyViolation { message } => {
                error!("Foreign key violation: {}", message);
                ServiceError::Validation("Invalid reference".to_string())
            }
            DbError::CheckViolation(message) => {
                error!("Check constraint failed: {}", message);
                ServiceError::Validation("Value out of range".to_string())
            }
            e @ (DbError::StockConflict { .. } | DbError::Conflict { .. } | DbError::Busy(_)) => {
                ServiceError::ConcurrencyConflict(e.to_string())
            }
            e @ DbError::KeyCollision(_) => {
                warn!("{}", e);
                ServiceError::ConcurrencyConflict(e.to_string())
            }
            DbError::PoolExhausted => {
                ServiceError::DependencyUnavailable("Database pool exhausted".to_string())
            }
            other => {
                error!("Database failure: {}", other);
                ServiceError::DependencyUnavailable("Database operation failed".to_string())
            }
        }
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Runs `operation`, re-running it once if it fails with a concurrency
/// conflict.
///
/// `operation` must redo its reads on every call.
pub async fn retry_on_conflict<T, F, Fut>(name: &str, mut operation: F) -> ServiceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(e) if e.is_conflict() && attempt < MAX_ATTEMPTS => {
                warn!(operation = name, attempt, error = %e, "Conflict, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}
