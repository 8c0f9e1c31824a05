//! # Error Types
//!
//! Domain-specific error types for bodega-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bodega-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  bodega-db errors (separate crate)                                     │
//! │  └── DbError          - Store failures, stock/sequence conflicts       │
//! │                                                                         │
//! │  bodega-service errors                                                 │
//! │  └── ServiceError     - What callers see (fix input vs try again)      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                  │
//! │                         DbError ────┴──► ServiceError → caller         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// A cart or transfer line references a product that does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Not enough pieces in the pool (or source location) to cover a request.
    ///
    /// ## User Workflow
    /// ```text
    /// Add to Cart (15 pieces)
    ///      │
    ///      ▼
    /// Pool for L1: L1=10, BODEGA-1=3  → available 13
    ///      │
    ///      ▼
    /// InsufficientStock { product: "7501-CJ", location: "L1", available: 13, requested: 15 }
    ///      │
    ///      ▼
    /// UI re-displays "13 available"
    /// ```
    #[error(
        "Insufficient stock for {product} at {location}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product: String,
        location: String,
        available: i64,
        requested: i64,
    },

    /// Ticket (store or mobile) cannot be found.
    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    /// A mobile order status change that the workflow does not allow.
    #[error("Cannot move {field} from {from} to {to}")]
    InvalidStatusTransition {
        field: String,
        from: String,
        to: String,
    },

    /// Money input could not be parsed or is not acceptable here.
    #[error("Invalid amount for {field}: {reason}")]
    InvalidAmount { field: String, reason: String },

    /// Checkout attempted with no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// A requested price level is not configured for the product.
    #[error("Price level {level} is not set for product {product}")]
    PriceLevelUnavailable { product: String, level: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Shorthand for an `InvalidAmount` error.
    pub fn invalid_amount(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidAmount {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business logic or persistence runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., bad location code, bad amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Two fields that must differ are equal.
    #[error("{field} must differ from {other}")]
    MustDiffer { field: String, other: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product: "7501-CJ".to_string(),
            location: "L1".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for 7501-CJ at L1: available 3, requested 5"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "concept".to_string(),
        };
        assert_eq!(err.to_string(), "concept is required");

        let err = ValidationError::MustDiffer {
            field: "to_location".to_string(),
            other: "from_location".to_string(),
        };
        assert_eq!(err.to_string(), "to_location must differ from from_location");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "location".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
