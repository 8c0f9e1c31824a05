//! # Validation Module
//!
//! Input validation for catalog entries, locations, quantities and amounts.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Frontend                                                     │
//! │  └── Clamps inputs to the remaining quantity                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: bodega-service                                               │
//! │  └── THIS MODULE: rejects bad input before any read or write           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── UNIQUE box_code / product_code                                    │
//! │  └── CHECK (quantity >= 0) on stock rows                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{
    MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_PIECES_PER_BOX, MAX_PRICE_CENTS, MAX_TRANSFER_LINES,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a box or product code.
///
/// ## Rules
/// - Must not be empty, at most 50 characters
/// - Letters, digits, hyphens and underscores only
///
/// ```rust
/// use bodega_core::validation::validate_code;
///
/// assert!(validate_code("box_code", "7501055300075").is_ok());
/// assert!(validate_code("box_code", "CJ-24").is_ok());
/// assert!(validate_code("box_code", "").is_err());
/// assert!(validate_code("box_code", "has space").is_err());
/// ```
pub fn validate_code(field: &str, code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if code.len() > 50 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 50,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a location code (`L1`, `BODEGA-NORTE`, ...).
///
/// Same alphabet as product codes; location codes become part of ticket ids,
/// so whitespace is never allowed.
pub fn validate_location(field: &str, location: &str) -> ValidationResult<()> {
    validate_code(field, location)?;
    if location.trim() != location {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not have surrounding whitespace".to_string(),
        });
    }
    Ok(())
}

/// Validates a product name (1-200 characters).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_text("name", name, 200)
}

/// Validates a free-text field that must not be blank.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price or cost in cents. Zero is allowed (promotional items).
///
/// ```rust
/// use bodega_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents("cost", 1099).is_ok());
/// assert!(validate_price_cents("cost", 0).is_ok());
/// assert!(validate_price_cents("cost", -100).is_err());
/// assert!(validate_price_cents("cost", i64::MAX / 2).is_err());
/// ```
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a cash movement amount: strictly positive.
pub fn validate_movement_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

/// Validates an operator till count: zero or more.
pub fn validate_counted_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates pieces per box (1 to [`MAX_PIECES_PER_BOX`]).
pub fn validate_pieces_per_box(pieces: i64) -> ValidationResult<()> {
    if pieces <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "pieces_per_box".to_string(),
        });
    }

    if pieces > MAX_PIECES_PER_BOX {
        return Err(ValidationError::OutOfRange {
            field: "pieces_per_box".to_string(),
            min: 1,
            max: MAX_PIECES_PER_BOX,
        });
    }

    Ok(())
}

/// Validates that tier thresholds are positive and non-decreasing.
pub fn validate_tier_thresholds(t1: i64, t2: i64, t3: i64) -> ValidationResult<()> {
    if t1 <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "price1_min_qty".to_string(),
        });
    }

    if t2 < t1 {
        return Err(ValidationError::OutOfRange {
            field: "price2_min_qty".to_string(),
            min: t1,
            max: i64::MAX,
        });
    }

    if t3 < t2 {
        return Err(ValidationError::OutOfRange {
            field: "price3_min_qty".to_string(),
            min: t2,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates cart size before adding another line.
pub fn validate_cart_size(current_items: usize) -> ValidationResult<()> {
    if current_items >= MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 0,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

/// Validates the number of lines in a transfer batch.
pub fn validate_transfer_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "transfer lines".to_string(),
        });
    }

    if lines > MAX_TRANSFER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "transfer lines".to_string(),
            min: 1,
            max: MAX_TRANSFER_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_code() {
        assert!(validate_code("box_code", "7501055300075").is_ok());
        assert!(validate_code("box_code", "CJ_24").is_ok());

        assert!(validate_code("box_code", "").is_err());
        assert!(validate_code("box_code", "   ").is_err());
        assert!(validate_code("box_code", "a b").is_err());
        assert!(validate_code("box_code", &"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_location() {
        assert!(validate_location("location", "L1").is_ok());
        assert!(validate_location("location", "BODEGA-NORTE").is_ok());
        assert!(validate_location("location", " L1").is_err());
        assert!(validate_location("location", "").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_price_and_box_bounds() {
        assert!(validate_price_cents("price1", MAX_PRICE_CENTS).is_ok());
        assert!(validate_price_cents("price1", MAX_PRICE_CENTS + 1).is_err());
        assert!(validate_pieces_per_box(MAX_PIECES_PER_BOX).is_ok());
        assert!(validate_pieces_per_box(MAX_PIECES_PER_BOX + 1).is_err());
        assert!(validate_pieces_per_box(0).is_err());
    }

    #[test]
    fn test_validate_tier_thresholds() {
        assert!(validate_tier_thresholds(1, 12, 50).is_ok());
        assert!(validate_tier_thresholds(1, 1, 1).is_ok());
        assert!(validate_tier_thresholds(0, 12, 50).is_err());
        assert!(validate_tier_thresholds(12, 1, 50).is_err());
        assert!(validate_tier_thresholds(1, 50, 12).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_movement_amount(1).is_ok());
        assert!(validate_movement_amount(0).is_err());
        assert!(validate_counted_amount("actual_cash", 0).is_ok());
        assert!(validate_counted_amount("actual_cash", -1).is_err());
    }

    #[test]
    fn test_validate_transfer_size() {
        assert!(validate_transfer_size(0).is_err());
        assert!(validate_transfer_size(1).is_ok());
        assert!(validate_transfer_size(MAX_TRANSFER_LINES + 1).is_err());
    }
}
