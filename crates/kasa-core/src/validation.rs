//! # Validation Module
//!
//! Input validation utilities for the transaction engine.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI / API caller                                              │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: kasa-core (THIS MODULE + pricing bounds)                     │
//! │  └── Quantities, prices, cart size, labels                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── CHECK (stock_quantity >= 0)                                       │
//! │  └── UNIQUE (department_id, receipt_number)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_VOLUME_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Count-tracked lines: at most [`MAX_ITEM_QUANTITY`]
/// - Volume-tracked lines: at most [`MAX_VOLUME_QUANTITY`] volume units
///
/// ```rust
/// use kasa_core::validation::validate_quantity;
///
/// assert!(validate_quantity(5, false).is_ok());
/// assert!(validate_quantity(0, false).is_err());
/// assert!(validate_quantity(1000, false).is_err());
/// assert!(validate_quantity(1000, true).is_ok());
/// ```
pub fn validate_quantity(qty: i64, volume_tracked: bool) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    let max = if volume_tracked {
        MAX_VOLUME_QUANTITY
    } else {
        MAX_ITEM_QUANTITY
    };
    if qty > max {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max,
        });
    }

    Ok(())
}

/// Validates a price in minor units. Zero is allowed (free items).
pub fn validate_price(minor: i64) -> ValidationResult<()> {
    if minor < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates that one more line fits in the cart.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 0,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Normalizes a free-text label (customer name, park reason).
///
/// Blank input becomes `None`; anything over 120 characters is rejected.
pub fn normalize_label(field: &str, value: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if value.chars().count() > 120 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 120,
        });
    }

    Ok(Some(value.to_string()))
}

/// Validates a UUID string format.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1, false).is_ok());
        assert!(validate_quantity(999, false).is_ok());
        assert!(validate_quantity(0, false).is_err());
        assert!(validate_quantity(-1, true).is_err());
        assert!(validate_quantity(1000, false).is_err());
        assert!(validate_quantity(150_000, true).is_ok());
        assert!(validate_quantity(250_000, true).is_err());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(0).is_ok());
        assert!(validate_price(1099).is_ok());
        assert!(validate_price(-100).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(0).is_ok());
        assert!(validate_cart_size(99).is_ok());
        assert!(validate_cart_size(100).is_err());
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("reason", None).unwrap(), None);
        assert_eq!(normalize_label("reason", Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_label("reason", Some("  back soon ")).unwrap(),
            Some("back soon".to_string())
        );
        assert!(normalize_label("reason", Some(&"x".repeat(121))).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "not-a-uuid").is_err());
    }
}
