//! # Error Types
//!
//! Domain-specific error types for kasa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kasa-core errors (this file)                                          │
//! │  ├── CoreError        - Cart, session, stock and sale rule violations  │
//! │  └── ValidationError  - Input rejected before any side effect          │
//! │                                                                         │
//! │  kasa-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  kasa-engine errors                                                    │
//! │  └── EngineError      - What the UI/API sees (code + message)          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry Semantics
//! - `Validation` and `InsufficientStock`: nothing was written; fix the cart
//!   and retry.
//! - `CommitConflict`: the finalize-time commit lost a race; nothing was
//!   written either, the cart is intact.
//! - `PaymentGateway`: the sale exists and stays pending; the operator decides.

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Catalog item cannot be found (or is inactive) in this department.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Variant does not belong to the item.
    #[error("Variant {variant_id} not found for item {item_id}")]
    VariantNotFound { item_id: String, variant_id: String },

    /// The cart has no line with this key.
    #[error("Line not found in cart: {0}")]
    LineNotFound(String),

    /// Not enough stock for the quantity the cart would hold.
    ///
    /// ## User Workflow
    /// ```text
    /// Add to Cart (qty: 2, already 4 in cart)
    ///      │
    ///      ▼
    /// Ledger check for 6 → available 5
    ///      │
    ///      ▼
    /// InsufficientStock { item_name: "Sugar 1kg", requested: 6, available: 5 }
    ///      │
    ///      ▼
    /// UI shows: "Only 5 Sugar 1kg in stock"
    /// ```
    #[error("Insufficient stock for {item_name}: available {available}, requested {requested}")]
    InsufficientStock {
        item_name: String,
        requested: i64,
        available: i64,
    },

    /// A stock-tracked mutation arrived without a check for the right
    /// target and total.
    #[error("Stock check for {item_name} does not cover a total of {expected}")]
    StaleStockCheck { item_name: String, expected: i64 },

    /// Pre-check passed but the atomic commit found less stock.
    #[error("Stock changed during checkout for {item_name}: available {available}, requested {requested}")]
    CommitConflict {
        item_name: String,
        requested: i64,
        available: i64,
    },

    /// Order tab does not exist.
    #[error("Cart tab not found: {0}")]
    TabNotFound(String),

    /// Tab still holds items; it must be parked or sold first.
    #[error("Cart tab {0} is not empty; park or complete it first")]
    TabNotEmpty(String),

    /// The last remaining tab cannot be closed.
    #[error("Cannot close the last cart tab")]
    LastTab,

    /// A checkout is running on this tab.
    #[error("Cart tab {0} is being checked out")]
    CartBusy(String),

    /// Parked cart does not exist.
    #[error("Parked cart not found: {0}")]
    ParkedCartNotFound(String),

    /// Sale not found.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Sale is not in a state that allows the requested operation.
    #[error("Sale {sale_id} is {current_status}, cannot {operation}")]
    InvalidSaleStatus {
        sale_id: String,
        current_status: String,
        operation: String,
    },

    /// Finalizer state machine refused a transition.
    #[error("Invalid checkout transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Payment gateway rejected or failed the request. The sale is kept.
    #[error("Payment gateway error for sale {sale_id}: {reason}")]
    PaymentGateway { sale_id: String, reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any side effect; safe to retry after correction.
#[derive(Debug, Error)]
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

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Completing a sale with an empty cart.
    #[error("Cart is empty")]
    CartEmpty,

    /// Completing a sale without choosing how the customer pays.
    #[error("No payment method selected")]
    PaymentMethodRequired,

    /// Custom price outside the item's configured bounds.
    #[error("Price {price} for {item_name} is outside the allowed range {}", format_bounds(.min, .max))]
    PriceOutOfRange {
        item_name: String,
        price: Money,
        min: Option<Money>,
        max: Option<Money>,
    },

    /// A line or cart total no longer fits in minor units.
    #[error("{field} exceeds the largest supported amount")]
    AmountOverflow { field: String },

    /// Item does not allow free-form pricing for this caller.
    #[error("Custom pricing is not allowed for {item_name}")]
    CustomPriceNotAllowed { item_name: String },
}

fn format_bounds(min: &Option<Money>, max: &Option<Money>) -> String {
    let lo = min.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string());
    let hi = max.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string());
    format!("[{}, {}]", lo, hi)
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            item_name: "Sugar 1kg".to_string(),
            requested: 6,
            available: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Sugar 1kg: available 5, requested 6"
        );
    }

    #[test]
    fn test_price_range_message() {
        let err = ValidationError::PriceOutOfRange {
            item_name: "Rice".to_string(),
            price: Money::from_minor(3000),
            min: Some(Money::from_minor(4000)),
            max: None,
        };
        assert_eq!(
            err.to_string(),
            "Price 30.00 for Rice is outside the allowed range [40.00, -]"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::CartEmpty.into();
        assert!(matches!(core_err, CoreError::Validation(ValidationError::CartEmpty)));
    }
}
