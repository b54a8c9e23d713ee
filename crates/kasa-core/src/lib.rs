//! # kasa-core: Pure Business Logic for Kasa POS
//!
//! This crate is the **heart** of the Kasa transaction engine. It holds every
//! rule that does not need a database or a network: price resolution, cart
//! and order-tab management, the sale state machine and receipt assembly.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Kasa Transaction Engine                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI / API caller                              │   │
//! │  │   add item ──► edit cart ──► park/resume ──► complete sale      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                kasa-engine (orchestration)                      │   │
//! │  │   Sale Finalizer, Payment Confirmation Gate, config             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kasa-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │ pricing │ │  cart   │ │ session │ │  sale   │ │ receipt │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            kasa-db (Catalog Store, Stock Ledger, Sales)         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Catalog items, variants, tiers, payment methods, stock checks
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`pricing`] - Pricing Resolver and custom-price validation
//! - [`cart`] - Cart and line items
//! - [`session`] - Order tabs and parked carts
//! - [`sale`] - Sale records and the finalizer state machine
//! - [`receipt`] - Receipt value object handed to printers/sharing
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use kasa_core::money::Money;
//! use kasa_core::pricing::resolve_price;
//! use kasa_core::types::{CatalogItem, ItemKind, PriceTier};
//!
//! let mut item = CatalogItem::new("dept-1", "Sugar 1kg", ItemKind::Product, Money::from_minor(1200));
//! item.tier_prices.wholesale = Money::from_minor(1000);
//!
//! let resolved = resolve_price(&item, None, None);
//! assert_eq!(resolved.unit_price, Money::from_minor(1000));
//! assert_eq!(resolved.tier, PriceTier::Wholesale);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod pricing;
pub mod receipt;
pub mod sale;
pub mod session;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartTotals, LineItem, LineKey, StockDemand};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use pricing::{resolve_price, validate_custom_price, ResolvedPrice};
pub use receipt::{BusinessInfo, Receipt, ReceiptLine};
pub use sale::{
    fallback_receipt_number, format_receipt_number, stamp_sale_time, validate_backdate, validate_for_checkout,
    FinalizerState, Sale, SaleContext, SaleLine, SaleStatus,
};
pub use session::{CartSessionManager, CartTab, ParkedCart, SessionSnapshot};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single count-tracked line.
///
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum quantity of a single volume-tracked line, in the item's volume
/// unit (200 litres when the unit is millilitres).
pub const MAX_VOLUME_QUANTITY: i64 = 200_000;
