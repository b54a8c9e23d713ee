//! # Domain Types
//!
//! Catalog-side types the engine reads, plus the small enums shared by
//! every layer.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────────┐        ┌─────────────────────┐               │
//! │  │     CatalogItem      │ 1    * │       Variant       │               │
//! │  │  ──────────────────  │◄───────│  ─────────────────  │               │
//! │  │  kind                │        │  price_adjustment   │               │
//! │  │  base_price          │        │  stock_quantity     │               │
//! │  │  tier_prices         │        └─────────────────────┘               │
//! │  │  volume (optional)   │                                              │
//! │  │  price_policy        │        ┌─────────────────────┐               │
//! │  │  stock_quantity      │        │     StockCheck      │               │
//! │  └──────────────────────┘        │  target, requested, │               │
//! │                                  │  available_quantity │               │
//! │  ┌───────────┐ ┌───────────────┐ └─────────────────────┘               │
//! │  │ PriceTier │ │ PaymentMethod │                                       │
//! │  └───────────┘ └───────────────┘                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stock Authority
//! An item with variants never has authoritative stock of its own: the
//! variants carry it. [`CatalogItem::stock_target`] encodes that rule so the
//! cart and the ledger always agree on which row a line draws from.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;

// =============================================================================
// Item Kind
// =============================================================================

/// What a catalog entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Physical goods with stock.
    Product,
    /// Labour or other services; never stock-tracked.
    Service,
    /// Airtime / data bundles sold at a fixed price.
    DataPackage,
}

// =============================================================================
// Price Tier
// =============================================================================

/// Price level selected for a line item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    /// No tier configured; flat base price.
    #[default]
    Default,
    Retail,
    Wholesale,
    Individual,
}

/// Optional tiered prices. A zero amount means the tier is not offered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TierPrices {
    pub retail: Money,
    pub wholesale: Money,
    pub individual: Money,
}

impl TierPrices {
    /// Default resolution order when the caller names no tier.
    pub const ORDER: [PriceTier; 3] = [PriceTier::Retail, PriceTier::Wholesale, PriceTier::Individual];

    /// Returns the price of a tier if it is configured (non-zero).
    pub fn get(&self, tier: PriceTier) -> Option<Money> {
        match tier {
            PriceTier::Default => None,
            PriceTier::Retail => self.retail.non_zero(),
            PriceTier::Wholesale => self.wholesale.non_zero(),
            PriceTier::Individual => self.individual.non_zero(),
        }
    }

    /// True when no tier carries a price.
    pub fn is_empty(&self) -> bool {
        Self::ORDER.iter().all(|t| self.get(*t).is_none())
    }
}

// =============================================================================
// Volume Pricing
// =============================================================================

/// Pricing per unit of continuous quantity (e.g. millilitres of fuel).
///
/// When present, the item's stock and every line quantity are expressed in
/// `unit_label` units instead of a discrete count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct VolumePricing {
    /// Unit shown next to quantities ("ml", "g").
    pub unit_label: String,
    /// Retail price per unit; zero means not offered.
    pub retail_per_unit: Money,
    /// Wholesale price per unit; zero means not offered.
    pub wholesale_per_unit: Money,
}

// =============================================================================
// Custom Price Policy
// =============================================================================

/// Whether and within which bounds a cashier may override a line's price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CustomPricePolicy {
    pub allow_custom_price: bool,
    /// Lower bound; `None` leaves that side unconstrained.
    pub min_price: Option<Money>,
    /// Upper bound; `None` leaves that side unconstrained.
    pub max_price: Option<Money>,
}

// =============================================================================
// Catalog Item & Variant
// =============================================================================

/// A variant (size, colour, flavour) of a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    pub item_id: String,
    pub name: String,
    /// Added to the item's resolved price, after tier/volume resolution.
    pub price_adjustment: Money,
    /// Independent stock count of this variant.
    pub stock_quantity: i64,
}

impl Variant {
    /// Creates a variant with a fresh id.
    pub fn new(item_id: impl Into<String>, name: impl Into<String>, price_adjustment: Money, stock_quantity: i64) -> Self {
        Variant {
            id: Uuid::new_v4().to_string(),
            item_id: item_id.into(),
            name: name.into(),
            price_adjustment,
            stock_quantity,
        }
    }
}

/// A product, service or data package as the Catalog Store exposes it.
///
/// Read-only to the engine; stock changes go through the ledger only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    /// Opaque scoping key from the Department Directory.
    pub department_id: String,
    pub name: String,
    pub kind: ItemKind,
    pub base_price: Money,
    pub tier_prices: TierPrices,
    pub volume: Option<VolumePricing>,
    pub price_policy: CustomPricePolicy,
    /// Own stock. Ignored for availability when the item has variants;
    /// `None` for untracked kinds.
    pub stock_quantity: Option<i64>,
    pub variants: Vec<Variant>,
    pub is_active: bool,
}

impl CatalogItem {
    /// Creates an active item with a fresh id, flat price and no stock.
    pub fn new(department_id: impl Into<String>, name: impl Into<String>, kind: ItemKind, base_price: Money) -> Self {
        CatalogItem {
            id: Uuid::new_v4().to_string(),
            department_id: department_id.into(),
            name: name.into(),
            kind,
            base_price,
            tier_prices: TierPrices::default(),
            volume: None,
            price_policy: CustomPricePolicy::default(),
            stock_quantity: match kind {
                ItemKind::Product => Some(0),
                ItemKind::Service | ItemKind::DataPackage => None,
            },
            variants: Vec::new(),
            is_active: true,
        }
    }

    #[inline]
    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    #[inline]
    pub fn is_volume_tracked(&self) -> bool {
        self.volume.is_some()
    }

    /// Only products hold stock; services and data packages never do.
    #[inline]
    pub fn is_stock_tracked(&self) -> bool {
        self.kind == ItemKind::Product
    }

    /// Looks up one of this item's variants.
    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Which ledger row a line for this item (and optional variant) draws
    /// stock from. `None` means the line is not stock-tracked.
    pub fn stock_target(&self, variant_id: Option<&str>) -> Option<StockTarget> {
        if !self.is_stock_tracked() {
            return None;
        }
        match variant_id {
            Some(v) => Some(StockTarget::Variant(v.to_string())),
            None => Some(StockTarget::Item(self.id.clone())),
        }
    }

    /// Unit label for quantities of this item, if volume-tracked.
    pub fn unit_label(&self) -> Option<&str> {
        self.volume.as_ref().map(|v| v.unit_label.as_str())
    }
}

// =============================================================================
// Stock Target & Stock Check
// =============================================================================

/// The identity a stock check or decrement applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum StockTarget {
    Item(String),
    Variant(String),
}

impl StockTarget {
    pub fn id(&self) -> &str {
        match self {
            StockTarget::Item(id) | StockTarget::Variant(id) => id,
        }
    }

    pub fn is_variant(&self) -> bool {
        matches!(self, StockTarget::Variant(_))
    }
}

/// Outcome of a point-in-time availability read. Not a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockCheck {
    pub target: StockTarget,
    pub item_name: String,
    /// Total quantity the caller wants to hold (not just the increment).
    pub requested: i64,
    pub available_quantity: i64,
    pub available: bool,
    pub message: String,
}

impl StockCheck {
    /// Builds a check result from a stock reading.
    ///
    /// ```rust
    /// use kasa_core::types::{StockCheck, StockTarget};
    ///
    /// let check = StockCheck::evaluate(StockTarget::Item("p1".into()), "Sugar 1kg", 5, 3, None);
    /// assert!(!check.available);
    /// assert_eq!(check.message, "Only 3 of Sugar 1kg available, 5 requested");
    /// ```
    pub fn evaluate(
        target: StockTarget,
        item_name: impl Into<String>,
        requested: i64,
        available_quantity: i64,
        unit_label: Option<&str>,
    ) -> Self {
        let item_name = item_name.into();
        let available = requested <= available_quantity;
        let unit = unit_label.map(|u| format!(" {}", u)).unwrap_or_default();
        let message = if available {
            format!("{}{} of {} available", available_quantity, unit, item_name)
        } else if available_quantity <= 0 {
            format!("{} is out of stock", item_name)
        } else {
            format!(
                "Only {}{} of {} available, {}{} requested",
                available_quantity, unit, item_name, requested, unit
            )
        };
        StockCheck {
            target,
            item_name,
            requested,
            available_quantity,
            available,
            message,
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    /// Confirmed asynchronously by the mobile-money network.
    MobileMoney,
}

impl PaymentMethod {
    /// Methods whose receipt waits on an external confirmation callback.
    #[inline]
    pub const fn is_asynchronous(&self) -> bool {
        matches!(self, PaymentMethod::MobileMoney)
    }
}

// =============================================================================
// Privilege
// =============================================================================

/// Caller privilege as decided by the (external) authorization layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    #[default]
    Standard,
    /// Admin/manager: may override prices on items that disallow it.
    Elevated,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_prices_zero_means_unset() {
        let tiers = TierPrices {
            retail: Money::zero(),
            wholesale: Money::from_minor(900),
            individual: Money::zero(),
        };
        assert_eq!(tiers.get(PriceTier::Retail), None);
        assert_eq!(tiers.get(PriceTier::Wholesale), Some(Money::from_minor(900)));
        assert!(!tiers.is_empty());
        assert!(TierPrices::default().is_empty());
    }

    #[test]
    fn test_stock_target_prefers_variant() {
        let mut item = CatalogItem::new("d1", "T-Shirt", ItemKind::Product, Money::from_minor(2000));
        let variant = Variant::new(item.id.clone(), "Large", Money::from_minor(200), 4);
        let variant_id = variant.id.clone();
        item.variants.push(variant);

        assert_eq!(
            item.stock_target(Some(&variant_id)),
            Some(StockTarget::Variant(variant_id.clone()))
        );
        assert_eq!(item.stock_target(None), Some(StockTarget::Item(item.id.clone())));
    }

    #[test]
    fn test_services_are_untracked() {
        let service = CatalogItem::new("d1", "Installation", ItemKind::Service, Money::from_minor(500));
        assert!(service.stock_target(None).is_none());
        assert_eq!(service.stock_quantity, None);
    }

    #[test]
    fn test_stock_check_messages() {
        let ok = StockCheck::evaluate(StockTarget::Item("a".into()), "Milk", 2, 10, None);
        assert!(ok.available);

        let volume = StockCheck::evaluate(StockTarget::Item("b".into()), "Diesel", 5000, 1200, Some("ml"));
        assert!(!volume.available);
        assert_eq!(volume.message, "Only 1200 ml of Diesel available, 5000 ml requested");

        let empty = StockCheck::evaluate(StockTarget::Item("c".into()), "Bread", 1, 0, None);
        assert_eq!(empty.message, "Bread is out of stock");
    }

    #[test]
    fn test_payment_method_async() {
        assert!(PaymentMethod::MobileMoney.is_asynchronous());
        assert!(!PaymentMethod::Cash.is_asynchronous());
        assert!(!PaymentMethod::Card.is_asynchronous());
        assert!(!PaymentMethod::BankTransfer.is_asynchronous());
    }

    #[test]
    fn test_stock_target_serialization() {
        let json = serde_json::to_string(&StockTarget::Variant("v1".into())).unwrap();
        assert_eq!(json, r#"{"type":"variant","id":"v1"}"#);
    }
}
