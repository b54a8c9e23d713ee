//! # Cart
//!
//! One in-progress customer interaction: an ordered list of line items, a
//! customer label and a payment-method selection.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Operation        Stock check needed?          Effect                   │
//! │  ─────────        ───────────────────          ──────                   │
//! │  add_item         yes, for existing + added     push or increment        │
//! │  set_quantity     only when increasing          qty ≤ 0 removes line     │
//! │  remove_item      no                            drop line                │
//! │  set_price        no (policy + privilege)       override unit price      │
//! │  set_tier         no                            re-resolve unit price    │
//! │                                                                         │
//! │  A failed operation leaves the cart exactly as it was.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cart does not read stock itself. The caller asks the Stock Ledger for
//! the prospective total and hands the resulting [`StockCheck`] in; the cart
//! refuses checks that do not cover the exact target and total.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::pricing::{resolve_price, validate_custom_price};
use crate::types::{CatalogItem, CustomPricePolicy, ItemKind, PaymentMethod, PriceTier, Privilege, StockCheck, StockTarget};
use crate::validation::{normalize_label, validate_cart_size, validate_quantity};

// =============================================================================
// Line Key
// =============================================================================

/// Composite identity of a line: re-adding the same key increments quantity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub item_id: String,
    pub variant_id: Option<String>,
}

impl LineKey {
    pub fn new(item_id: impl Into<String>, variant_id: Option<&str>) -> Self {
        LineKey {
            item_id: item_id.into(),
            variant_id: variant_id.map(str::to_string),
        }
    }
}

impl std::fmt::Display for LineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.variant_id {
            Some(v) => write!(f, "{}/{}", self.item_id, v),
            None => write!(f, "{}", self.item_id),
        }
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// A line in the cart.
///
/// Name, price and policy are frozen when the line is created; the subtotal
/// is never stored and always derived from price × quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub key: LineKey,
    /// Display name, with the variant name appended.
    pub name: String,
    pub kind: ItemKind,
    pub unit_price: Money,
    /// Count, or volume units for volume-tracked items.
    pub quantity: i64,
    pub tier: PriceTier,
    /// Set when a cashier overrode the resolved price.
    pub custom_price: bool,
    pub price_policy: CustomPricePolicy,
    /// Ledger row this line draws from; `None` when untracked.
    pub stock_target: Option<StockTarget>,
    pub unit_label: Option<String>,
}

impl LineItem {
    /// Line subtotal (unit price × quantity).
    #[inline]
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    #[inline]
    pub fn is_volume_tracked(&self) -> bool {
        self.unit_label.is_some()
    }
}

// =============================================================================
// Stock Demand
// =============================================================================

/// Total quantity a cart needs from one ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDemand {
    pub target: StockTarget,
    pub item_name: String,
    pub quantity: i64,
}

/// Summary figures for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub line_count: usize,
    pub total_quantity: i64,
    pub subtotal: Money,
}

// =============================================================================
// Cart
// =============================================================================

/// The shopping cart of one order tab.
///
/// ## Invariants
/// - Lines are unique by [`LineKey`]
/// - Every quantity is > 0 (setting qty ≤ 0 removes the line)
/// - For stock-tracked lines, the quantity never exceeds the availability
///   the ledger reported for that exact total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: String,
    pub customer_label: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub lines: Vec<LineItem>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Cart::new()
    }
}

impl Cart {
    /// Creates a new empty cart with a fresh identity.
    pub fn new() -> Self {
        Cart {
            id: Uuid::new_v4().to_string(),
            customer_label: None,
            payment_method: None,
            lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, key: &LineKey) -> Option<&LineItem> {
        self.lines.iter().find(|l| &l.key == key)
    }

    fn line_mut(&mut self, key: &LineKey) -> CoreResult<&mut LineItem> {
        self.lines
            .iter_mut()
            .find(|l| &l.key == key)
            .ok_or_else(|| CoreError::LineNotFound(key.to_string()))
    }

    /// Quantity already held for a key (0 if absent).
    pub fn quantity_of(&self, key: &LineKey) -> i64 {
        self.line(key).map(|l| l.quantity).unwrap_or(0)
    }

    /// Adds `quantity` of an item (and variant) or increments the existing line.
    ///
    /// ## Behavior
    /// - Items with variants require a variant.
    /// - Stock-tracked lines need `stock` to be the ledger's answer for
    ///   `quantity_of(key) + quantity`; an unavailable answer becomes
    ///   [`CoreError::InsufficientStock`].
    /// - Price comes from [`resolve_price`] with the requested tier. An
    ///   existing line keeps its price and tier.
    pub fn add_item(
        &mut self,
        item: &CatalogItem,
        variant_id: Option<&str>,
        quantity: i64,
        tier: Option<PriceTier>,
        stock: Option<&StockCheck>,
    ) -> CoreResult<&LineItem> {
        if !item.is_active {
            return Err(CoreError::ItemNotFound(item.id.clone()));
        }

        let variant = match variant_id {
            Some(v) => Some(item.variant(v).ok_or_else(|| CoreError::VariantNotFound {
                item_id: item.id.clone(),
                variant_id: v.to_string(),
            })?),
            None if item.has_variants() => {
                return Err(ValidationError::Required {
                    field: "variant".to_string(),
                }
                .into())
            }
            None => None,
        };

        validate_quantity(quantity, item.is_volume_tracked())?;

        let key = LineKey::new(item.id.clone(), variant_id);
        let existing = self.line(&key).is_some();
        let prospective = self.quantity_of(&key) + quantity;
        validate_quantity(prospective, item.is_volume_tracked())?;
        if !existing {
            validate_cart_size(self.lines.len())?;
        }

        let name = match variant {
            Some(v) => format!("{} ({})", item.name, v.name),
            None => item.name.clone(),
        };
        let target = item.stock_target(variant_id);
        if let Some(target) = &target {
            ensure_covered(target, &name, prospective, stock)?;
        }

        if let Some(unit_price) = self.line(&key).map(|l| l.unit_price) {
            self.ensure_amounts_fit(&key, unit_price, prospective)?;
            let line = self.line_mut(&key)?;
            line.quantity = prospective;
            return Ok(line);
        }

        let resolved = resolve_price(item, variant, tier);
        self.ensure_amounts_fit(&key, resolved.unit_price, quantity)?;
        self.lines.push(LineItem {
            key,
            name,
            kind: item.kind,
            unit_price: resolved.unit_price,
            quantity,
            tier: resolved.tier,
            custom_price: false,
            price_policy: item.price_policy,
            stock_target: target,
            unit_label: item.unit_label().map(str::to_string),
        });
        let idx = self.lines.len() - 1;
        Ok(&self.lines[idx])
    }

    /// Removes a line and returns it.
    pub fn remove_item(&mut self, key: &LineKey) -> CoreResult<LineItem> {
        let idx = self
            .lines
            .iter()
            .position(|l| &l.key == key)
            .ok_or_else(|| CoreError::LineNotFound(key.to_string()))?;
        Ok(self.lines.remove(idx))
    }

    /// Sets a line's quantity.
    ///
    /// Quantity ≤ 0 removes the line. Increasing a stock-tracked line needs
    /// a check covering the new quantity; decreasing never does.
    pub fn set_quantity(&mut self, key: &LineKey, quantity: i64, stock: Option<&StockCheck>) -> CoreResult<()> {
        if quantity <= 0 {
            self.remove_item(key)?;
            return Ok(());
        }

        let line = self
            .line(key)
            .ok_or_else(|| CoreError::LineNotFound(key.to_string()))?;
        validate_quantity(quantity, line.is_volume_tracked())?;

        if quantity > line.quantity {
            if let Some(target) = &line.stock_target {
                ensure_covered(target, &line.name, quantity, stock)?;
            }
        }
        self.ensure_amounts_fit(key, line.unit_price, quantity)?;

        self.line_mut(key)?.quantity = quantity;
        Ok(())
    }

    /// Overrides a line's unit price after checking the frozen price policy.
    pub fn set_price(&mut self, key: &LineKey, price: Money, privilege: Privilege) -> CoreResult<()> {
        let line = self
            .line(key)
            .ok_or_else(|| CoreError::LineNotFound(key.to_string()))?;
        validate_custom_price(&line.name, &line.price_policy, price, privilege)?;
        self.ensure_amounts_fit(key, price, line.quantity)?;

        let line = self.line_mut(key)?;
        line.unit_price = price;
        line.custom_price = true;
        Ok(())
    }

    /// Re-prices a line at another tier using the current catalog entry.
    ///
    /// Clears any custom price on the line.
    pub fn set_tier(&mut self, key: &LineKey, tier: PriceTier, item: &CatalogItem) -> CoreResult<PriceTier> {
        if item.id != key.item_id {
            return Err(CoreError::ItemNotFound(key.item_id.clone()));
        }
        let variant = match key.variant_id.as_deref() {
            Some(v) => Some(item.variant(v).ok_or_else(|| CoreError::VariantNotFound {
                item_id: item.id.clone(),
                variant_id: v.to_string(),
            })?),
            None => None,
        };

        let quantity = self
            .line(key)
            .ok_or_else(|| CoreError::LineNotFound(key.to_string()))?
            .quantity;
        let resolved = resolve_price(item, variant, Some(tier));
        self.ensure_amounts_fit(key, resolved.unit_price, quantity)?;

        let line = self.line_mut(key)?;
        line.unit_price = resolved.unit_price;
        line.tier = resolved.tier;
        line.custom_price = false;
        Ok(resolved.tier)
    }

    pub fn set_customer_label(&mut self, label: Option<&str>) -> CoreResult<()> {
        self.customer_label = normalize_label("customer", label)?;
        Ok(())
    }

    pub fn set_payment_method(&mut self, method: Option<PaymentMethod>) {
        self.payment_method = method;
    }

    /// Sum of all line subtotals.
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(LineItem::subtotal).sum()
    }

    pub fn totals(&self) -> CartTotals {
        CartTotals {
            line_count: self.lines.len(),
            total_quantity: self.lines.iter().map(|l| l.quantity).sum(),
            subtotal: self.subtotal(),
        }
    }

    /// Fails when giving `key` this price and quantity would overflow the
    /// line total or the cart subtotal.
    fn ensure_amounts_fit(&self, key: &LineKey, unit_price: Money, quantity: i64) -> CoreResult<()> {
        let overflow = || ValidationError::AmountOverflow {
            field: "cart total".to_string(),
        };
        let line_total = unit_price.checked_multiply_quantity(quantity).ok_or_else(overflow)?;
        self.lines
            .iter()
            .filter(|l| &l.key != key)
            .try_fold(line_total, |acc, l| acc.checked_add(l.subtotal()))
            .ok_or_else(overflow)?;
        Ok(())
    }

    /// Quantity needed from each ledger row, ordered by target.
    ///
    /// Ordering by target keeps concurrent commits touching rows in the
    /// same order.
    pub fn stock_demands(&self) -> Vec<StockDemand> {
        let mut demands: BTreeMap<StockTarget, StockDemand> = BTreeMap::new();
        for line in &self.lines {
            let Some(target) = &line.stock_target else {
                continue;
            };
            demands
                .entry(target.clone())
                .and_modify(|d| d.quantity += line.quantity)
                .or_insert_with(|| StockDemand {
                    target: target.clone(),
                    item_name: line.name.clone(),
                    quantity: line.quantity,
                });
        }
        demands.into_values().collect()
    }
}

/// Accepts a stock check only if it answers for `target` at exactly `total`
/// and reports enough stock.
fn ensure_covered(target: &StockTarget, name: &str, total: i64, stock: Option<&StockCheck>) -> CoreResult<()> {
    let check = match stock {
        Some(check) if &check.target == target && check.requested == total => check,
        _ => {
            return Err(CoreError::StaleStockCheck {
                item_name: name.to_string(),
                expected: total,
            })
        }
    };

    if !check.available {
        return Err(CoreError::InsufficientStock {
            item_name: name.to_string(),
            requested: total,
            available: check.available_quantity,
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
    use crate::types::{Variant, VolumePricing};
    use proptest::prelude::*;

    fn product(price: i64, stock: i64) -> CatalogItem {
        let mut item = CatalogItem::new("dept", "Sugar 1kg", ItemKind::Product, Money::from_minor(price));
        item.stock_quantity = Some(stock);
        item
    }

    fn check_for(item: &CatalogItem, variant: Option<&str>, requested: i64, stock: i64) -> StockCheck {
        StockCheck::evaluate(item.stock_target(variant).unwrap(), item.name.clone(), requested, stock, None)
    }

    #[test]
    fn test_add_item_and_merge_same_key() {
        let item = product(1000, 10);
        let mut cart = Cart::new();

        cart.add_item(&item, None, 2, None, Some(&check_for(&item, None, 2, 10))).unwrap();
        cart.add_item(&item, None, 3, None, Some(&check_for(&item, None, 5, 10))).unwrap();

        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 5);
        assert_eq!(cart.subtotal(), Money::from_minor(5000));
    }

    #[test]
    fn test_add_item_checks_prospective_total() {
        let item = product(1000, 5);
        let mut cart = Cart::new();
        cart.add_item(&item, None, 4, None, Some(&check_for(&item, None, 4, 5))).unwrap();

        // A check for just the increment is refused.
        let err = cart
            .add_item(&item, None, 2, None, Some(&check_for(&item, None, 2, 5)))
            .unwrap_err();
        assert!(matches!(err, CoreError::StaleStockCheck { expected: 6, .. }));

        let err = cart
            .add_item(&item, None, 2, None, Some(&check_for(&item, None, 6, 5)))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { requested: 6, available: 5, .. }
        ));
        assert_eq!(cart.lines[0].quantity, 4);
    }

    #[test]
    fn test_tracked_item_without_check_is_rejected() {
        let item = product(1000, 5);
        let mut cart = Cart::new();
        assert!(cart.add_item(&item, None, 1, None, None).is_err());
        assert!(cart.is_empty());
    }

    #[test]
    fn test_service_needs_no_stock_check() {
        let service = CatalogItem::new("dept", "Delivery", ItemKind::Service, Money::from_minor(500));
        let mut cart = Cart::new();
        let line = cart.add_item(&service, None, 1, None, None).unwrap();
        assert!(line.stock_target.is_none());
        assert!(cart.stock_demands().is_empty());
    }

    #[test]
    fn test_variant_required_and_priced() {
        let mut item = product(2000, 0);
        let variant = Variant::new(item.id.clone(), "Large", Money::from_minor(300), 3);
        let vid = variant.id.clone();
        item.variants.push(variant);

        let mut cart = Cart::new();
        assert!(cart.add_item(&item, None, 1, None, None).is_err());

        let check = check_for(&item, Some(&vid), 1, 3);
        let line = cart.add_item(&item, Some(&vid), 1, None, Some(&check)).unwrap();
        assert_eq!(line.unit_price, Money::from_minor(2300));
        assert_eq!(line.name, "Sugar 1kg (Large)");
        assert_eq!(line.stock_target, Some(StockTarget::Variant(vid)));
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let item = product(1000, 10);
        let mut cart = Cart::new();
        cart.add_item(&item, None, 2, None, Some(&check_for(&item, None, 2, 10))).unwrap();

        let key = LineKey::new(item.id.clone(), None);
        cart.set_quantity(&key, 0, None).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_decrease_without_check() {
        let item = product(1000, 10);
        let mut cart = Cart::new();
        cart.add_item(&item, None, 5, None, Some(&check_for(&item, None, 5, 10))).unwrap();

        let key = LineKey::new(item.id.clone(), None);
        cart.set_quantity(&key, 3, None).unwrap();
        assert_eq!(cart.quantity_of(&key), 3);

        assert!(cart.set_quantity(&key, 8, None).is_err());
        cart.set_quantity(&key, 8, Some(&check_for(&item, None, 8, 10))).unwrap();
        assert_eq!(cart.quantity_of(&key), 8);
    }

    #[test]
    fn test_set_price_respects_policy() {
        let mut item = product(5000, 10);
        item.price_policy = CustomPricePolicy {
            allow_custom_price: true,
            min_price: Some(Money::from_minor(4000)),
            max_price: Some(Money::from_minor(6000)),
        };
        let mut cart = Cart::new();
        cart.add_item(&item, None, 1, None, Some(&check_for(&item, None, 1, 10))).unwrap();
        let key = LineKey::new(item.id.clone(), None);

        cart.set_price(&key, Money::from_minor(4500), Privilege::Standard).unwrap();
        assert_eq!(cart.subtotal(), Money::from_minor(4500));
        assert!(cart.line(&key).unwrap().custom_price);

        assert!(cart.set_price(&key, Money::from_minor(3000), Privilege::Standard).is_err());
        assert_eq!(cart.subtotal(), Money::from_minor(4500));
    }

    #[test]
    fn test_amount_overflow_is_rejected() {
        let mut item = product(5000, 10);
        item.price_policy = CustomPricePolicy {
            allow_custom_price: true,
            min_price: None,
            max_price: None,
        };
        let mut cart = Cart::new();
        cart.add_item(&item, None, 1, None, Some(&check_for(&item, None, 1, 10))).unwrap();
        let key = LineKey::new(item.id.clone(), None);

        let huge = Money::from_minor(i64::MAX / 2);
        cart.set_price(&key, huge, Privilege::Elevated).unwrap();

        let err = cart.set_quantity(&key, 3, Some(&check_for(&item, None, 3, 10))).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::AmountOverflow { .. })
        ));
        assert_eq!(cart.quantity_of(&key), 1);

        // A second line pushing the subtotal over is refused too
        let mut other = product(1000, 10);
        other.base_price = huge;
        let err = cart
            .add_item(&other, None, 2, None, Some(&check_for(&other, None, 2, 10)))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::AmountOverflow { .. })));
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.subtotal(), huge);
    }

    #[test]
    fn test_set_tier_reprices() {
        let mut item = product(1200, 10);
        item.tier_prices.retail = Money::from_minor(1100);
        item.tier_prices.wholesale = Money::from_minor(1000);
        let mut cart = Cart::new();
        cart.add_item(&item, None, 2, None, Some(&check_for(&item, None, 2, 10))).unwrap();
        let key = LineKey::new(item.id.clone(), None);
        assert_eq!(cart.subtotal(), Money::from_minor(2200));

        let tier = cart.set_tier(&key, PriceTier::Wholesale, &item).unwrap();
        assert_eq!(tier, PriceTier::Wholesale);
        assert_eq!(cart.subtotal(), Money::from_minor(2000));
    }

    #[test]
    fn test_volume_line_uses_volume_units() {
        let mut item = product(0, 20_000);
        item.name = "Diesel".to_string();
        item.volume = Some(VolumePricing {
            unit_label: "ml".to_string(),
            retail_per_unit: Money::from_minor(2),
            wholesale_per_unit: Money::zero(),
        });
        let mut cart = Cart::new();
        let check = StockCheck::evaluate(item.stock_target(None).unwrap(), "Diesel", 5_000, 20_000, Some("ml"));
        let line = cart.add_item(&item, None, 5_000, None, Some(&check)).unwrap();
        assert_eq!(line.subtotal(), Money::from_minor(10_000));
        assert_eq!(line.unit_label.as_deref(), Some("ml"));
    }

    #[test]
    fn test_stock_demands_and_totals() {
        let a = product(1000, 10);
        let b = product(300, 10);
        let svc = CatalogItem::new("dept", "Wrap", ItemKind::Service, Money::from_minor(100));
        let mut cart = Cart::new();
        cart.add_item(&a, None, 2, None, Some(&check_for(&a, None, 2, 10))).unwrap();
        cart.add_item(&b, None, 3, None, Some(&check_for(&b, None, 3, 10))).unwrap();
        cart.add_item(&svc, None, 1, None, None).unwrap();

        let demands = cart.stock_demands();
        assert_eq!(demands.len(), 2);
        assert_eq!(demands.iter().map(|d| d.quantity).sum::<i64>(), 5);

        let totals = cart.totals();
        assert_eq!(totals.line_count, 3);
        assert_eq!(totals.total_quantity, 6);
        assert_eq!(totals.subtotal, Money::from_minor(3000));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(i64),
        Set(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![(1i64..6).prop_map(Op::Add), (-2i64..12).prop_map(Op::Set)]
    }

    proptest! {
        /// Whatever the sequence of adds and quantity edits, the cart never
        /// holds more than the stock the ledger last reported.
        #[test]
        fn prop_cart_quantity_never_exceeds_stock(stock in 0i64..15, ops in prop::collection::vec(op(), 1..30)) {
            let item = product(100, stock);
            let key = LineKey::new(item.id.clone(), None);
            let mut cart = Cart::new();

            for op in ops {
                match op {
                    Op::Add(n) => {
                        let total = cart.quantity_of(&key) + n;
                        let check = check_for(&item, None, total, stock);
                        let _ = cart.add_item(&item, None, n, None, Some(&check));
                    }
                    Op::Set(n) => {
                        let check = check_for(&item, None, n, stock);
                        let _ = cart.set_quantity(&key, n, Some(&check));
                    }
                }
                prop_assert!(cart.quantity_of(&key) <= stock);
                prop_assert!(cart.lines.iter().all(|l| l.quantity > 0));
            }
        }
    }
}
