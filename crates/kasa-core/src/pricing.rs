//! # Pricing Resolver
//!
//! Turns a catalog item, an optional variant and an optional requested tier
//! into the unit price a line item carries.
//!
//! ## Resolution Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  resolve_price(item, variant?, tier?)                                  │
//! │                                                                         │
//! │  1. Volume-tracked?                                                     │
//! │     ├── explicit Retail/Wholesale rate, if non-zero                    │
//! │     ├── retail_per_unit, if non-zero                                   │
//! │     ├── wholesale_per_unit, if non-zero                                │
//! │     └── base_price                                                      │
//! │                                                                         │
//! │  2. Tiered prices configured?                                          │
//! │     ├── explicit tier, if non-zero                                     │
//! │     └── first non-zero of retail → wholesale → individual              │
//! │                                                                         │
//! │  3. base_price                                                          │
//! │                                                                         │
//! │  4. + variant.price_adjustment   (always LAST, a delta not a price)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Custom-price validation is a separate step ([`validate_custom_price`]),
//! applied when a cashier overrides the resolved price.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{CatalogItem, CustomPricePolicy, PriceTier, Privilege, TierPrices, Variant, VolumePricing};

/// A unit price together with the tier that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPrice {
    pub unit_price: Money,
    pub tier: PriceTier,
}

/// Resolves the unit price for a line.
///
/// ## Example
/// ```rust
/// use kasa_core::money::Money;
/// use kasa_core::pricing::resolve_price;
/// use kasa_core::types::{CatalogItem, ItemKind, PriceTier, Variant};
///
/// let mut item = CatalogItem::new("d1", "Jacket", ItemKind::Product, Money::from_minor(5000));
/// item.tier_prices.retail = Money::from_minor(4500);
/// let xl = Variant::new(item.id.clone(), "XL", Money::from_minor(300), 2);
///
/// let price = resolve_price(&item, Some(&xl), None);
/// assert_eq!(price.unit_price, Money::from_minor(4800));
/// assert_eq!(price.tier, PriceTier::Retail);
/// ```
pub fn resolve_price(item: &CatalogItem, variant: Option<&Variant>, requested: Option<PriceTier>) -> ResolvedPrice {
    let base = match &item.volume {
        Some(volume) => resolve_volume(volume, item.base_price, requested),
        None if !item.tier_prices.is_empty() => resolve_tier(&item.tier_prices, requested),
        None => None,
    };

    let ResolvedPrice { unit_price, tier } = base.unwrap_or(ResolvedPrice {
        unit_price: item.base_price,
        tier: PriceTier::Default,
    });

    let adjustment = variant.map(|v| v.price_adjustment).unwrap_or_default();

    ResolvedPrice {
        unit_price: unit_price + adjustment,
        tier,
    }
}

fn resolve_volume(volume: &VolumePricing, base: Money, requested: Option<PriceTier>) -> Option<ResolvedPrice> {
    let rate = |tier: PriceTier| match tier {
        PriceTier::Retail => volume.retail_per_unit.non_zero(),
        PriceTier::Wholesale => volume.wholesale_per_unit.non_zero(),
        PriceTier::Default | PriceTier::Individual => None,
    };

    let explicit = requested.and_then(|t| rate(t).map(|p| (p, t)));
    let picked = explicit
        .or_else(|| rate(PriceTier::Retail).map(|p| (p, PriceTier::Retail)))
        .or_else(|| rate(PriceTier::Wholesale).map(|p| (p, PriceTier::Wholesale)));

    Some(match picked {
        Some((unit_price, tier)) => ResolvedPrice { unit_price, tier },
        None => ResolvedPrice {
            unit_price: base,
            tier: PriceTier::Default,
        },
    })
}

fn resolve_tier(tiers: &TierPrices, requested: Option<PriceTier>) -> Option<ResolvedPrice> {
    let explicit = requested
        .filter(|t| *t != PriceTier::Default)
        .and_then(|t| tiers.get(t).map(|p| (p, t)));

    explicit
        .or_else(|| TierPrices::ORDER.iter().find_map(|t| tiers.get(*t).map(|p| (p, *t))))
        .map(|(unit_price, tier)| ResolvedPrice { unit_price, tier })
}

/// Validates a cashier-entered price against the item's policy.
///
/// ## Rules
/// - Negative prices are never accepted.
/// - `allow_custom_price == false` rejects, unless the caller is
///   [`Privilege::Elevated`].
/// - `min_price` / `max_price` bound the price for every caller; an absent
///   bound leaves that side open.
///
/// ```rust
/// use kasa_core::money::Money;
/// use kasa_core::pricing::validate_custom_price;
/// use kasa_core::types::{CustomPricePolicy, Privilege};
///
/// let policy = CustomPricePolicy {
///     allow_custom_price: true,
///     min_price: Some(Money::from_minor(4000)),
///     max_price: Some(Money::from_minor(6000)),
/// };
/// assert!(validate_custom_price("Rice", &policy, Money::from_minor(5000), Privilege::Standard).is_ok());
/// assert!(validate_custom_price("Rice", &policy, Money::from_minor(3000), Privilege::Standard).is_err());
/// ```
pub fn validate_custom_price(
    item_name: &str,
    policy: &CustomPricePolicy,
    proposed: Money,
    privilege: Privilege,
) -> Result<(), ValidationError> {
    if proposed.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    if !policy.allow_custom_price && privilege != Privilege::Elevated {
        return Err(ValidationError::CustomPriceNotAllowed {
            item_name: item_name.to_string(),
        });
    }

    let below = policy.min_price.is_some_and(|min| proposed < min);
    let above = policy.max_price.is_some_and(|max| proposed > max);
    if below || above {
        return Err(ValidationError::PriceOutOfRange {
            item_name: item_name.to_string(),
            price: proposed,
            min: policy.min_price,
            max: policy.max_price,
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
    use crate::types::ItemKind;

    fn product(base: i64) -> CatalogItem {
        CatalogItem::new("dept", "Item", ItemKind::Product, Money::from_minor(base))
    }

    fn bounded(allow: bool) -> CustomPricePolicy {
        CustomPricePolicy {
            allow_custom_price: allow,
            min_price: Some(Money::from_minor(4000)),
            max_price: Some(Money::from_minor(6000)),
        }
    }

    #[test]
    fn test_flat_price_without_tiers() {
        let item = product(1200);
        let resolved = resolve_price(&item, None, None);
        assert_eq!(resolved.unit_price, Money::from_minor(1200));
        assert_eq!(resolved.tier, PriceTier::Default);
    }

    #[test]
    fn test_only_wholesale_tier_wins_over_base() {
        let mut item = product(1200);
        item.tier_prices.wholesale = Money::from_minor(1000);

        let resolved = resolve_price(&item, None, None);
        assert_eq!(resolved.unit_price, Money::from_minor(1000));
        assert_eq!(resolved.tier, PriceTier::Wholesale);
    }

    #[test]
    fn test_explicit_tier_used_when_non_zero() {
        let mut item = product(1200);
        item.tier_prices = TierPrices {
            retail: Money::from_minor(1100),
            wholesale: Money::from_minor(1000),
            individual: Money::from_minor(950),
        };

        let resolved = resolve_price(&item, None, Some(PriceTier::Individual));
        assert_eq!(resolved.unit_price, Money::from_minor(950));
        assert_eq!(resolved.tier, PriceTier::Individual);

        let default = resolve_price(&item, None, None);
        assert_eq!(default.tier, PriceTier::Retail);
    }

    #[test]
    fn test_explicit_zero_tier_falls_back_to_default_order() {
        let mut item = product(1200);
        item.tier_prices.wholesale = Money::from_minor(1000);
        item.tier_prices.individual = Money::from_minor(900);

        let resolved = resolve_price(&item, None, Some(PriceTier::Retail));
        assert_eq!(resolved.unit_price, Money::from_minor(1000));
        assert_eq!(resolved.tier, PriceTier::Wholesale);
    }

    #[test]
    fn test_volume_prefers_retail_rate() {
        let mut item = product(5000);
        item.tier_prices.retail = Money::from_minor(9999);
        item.volume = Some(VolumePricing {
            unit_label: "ml".to_string(),
            retail_per_unit: Money::from_minor(3),
            wholesale_per_unit: Money::from_minor(2),
        });

        let resolved = resolve_price(&item, None, None);
        assert_eq!(resolved.unit_price, Money::from_minor(3));
        assert_eq!(resolved.tier, PriceTier::Retail);

        let wholesale = resolve_price(&item, None, Some(PriceTier::Wholesale));
        assert_eq!(wholesale.unit_price, Money::from_minor(2));
    }

    #[test]
    fn test_volume_falls_back_to_wholesale_then_flat() {
        let mut item = product(5000);
        item.volume = Some(VolumePricing {
            unit_label: "ml".to_string(),
            retail_per_unit: Money::zero(),
            wholesale_per_unit: Money::from_minor(2),
        });
        assert_eq!(resolve_price(&item, None, None).unit_price, Money::from_minor(2));

        item.volume = Some(VolumePricing {
            unit_label: "ml".to_string(),
            retail_per_unit: Money::zero(),
            wholesale_per_unit: Money::zero(),
        });
        let flat = resolve_price(&item, None, None);
        assert_eq!(flat.unit_price, Money::from_minor(5000));
        assert_eq!(flat.tier, PriceTier::Default);
    }

    #[test]
    fn test_variant_adjustment_added_after_tier() {
        let mut item = product(1200);
        item.tier_prices.wholesale = Money::from_minor(1000);
        let variant = Variant::new(item.id.clone(), "Large", Money::from_minor(250), 3);

        let resolved = resolve_price(&item, Some(&variant), None);
        assert_eq!(resolved.unit_price, Money::from_minor(1250));
        assert_eq!(resolved.tier, PriceTier::Wholesale);
    }

    #[test]
    fn test_custom_price_within_bounds() {
        let policy = bounded(true);
        assert!(validate_custom_price("Rice", &policy, Money::from_minor(5000), Privilege::Standard).is_ok());
        assert!(validate_custom_price("Rice", &policy, Money::from_minor(4000), Privilege::Standard).is_ok());
        assert!(validate_custom_price("Rice", &policy, Money::from_minor(6000), Privilege::Standard).is_ok());
    }

    #[test]
    fn test_custom_price_out_of_range() {
        let policy = bounded(true);
        let err = validate_custom_price("Rice", &policy, Money::from_minor(3000), Privilege::Standard).unwrap_err();
        assert!(matches!(err, ValidationError::PriceOutOfRange { .. }));

        let err = validate_custom_price("Rice", &policy, Money::from_minor(7000), Privilege::Elevated).unwrap_err();
        assert!(matches!(err, ValidationError::PriceOutOfRange { .. }));
    }

    #[test]
    fn test_disallowed_custom_price_needs_privilege() {
        let policy = bounded(false);
        let err = validate_custom_price("Rice", &policy, Money::from_minor(5000), Privilege::Standard).unwrap_err();
        assert!(matches!(err, ValidationError::CustomPriceNotAllowed { .. }));

        assert!(validate_custom_price("Rice", &policy, Money::from_minor(5000), Privilege::Elevated).is_ok());
    }

    #[test]
    fn test_open_bounds() {
        let policy = CustomPricePolicy {
            allow_custom_price: true,
            min_price: None,
            max_price: Some(Money::from_minor(100)),
        };
        assert!(validate_custom_price("Pen", &policy, Money::zero(), Privilege::Standard).is_ok());
        assert!(validate_custom_price("Pen", &policy, Money::from_minor(-1), Privilege::Elevated).is_err());
    }
}
