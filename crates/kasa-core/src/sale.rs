//! # Sale
//!
//! The immutable record of a committed cart, and the state machine the
//! finalizer walks while producing it.
//!
//! ## Finalizer State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Draft ──► Validating ──► Committing ──┬──► Completed ───────┐          │
//! │                │              │        │                     ▼          │
//! │                ▼              ▼        └──► AwaitingPayment ──► Finalized│
//! │           (rejected,     (conflict,           Confirmation      │       │
//! │            no writes)     rolled back)            │             ▼       │
//! │                                                   └────────► Voided     │
//! │                                                                         │
//! │  Completed: synchronous payment (cash, card, bank transfer)             │
//! │  AwaitingPaymentConfirmation: mobile money, receipt deferred            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the last three states are ever persisted, as [`SaleStatus`].
//!
//! ## Snapshot Pattern
//! [`SaleLine`] copies name, price and quantity out of the cart. Later
//! catalog edits never change a recorded sale.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::cart::Cart;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{ItemKind, PaymentMethod, PriceTier};

// =============================================================================
// Finalizer State
// =============================================================================

/// Checkout progress of one cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizerState {
    Draft,
    Validating,
    Committing,
    Completed,
    AwaitingPaymentConfirmation,
    Finalized,
    Voided,
}

impl FinalizerState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: FinalizerState) -> bool {
        use FinalizerState::*;
        matches!(
            (self, next),
            (Draft, Validating)
                | (Validating, Committing)
                | (Committing, Completed)
                | (Committing, AwaitingPaymentConfirmation)
                | (Completed, Finalized)
                | (AwaitingPaymentConfirmation, Finalized)
                | (AwaitingPaymentConfirmation, Voided)
                | (Finalized, Voided)
        )
    }

    /// Moves to `next` or reports the illegal transition.
    pub fn transition(self, next: FinalizerState) -> CoreResult<FinalizerState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: format!("{:?}", self),
                to: format!("{:?}", next),
            })
        }
    }

    /// State right after a successful commit for the given payment method.
    pub fn after_commit(method: PaymentMethod) -> FinalizerState {
        if method.is_asynchronous() {
            FinalizerState::AwaitingPaymentConfirmation
        } else {
            FinalizerState::Completed
        }
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// Persisted status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Stock committed, mobile-money confirmation outstanding.
    AwaitingPaymentConfirmation,
    /// Paid; a receipt exists.
    Finalized,
    /// Cancelled by an operator.
    Voided,
}

impl SaleStatus {
    pub fn as_state(self) -> FinalizerState {
        match self {
            SaleStatus::AwaitingPaymentConfirmation => FinalizerState::AwaitingPaymentConfirmation,
            SaleStatus::Finalized => FinalizerState::Finalized,
            SaleStatus::Voided => FinalizerState::Voided,
        }
    }

    pub fn can_void(self) -> bool {
        self.as_state().can_transition_to(FinalizerState::Voided)
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaleStatus::AwaitingPaymentConfirmation => "awaiting_payment_confirmation",
            SaleStatus::Finalized => "finalized",
            SaleStatus::Voided => "voided",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Sale & Sale Line
// =============================================================================

/// A committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    pub department_id: String,
    pub terminal_id: String,
    /// Cart this sale was made from; at most one sale per cart.
    pub cart_id: String,
    pub receipt_number: String,
    pub status: SaleStatus,
    pub payment_method: PaymentMethod,
    pub customer_label: Option<String>,
    pub subtotal: Money,
    pub total: Money,
    pub line_count: i64,
    /// Business timestamp; may be backdated (date only, see [`stamp_sale_time`]).
    #[ts(as = "String")]
    pub sold_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub finalized_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    /// Last gateway failure or timeout while awaiting confirmation.
    pub payment_error: Option<String>,
}

/// A decoupled copy of a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub id: String,
    pub sale_id: String,
    pub position: i64,
    pub item_id: String,
    pub variant_id: Option<String>,
    pub name: String,
    pub kind: ItemKind,
    pub tier: PriceTier,
    pub unit_price: Money,
    pub quantity: i64,
    pub unit_label: Option<String>,
    pub line_total: Money,
}

/// Header fields supplied by the engine context, not the cart.
#[derive(Debug, Clone)]
pub struct SaleContext<'a> {
    pub department_id: &'a str,
    pub terminal_id: &'a str,
    pub receipt_number: String,
    pub sold_at: DateTime<Utc>,
}

/// Rejects carts that cannot be checked out and returns the payment method.
///
/// Runs before anything is read or written.
pub fn validate_for_checkout(cart: &Cart) -> CoreResult<PaymentMethod> {
    if cart.is_empty() {
        return Err(ValidationError::CartEmpty.into());
    }
    cart.payment_method
        .ok_or_else(|| ValidationError::PaymentMethodRequired.into())
}

impl Sale {
    /// Builds the sale header and its decoupled lines from a cart.
    pub fn from_cart(cart: &Cart, ctx: SaleContext<'_>) -> CoreResult<(Sale, Vec<SaleLine>)> {
        let method = validate_for_checkout(cart)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let lines: Vec<SaleLine> = cart
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| SaleLine {
                id: Uuid::new_v4().to_string(),
                sale_id: id.clone(),
                position: i as i64,
                item_id: line.key.item_id.clone(),
                variant_id: line.key.variant_id.clone(),
                name: line.name.clone(),
                kind: line.kind,
                tier: line.tier,
                unit_price: line.unit_price,
                quantity: line.quantity,
                unit_label: line.unit_label.clone(),
                line_total: line.subtotal(),
            })
            .collect();

        let subtotal: Money = lines.iter().map(|l| l.line_total).sum();
        let status = if method.is_asynchronous() {
            SaleStatus::AwaitingPaymentConfirmation
        } else {
            SaleStatus::Finalized
        };

        let sale = Sale {
            id,
            department_id: ctx.department_id.to_string(),
            terminal_id: ctx.terminal_id.to_string(),
            cart_id: cart.id.clone(),
            receipt_number: ctx.receipt_number,
            status,
            payment_method: method,
            customer_label: cart.customer_label.clone(),
            subtotal,
            total: subtotal,
            line_count: lines.len() as i64,
            sold_at: ctx.sold_at,
            created_at: now,
            finalized_at: (status == SaleStatus::Finalized).then_some(now),
            voided_at: None,
            void_reason: None,
            payment_error: None,
        };

        Ok((sale, lines))
    }

    /// Guard used before voiding.
    pub fn ensure_voidable(&self) -> CoreResult<()> {
        if self.status.can_void() {
            Ok(())
        } else {
            Err(CoreError::InvalidSaleStatus {
                sale_id: self.id.clone(),
                current_status: self.status.to_string(),
                operation: "void".to_string(),
            })
        }
    }

    /// Guard used before handling a payment confirmation or retry.
    pub fn ensure_awaiting_payment(&self, operation: &str) -> CoreResult<()> {
        if self.status == SaleStatus::AwaitingPaymentConfirmation {
            Ok(())
        } else {
            Err(CoreError::InvalidSaleStatus {
                sale_id: self.id.clone(),
                current_status: self.status.to_string(),
                operation: operation.to_string(),
            })
        }
    }
}

// =============================================================================
// Timestamps & Receipt Numbers
// =============================================================================

/// Business timestamp of a sale.
///
/// Without a backdate this is `now`. With one, the date is the caller's and
/// the time-of-day is still `now`, so entries made on the same day keep
/// their order.
///
/// ```rust
/// use chrono::{NaiveDate, TimeZone, Utc};
/// use kasa_core::sale::stamp_sale_time;
///
/// let now = Utc.with_ymd_and_hms(2024, 3, 10, 14, 25, 7).unwrap();
/// let past = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
/// let stamped = stamp_sale_time(now, Some(past));
/// assert_eq!(stamped, Utc.with_ymd_and_hms(2024, 3, 2, 14, 25, 7).unwrap());
/// ```
pub fn stamp_sale_time(now: DateTime<Utc>, backdate: Option<NaiveDate>) -> DateTime<Utc> {
    match backdate {
        Some(date) => date.and_time(now.time()).and_utc(),
        None => now,
    }
}

/// Rejects backdates in the future.
pub fn validate_backdate(now: DateTime<Utc>, backdate: Option<NaiveDate>) -> CoreResult<()> {
    match backdate {
        Some(date) if date > now.date_naive() => Err(ValidationError::InvalidFormat {
            field: "sale date".to_string(),
            reason: "cannot be in the future".to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}

/// Sequence-based receipt number: `YYYYMMDD-NNNNN`.
///
/// ```rust
/// use chrono::NaiveDate;
/// use kasa_core::sale::format_receipt_number;
///
/// let day = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
/// assert_eq!(format_receipt_number(day, 42), "20240302-00042");
/// ```
pub fn format_receipt_number(business_date: NaiveDate, sequence: i64) -> String {
    format!("{}-{:05}", business_date.format("%Y%m%d"), sequence)
}

/// Fallback receipt number used when the sequence cannot be allocated:
/// `YYYYMMDD-THHMMSSmmm`. The `T` keeps it disjoint from sequence numbers.
pub fn fallback_receipt_number(business_date: NaiveDate, now: DateTime<Utc>) -> String {
    format!("{}-T{}", business_date.format("%Y%m%d"), now.format("%H%M%S%3f"))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CatalogItem, StockCheck};
    use chrono::TimeZone;

    fn ctx() -> SaleContext<'static> {
        SaleContext {
            department_id: "dept-1",
            terminal_id: "till-1",
            receipt_number: "20240302-00001".to_string(),
            sold_at: Utc::now(),
        }
    }

    fn cart_with(method: Option<PaymentMethod>) -> Cart {
        let mut product = CatalogItem::new("dept-1", "Soap", ItemKind::Product, Money::from_minor(1000));
        product.stock_quantity = Some(10);
        let service = CatalogItem::new("dept-1", "Gift wrap", ItemKind::Service, Money::from_minor(500));

        let mut cart = Cart::new();
        let check = StockCheck::evaluate(product.stock_target(None).unwrap(), "Soap", 2, 10, None);
        cart.add_item(&product, None, 2, None, Some(&check)).unwrap();
        cart.add_item(&service, None, 1, None, None).unwrap();
        cart.set_payment_method(method);
        cart
    }

    #[test]
    fn test_state_machine_paths() {
        use FinalizerState::*;
        let s = Draft.transition(Validating).unwrap();
        let s = s.transition(Committing).unwrap();
        assert_eq!(FinalizerState::after_commit(PaymentMethod::Cash), Completed);
        assert_eq!(
            FinalizerState::after_commit(PaymentMethod::MobileMoney),
            AwaitingPaymentConfirmation
        );
        let s = s.transition(AwaitingPaymentConfirmation).unwrap();
        assert!(s.transition(Finalized).is_ok());

        assert!(Draft.transition(Committing).is_err());
        assert!(Voided.transition(Finalized).is_err());
        assert!(Completed.transition(Voided).is_err());
    }

    #[test]
    fn test_validate_for_checkout() {
        let empty = Cart::new();
        assert!(matches!(
            validate_for_checkout(&empty),
            Err(CoreError::Validation(ValidationError::CartEmpty))
        ));

        let no_method = cart_with(None);
        assert!(matches!(
            validate_for_checkout(&no_method),
            Err(CoreError::Validation(ValidationError::PaymentMethodRequired))
        ));
    }

    #[test]
    fn test_from_cart_cash() {
        let cart = cart_with(Some(PaymentMethod::Cash));
        let (sale, lines) = Sale::from_cart(&cart, ctx()).unwrap();

        assert_eq!(sale.subtotal, Money::from_minor(2500));
        assert_eq!(sale.total, Money::from_minor(2500));
        assert_eq!(sale.status, SaleStatus::Finalized);
        assert!(sale.finalized_at.is_some());
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.sale_id == sale.id));
        assert_eq!(lines[0].line_total, Money::from_minor(2000));
    }

    #[test]
    fn test_from_cart_mobile_money_is_pending() {
        let cart = cart_with(Some(PaymentMethod::MobileMoney));
        let (sale, _) = Sale::from_cart(&cart, ctx()).unwrap();
        assert_eq!(sale.status, SaleStatus::AwaitingPaymentConfirmation);
        assert!(sale.finalized_at.is_none());
        assert!(sale.ensure_voidable().is_ok());
        assert!(sale.ensure_awaiting_payment("confirm").is_ok());
    }

    #[test]
    fn test_lines_are_decoupled_from_cart() {
        let mut cart = cart_with(Some(PaymentMethod::Cash));
        let (_, lines) = Sale::from_cart(&cart, ctx()).unwrap();
        cart.lines[0].unit_price = Money::from_minor(1);
        assert_eq!(lines[0].unit_price, Money::from_minor(1000));
    }

    #[test]
    fn test_backdate_keeps_time_of_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 30).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let stamped = stamp_sale_time(now, Some(day));
        assert_eq!(stamped.date_naive(), day);
        assert_eq!(stamped.time(), now.time());
        assert_eq!(stamp_sale_time(now, None), now);

        let future = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        assert!(validate_backdate(now, Some(future)).is_err());
        assert!(validate_backdate(now, Some(day)).is_ok());
    }

    #[test]
    fn test_receipt_numbers() {
        let day = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(format_receipt_number(day, 1), "20241231-00001");
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 58).unwrap();
        assert_eq!(fallback_receipt_number(day, now), "20241231-T235958000");
    }
}
