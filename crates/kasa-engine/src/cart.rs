//! # Cart Operations
//!
//! Stock-checked cart mutations and tab/parking management for the
//! terminal's session. Every successful mutation persists the session
//! snapshot.
//!
//! ## Add Item
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_item(item_id, variant, qty)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. Read item from the Catalog Store (department-scoped)               │
//! │  2. held = quantity already in the active cart for this line           │
//! │  3. Stock Ledger check for held + qty  (advisory, no lock)             │
//! │  4. Cart::add_item with that answer                                    │
//! │       ├── cart changed meanwhile ──► re-read and try again             │
//! │       └── unavailable ──► InsufficientStock, cart untouched            │
//! │  5. Persist session snapshot                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use tracing::{debug, info};

use kasa_core::{
    Cart, CartTotals, CoreError, CoreResult, LineKey, Money, ParkedCart, PaymentMethod, PriceTier, Privilege,
    SessionSnapshot, StockCheck, StockTarget,
};

use crate::engine::Engine;
use crate::error::EngineResult;

/// Times a stale stock answer is refreshed before giving up.
const STOCK_CHECK_ATTEMPTS: usize = 3;

/// The active cart as the UI shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub tab_id: String,
    pub cart: Cart,
    pub totals: CartTotals,
}

impl Engine {
    fn active_view(&self) -> EngineResult<CartView> {
        let view = self.sessions.with(|s| -> CoreResult<CartView> {
            let tab = s.active_tab()?;
            Ok(CartView {
                tab_id: tab.id.clone(),
                cart: tab.cart.clone(),
                totals: tab.cart.totals(),
            })
        })?;
        Ok(view)
    }

    async fn persisted_view(&self) -> EngineResult<CartView> {
        self.persist_sessions().await?;
        self.active_view()
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn active_cart(&self) -> EngineResult<CartView> {
        self.active_view()
    }

    pub fn session_snapshot(&self) -> SessionSnapshot {
        self.sessions.with(|s| s.snapshot())
    }

    pub fn list_parked(&self) -> Vec<ParkedCart> {
        self.sessions.with(|s| s.parked().to_vec())
    }

    /// Point-in-time stock answer for a product or variant.
    pub async fn check_stock(&self, target: &StockTarget, requested: i64) -> EngineResult<StockCheck> {
        Ok(self
            .db
            .stock()
            .check_availability(self.department_id(), target, requested)
            .await?)
    }

    // -------------------------------------------------------------------------
    // Line mutations
    // -------------------------------------------------------------------------

    /// Adds `quantity` of an item (or one of its variants) to the active cart.
    pub async fn add_item(
        &self,
        item_id: &str,
        variant_id: Option<&str>,
        quantity: i64,
        tier: Option<PriceTier>,
    ) -> EngineResult<CartView> {
        let item = self.require_item(item_id).await?;
        if let Some(variant_id) = variant_id {
            if item.variant(variant_id).is_none() {
                return Err(CoreError::VariantNotFound {
                    item_id: item.id.clone(),
                    variant_id: variant_id.to_string(),
                }
                .into());
            }
        }

        let key = LineKey::new(item.id.clone(), variant_id);
        let target = item.stock_target(variant_id);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let check = match &target {
                Some(target) => {
                    let held = self.sessions.with(|s| s.active_cart().map(|c| c.quantity_of(&key)))?;
                    Some(self.check_stock(target, held + quantity).await?)
                }
                None => None,
            };

            let added = self.sessions.with_mut(|s| -> CoreResult<()> {
                s.active_cart_mut()?
                    .add_item(&item, variant_id, quantity, tier, check.as_ref())
                    .map(|_| ())
            });

            match added {
                Err(CoreError::StaleStockCheck { .. }) if attempt < STOCK_CHECK_ATTEMPTS => {
                    debug!(item_id, attempt, "Cart changed during stock check, retrying");
                }
                Err(e) => return Err(e.into()),
                Ok(()) => break,
            }
        }

        debug!(item_id, variant_id, quantity, "Item added to cart");
        self.persisted_view().await
    }

    pub async fn remove_item(&self, key: &LineKey) -> EngineResult<CartView> {
        self.sessions.with_mut(|s| -> CoreResult<()> {
            s.active_cart_mut()?.remove_item(key)?;
            Ok(())
        })?;
        self.persisted_view().await
    }

    /// Sets a line's quantity; zero or less removes the line. Increases on
    /// stock-tracked lines are checked against the ledger.
    ///
    /// The change is first tried without a stock answer, so decreases land
    /// under one lock. An increase comes back stale, gets a ledger answer
    /// for the new quantity and is tried again.
    pub async fn set_quantity(&self, key: &LineKey, quantity: i64) -> EngineResult<CartView> {
        let mut check: Option<StockCheck> = None;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let updated = self
                .sessions
                .with_mut(|s| s.active_cart_mut()?.set_quantity(key, quantity, check.as_ref()));

            match updated {
                Err(CoreError::StaleStockCheck { .. }) if attempt < STOCK_CHECK_ATTEMPTS => {
                    let target = self.sessions.with(|s| -> CoreResult<_> {
                        let line = s
                            .active_cart()?
                            .line(key)
                            .ok_or_else(|| CoreError::LineNotFound(key.to_string()))?;
                        Ok(line.stock_target.clone())
                    })?;
                    check = match target {
                        Some(target) => Some(self.check_stock(&target, quantity).await?),
                        None => None,
                    };
                    debug!(line = %key, attempt, "Quantity increase needs a stock answer");
                }
                Err(e) => return Err(e.into()),
                Ok(()) => break,
            }
        }

        self.persisted_view().await
    }

    /// Overrides a line's unit price within its custom-price policy.
    pub async fn set_price(&self, key: &LineKey, price: Money, privilege: Privilege) -> EngineResult<CartView> {
        self.sessions
            .with_mut(|s| s.active_cart_mut()?.set_price(key, price, privilege))?;
        info!(line = %key, price = %price, ?privilege, "Custom price applied");
        self.persisted_view().await
    }

    /// Re-prices a line at another tier, using the current catalog entry.
    pub async fn set_tier(&self, key: &LineKey, tier: PriceTier) -> EngineResult<CartView> {
        let item = self.require_item(&key.item_id).await?;
        let used = self
            .sessions
            .with_mut(|s| s.active_cart_mut()?.set_tier(key, tier, &item))?;
        debug!(line = %key, requested = ?tier, used = ?used, "Tier changed");
        self.persisted_view().await
    }

    pub async fn set_customer_label(&self, label: Option<&str>) -> EngineResult<CartView> {
        self.sessions
            .with_mut(|s| s.active_cart_mut()?.set_customer_label(label))?;
        self.persisted_view().await
    }

    pub async fn set_payment_method(&self, method: Option<PaymentMethod>) -> EngineResult<CartView> {
        self.sessions.with_mut(|s| -> CoreResult<()> {
            s.active_cart_mut()?.set_payment_method(method);
            Ok(())
        })?;
        self.persisted_view().await
    }

    // -------------------------------------------------------------------------
    // Tabs & parking
    // -------------------------------------------------------------------------

    pub async fn new_tab(&self) -> EngineResult<CartView> {
        let tab_id = self.sessions.with_mut(|s| s.new_tab().id.clone());
        debug!(tab_id = %tab_id, "Opened cart tab");
        self.persisted_view().await
    }

    pub async fn switch_tab(&self, tab_id: &str) -> EngineResult<CartView> {
        self.sessions.with_mut(|s| s.switch_tab(tab_id))?;
        self.persisted_view().await
    }

    pub async fn close_tab(&self, tab_id: &str) -> EngineResult<CartView> {
        self.sessions.with_mut(|s| s.close_tab(tab_id))?;
        debug!(tab_id, "Closed cart tab");
        self.persisted_view().await
    }

    /// Parks the active cart; the tab is left empty.
    pub async fn park(&self, reason: Option<&str>) -> EngineResult<ParkedCart> {
        let parked = self.sessions.with_mut(|s| s.park(reason).cloned())?;
        info!(parked_id = %parked.id, lines = parked.cart.lines.len(), "Cart parked");
        self.persist_sessions().await?;
        Ok(parked)
    }

    /// Brings a parked cart back, into the active tab if it is empty or
    /// into a new tab otherwise.
    pub async fn resume(&self, parked_id: &str) -> EngineResult<CartView> {
        let tab_id = self.sessions.with_mut(|s| s.resume(parked_id))?;
        info!(parked_id, tab_id = %tab_id, "Parked cart resumed");
        self.persisted_view().await
    }

    pub async fn delete_parked(&self, parked_id: &str) -> EngineResult<ParkedCart> {
        let parked = self.sessions.with_mut(|s| s.delete_parked(parked_id))?;
        info!(parked_id, "Parked cart deleted");
        self.persist_sessions().await?;
        Ok(parked)
    }
}
