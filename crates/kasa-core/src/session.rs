//! # Cart Session Manager
//!
//! Owns the open order tabs of one terminal plus the parked carts waiting
//! to be resumed.
//!
//! ## Tabs and Parked Carts
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tabs (ordered)                           parked                        │
//! │  ┌────────┐ ┌────────┐ ┌────────┐         ┌──────────────────────┐     │
//! │  │ Tab 1  │ │ Tab 2 ★│ │ Tab 3  │  park   │ ParkedCart           │     │
//! │  │ cart   │ │ cart   │ │ (empty)│ ──────► │  cart snapshot       │     │
//! │  └────────┘ └────────┘ └────────┘         │  reason, parked_at   │     │
//! │                  ▲                         └──────────┬───────────┘     │
//! │                  │          resume                    │                 │
//! │                  └────────────────────────────────────┘                 │
//! │         into the active tab if it is empty, else into a new tab         │
//! │                                                                         │
//! │  ★ = active tab                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - There is always at least one tab, and exactly one is active.
//! - Closing a tab requires it to be empty and not the last one.
//! - Parking requires a non-empty cart and resets the tab to a fresh cart.
//! - Resuming never merges two non-empty carts and is all-or-nothing.
//! - A tab under checkout is frozen until the checkout finishes.
//!
//! The manager is plain data; persisting [`SessionSnapshot`] after each
//! mutation is the caller's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::cart::Cart;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::validation::normalize_label;

// =============================================================================
// Tab & Parked Cart
// =============================================================================

/// One order tab holding exactly one cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTab {
    pub id: String,
    pub cart: Cart,
    /// Set while the finalizer is committing this tab's cart.
    #[serde(default)]
    pub checkout_in_progress: bool,
}

impl CartTab {
    fn new() -> Self {
        CartTab {
            id: Uuid::new_v4().to_string(),
            cart: Cart::new(),
            checkout_in_progress: false,
        }
    }
}

/// A suspended cart awaiting resumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ParkedCart {
    pub id: String,
    pub cart: Cart,
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub parked_at: DateTime<Utc>,
}

/// Serializable image of the whole session, written after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub tabs: Vec<CartTab>,
    pub active_tab_id: String,
    pub parked: Vec<ParkedCart>,
}

// =============================================================================
// Manager
// =============================================================================

#[derive(Debug, Clone)]
pub struct CartSessionManager {
    tabs: Vec<CartTab>,
    active: String,
    parked: Vec<ParkedCart>,
}

impl Default for CartSessionManager {
    fn default() -> Self {
        CartSessionManager::new()
    }
}

impl CartSessionManager {
    /// Starts a session with a single empty, active tab.
    pub fn new() -> Self {
        let tab = CartTab::new();
        CartSessionManager {
            active: tab.id.clone(),
            tabs: vec![tab],
            parked: Vec::new(),
        }
    }

    /// Rebuilds a session from a persisted snapshot.
    ///
    /// Checkout flags are cleared: a checkout never spans a restart. If its
    /// commit landed but the post-sale snapshot was lost, the tab still
    /// holds the sold cart; callers reconcile that with
    /// [`CartSessionManager::settle_sold_cart`]. An inconsistent snapshot
    /// (no tabs, dangling active id) is repaired.
    pub fn restore(snapshot: SessionSnapshot) -> Self {
        let SessionSnapshot {
            mut tabs,
            active_tab_id,
            parked,
        } = snapshot;

        for tab in &mut tabs {
            tab.checkout_in_progress = false;
        }
        if tabs.is_empty() {
            tabs.push(CartTab::new());
        }
        let active = if tabs.iter().any(|t| t.id == active_tab_id) {
            active_tab_id
        } else {
            tabs[0].id.clone()
        };

        CartSessionManager { tabs, active, parked }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            tabs: self.tabs.clone(),
            active_tab_id: self.active.clone(),
            parked: self.parked.clone(),
        }
    }

    /// Ids of the non-empty carts sitting in tabs.
    pub fn open_cart_ids(&self) -> Vec<String> {
        self.tabs
            .iter()
            .filter(|t| !t.cart.is_empty())
            .map(|t| t.cart.id.clone())
            .collect()
    }

    /// Gives the tab holding an already-sold cart a fresh cart. Returns
    /// `false` if no tab holds that cart.
    pub fn settle_sold_cart(&mut self, cart_id: &str) -> bool {
        match self.tabs.iter_mut().find(|t| t.cart.id == cart_id) {
            Some(tab) => {
                tab.cart = Cart::new();
                tab.checkout_in_progress = false;
                true
            }
            None => false,
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn tabs(&self) -> &[CartTab] {
        &self.tabs
    }

    pub fn active_tab_id(&self) -> &str {
        &self.active
    }

    pub fn parked(&self) -> &[ParkedCart] {
        &self.parked
    }

    pub fn tab(&self, tab_id: &str) -> CoreResult<&CartTab> {
        self.tabs
            .iter()
            .find(|t| t.id == tab_id)
            .ok_or_else(|| CoreError::TabNotFound(tab_id.to_string()))
    }

    fn tab_mut(&mut self, tab_id: &str) -> CoreResult<&mut CartTab> {
        self.tabs
            .iter_mut()
            .find(|t| t.id == tab_id)
            .ok_or_else(|| CoreError::TabNotFound(tab_id.to_string()))
    }

    pub fn active_tab(&self) -> CoreResult<&CartTab> {
        self.tab(&self.active)
    }

    pub fn active_cart(&self) -> CoreResult<&Cart> {
        self.active_tab().map(|t| &t.cart)
    }

    /// Mutable access to the active cart; refused while it is checking out.
    pub fn active_cart_mut(&mut self) -> CoreResult<&mut Cart> {
        let active = self.active.clone();
        let tab = self.tab_mut(&active)?;
        if tab.checkout_in_progress {
            return Err(CoreError::CartBusy(tab.id.clone()));
        }
        Ok(&mut tab.cart)
    }

    // -------------------------------------------------------------------------
    // Tabs
    // -------------------------------------------------------------------------

    /// Opens a fresh empty tab and makes it active.
    pub fn new_tab(&mut self) -> &CartTab {
        let tab = CartTab::new();
        self.active = tab.id.clone();
        self.tabs.push(tab);
        let idx = self.tabs.len() - 1;
        &self.tabs[idx]
    }

    /// Makes another tab active.
    pub fn switch_tab(&mut self, tab_id: &str) -> CoreResult<()> {
        self.tab(tab_id)?;
        self.active = tab_id.to_string();
        Ok(())
    }

    /// Closes an empty tab. The neighbour to its left (or right) becomes
    /// active if the closed tab was active.
    pub fn close_tab(&mut self, tab_id: &str) -> CoreResult<()> {
        let idx = self
            .tabs
            .iter()
            .position(|t| t.id == tab_id)
            .ok_or_else(|| CoreError::TabNotFound(tab_id.to_string()))?;

        let tab = &self.tabs[idx];
        if tab.checkout_in_progress {
            return Err(CoreError::CartBusy(tab.id.clone()));
        }
        if !tab.cart.is_empty() {
            return Err(CoreError::TabNotEmpty(tab.id.clone()));
        }
        if self.tabs.len() == 1 {
            return Err(CoreError::LastTab);
        }

        self.tabs.remove(idx);
        if self.active == tab_id {
            let next = idx.saturating_sub(1).min(self.tabs.len() - 1);
            self.active = self.tabs[next].id.clone();
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Parking
    // -------------------------------------------------------------------------

    /// Parks the active cart and resets the tab to a fresh empty cart.
    pub fn park(&mut self, reason: Option<&str>) -> CoreResult<&ParkedCart> {
        let reason = normalize_label("reason", reason)?;
        let active = self.active.clone();
        let tab = self.tab_mut(&active)?;
        if tab.checkout_in_progress {
            return Err(CoreError::CartBusy(tab.id.clone()));
        }
        if tab.cart.is_empty() {
            return Err(ValidationError::CartEmpty.into());
        }

        let cart = std::mem::take(&mut tab.cart);
        self.parked.push(ParkedCart {
            id: Uuid::new_v4().to_string(),
            cart,
            reason,
            parked_at: Utc::now(),
        });
        let idx = self.parked.len() - 1;
        Ok(&self.parked[idx])
    }

    /// Restores a parked cart and deletes the parked entry.
    ///
    /// Goes into the active tab when that tab is empty and idle, otherwise
    /// into a brand-new tab, which becomes active. Returns the tab id.
    pub fn resume(&mut self, parked_id: &str) -> CoreResult<String> {
        let idx = self
            .parked
            .iter()
            .position(|p| p.id == parked_id)
            .ok_or_else(|| CoreError::ParkedCartNotFound(parked_id.to_string()))?;

        let reuse_active = self
            .active_tab()
            .map(|t| t.cart.is_empty() && !t.checkout_in_progress)
            .unwrap_or(false);

        let parked = self.parked.remove(idx);
        if reuse_active {
            let active = self.active.clone();
            let tab = self.tab_mut(&active)?;
            tab.cart = parked.cart;
            return Ok(active);
        }

        let mut tab = CartTab::new();
        tab.cart = parked.cart;
        let id = tab.id.clone();
        self.tabs.push(tab);
        self.active = id.clone();
        Ok(id)
    }

    /// Permanently discards a parked cart.
    pub fn delete_parked(&mut self, parked_id: &str) -> CoreResult<ParkedCart> {
        let idx = self
            .parked
            .iter()
            .position(|p| p.id == parked_id)
            .ok_or_else(|| CoreError::ParkedCartNotFound(parked_id.to_string()))?;
        Ok(self.parked.remove(idx))
    }

    // -------------------------------------------------------------------------
    // Checkout lock
    // -------------------------------------------------------------------------

    /// Freezes the active tab for checkout and returns its id and a copy of
    /// the cart to finalize.
    pub fn begin_checkout(&mut self) -> CoreResult<(String, Cart)> {
        let active = self.active.clone();
        let tab = self.tab_mut(&active)?;
        if tab.checkout_in_progress {
            return Err(CoreError::CartBusy(tab.id.clone()));
        }
        tab.checkout_in_progress = true;
        Ok((tab.id.clone(), tab.cart.clone()))
    }

    /// Releases the checkout lock. On success the tab gets a fresh cart; on
    /// failure the cart is left exactly as it was.
    pub fn end_checkout(&mut self, tab_id: &str, sold: bool) -> CoreResult<()> {
        let tab = self.tab_mut(tab_id)?;
        tab.checkout_in_progress = false;
        if sold {
            tab.cart = Cart::new();
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::{CatalogItem, ItemKind, PaymentMethod, StockCheck};

    fn fill(manager: &mut CartSessionManager, lines: usize) {
        let cart = manager.active_cart_mut().unwrap();
        for i in 0..lines {
            let mut item = CatalogItem::new("d", format!("Item {}", i), ItemKind::Product, Money::from_minor(100 * (i as i64 + 1)));
            item.stock_quantity = Some(50);
            let qty = i as i64 + 1;
            let check = StockCheck::evaluate(item.stock_target(None).unwrap(), item.name.clone(), qty, 50, None);
            cart.add_item(&item, None, qty, None, Some(&check)).unwrap();
        }
        cart.set_customer_label(Some("Amina")).unwrap();
        cart.set_payment_method(Some(PaymentMethod::Cash));
    }

    #[test]
    fn test_new_session_has_one_active_tab() {
        let manager = CartSessionManager::new();
        assert_eq!(manager.tabs().len(), 1);
        assert_eq!(manager.active_tab_id(), manager.tabs()[0].id);
    }

    #[test]
    fn test_new_and_switch_tab() {
        let mut manager = CartSessionManager::new();
        let first = manager.active_tab_id().to_string();
        let second = manager.new_tab().id.clone();
        assert_eq!(manager.active_tab_id(), second);

        manager.switch_tab(&first).unwrap();
        assert_eq!(manager.active_tab_id(), first);
        assert!(matches!(manager.switch_tab("nope"), Err(CoreError::TabNotFound(_))));
    }

    #[test]
    fn test_close_tab_rules() {
        let mut manager = CartSessionManager::new();
        let first = manager.active_tab_id().to_string();
        assert!(matches!(manager.close_tab(&first), Err(CoreError::LastTab)));

        fill(&mut manager, 1);
        let second = manager.new_tab().id.clone();
        assert!(matches!(manager.close_tab(&first), Err(CoreError::TabNotEmpty(_))));

        manager.close_tab(&second).unwrap();
        assert_eq!(manager.active_tab_id(), first);
        assert_eq!(manager.tabs().len(), 1);
    }

    #[test]
    fn test_park_requires_items() {
        let mut manager = CartSessionManager::new();
        let err = manager.park(Some("lunch")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::CartEmpty)));
    }

    #[test]
    fn test_park_resume_round_trip() {
        let mut manager = CartSessionManager::new();
        fill(&mut manager, 3);
        let before = manager.active_cart().unwrap().clone();

        let parked_id = manager.park(Some("customer fetching wallet")).unwrap().id.clone();
        assert!(manager.active_cart().unwrap().is_empty());
        assert_eq!(manager.parked().len(), 1);
        assert_eq!(manager.parked()[0].reason.as_deref(), Some("customer fetching wallet"));

        let tab_id = manager.resume(&parked_id).unwrap();
        assert_eq!(tab_id, manager.active_tab_id());
        assert_eq!(manager.tabs().len(), 1);
        assert!(manager.parked().is_empty());

        let after = manager.active_cart().unwrap();
        assert_eq!(after.lines, before.lines);
        assert_eq!(after.subtotal(), before.subtotal());
        assert_eq!(after.customer_label, before.customer_label);
    }

    #[test]
    fn test_resume_into_new_tab_when_occupied() {
        let mut manager = CartSessionManager::new();
        fill(&mut manager, 2);
        let parked_id = manager.park(None).unwrap().id.clone();
        fill(&mut manager, 1);
        let occupied = manager.active_tab_id().to_string();

        let tab_id = manager.resume(&parked_id).unwrap();
        assert_ne!(tab_id, occupied);
        assert_eq!(manager.tabs().len(), 2);
        assert_eq!(manager.tab(&occupied).unwrap().cart.lines.len(), 1);
        assert_eq!(manager.tab(&tab_id).unwrap().cart.lines.len(), 2);
    }

    #[test]
    fn test_resume_unknown_keeps_state() {
        let mut manager = CartSessionManager::new();
        fill(&mut manager, 1);
        manager.park(None).unwrap();
        assert!(manager.resume("missing").is_err());
        assert_eq!(manager.parked().len(), 1);
    }

    #[test]
    fn test_delete_parked() {
        let mut manager = CartSessionManager::new();
        fill(&mut manager, 1);
        let id = manager.park(None).unwrap().id.clone();
        manager.delete_parked(&id).unwrap();
        assert!(manager.parked().is_empty());
        assert!(manager.delete_parked(&id).is_err());
    }

    #[test]
    fn test_checkout_lock_freezes_tab() {
        let mut manager = CartSessionManager::new();
        fill(&mut manager, 1);
        let (tab_id, cart) = manager.begin_checkout().unwrap();
        assert_eq!(cart.lines.len(), 1);

        assert!(matches!(manager.active_cart_mut(), Err(CoreError::CartBusy(_))));
        assert!(matches!(manager.park(None), Err(CoreError::CartBusy(_))));
        assert!(matches!(manager.begin_checkout(), Err(CoreError::CartBusy(_))));

        manager.end_checkout(&tab_id, false).unwrap();
        assert_eq!(manager.active_cart().unwrap().lines.len(), 1);

        manager.begin_checkout().unwrap();
        manager.end_checkout(&tab_id, true).unwrap();
        assert!(manager.active_cart().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut manager = CartSessionManager::new();
        fill(&mut manager, 2);
        manager.park(Some("later")).unwrap();
        fill(&mut manager, 1);
        manager.begin_checkout().unwrap();

        let json = serde_json::to_string(&manager.snapshot()).unwrap();
        let snapshot: SessionSnapshot = serde_json::from_str(&json).unwrap();
        let restored = CartSessionManager::restore(snapshot);

        assert_eq!(restored.parked().len(), 1);
        assert_eq!(restored.active_cart().unwrap().lines.len(), 1);
        assert!(!restored.active_tab().unwrap().checkout_in_progress);
    }

    #[test]
    fn test_settle_sold_cart() {
        let mut manager = CartSessionManager::new();
        fill(&mut manager, 2);
        let sold = manager.active_cart().unwrap().id.clone();
        let other_tab = manager.new_tab().id.clone();
        fill(&mut manager, 1);

        let open = manager.open_cart_ids();
        assert_eq!(open.len(), 2);
        assert!(open.contains(&sold));

        assert!(manager.settle_sold_cart(&sold));
        assert!(!manager.settle_sold_cart(&sold));
        assert_eq!(manager.open_cart_ids().len(), 1);
        assert_eq!(manager.tab(&other_tab).unwrap().cart.lines.len(), 1);
        assert_eq!(manager.tabs().len(), 2);
    }

    #[test]
    fn test_restore_repairs_empty_snapshot() {
        let restored = CartSessionManager::restore(SessionSnapshot {
            tabs: Vec::new(),
            active_tab_id: "gone".to_string(),
            parked: Vec::new(),
        });
        assert_eq!(restored.tabs().len(), 1);
        assert_eq!(restored.active_tab_id(), restored.tabs()[0].id);
    }
}
