//! # Sale Finalizer
//!
//! Turns the active cart into a committed sale.
//!
//! ## Checkout Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        complete_sale(backdate)                          │
//! │                                                                         │
//! │  Draft ──► Validating                                                  │
//! │     • cart not empty, payment method chosen, backdate not in future    │
//! │     • tab frozen (CartBusy) until the commit finishes                  │
//! │     • frozen tab saved first; the sale row carries its cart id         │
//! │     • pre-check every stock demand  ──► InsufficientStock, no writes   │
//! │                                                                         │
//! │  Validating ──► Committing          ┌─── one SQLite transaction ───┐   │
//! │     1. ledger decrements (ordered)  │  Failed ──► rollback,        │   │
//! │     2. receipt number for the day   │            CommitConflict    │   │
//! │     3. sale header + decoupled lines│                              │   │
//! │                                     └──────────── COMMIT ──────────┘   │
//! │                                                                         │
//! │  Committing ──┬──► Completed ──► Finalized     receipt returned        │
//! │               └──► AwaitingPaymentConfirmation gateway asked to collect │
//! │                                                                         │
//! │  Tab reset to a fresh cart, session persisted, invalidations emitted.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Void
//! Voiding is a separate operation on a Finalized or pending sale. Stock
//! is only put back when `policy.restock_on_void` is set, and then in the
//! same transaction as the status change.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use kasa_core::validation::normalize_label;
use kasa_core::{
    stamp_sale_time, validate_backdate, validate_for_checkout, Cart, CoreError, CoreResult, FinalizerState,
    ItemKind, Receipt, Sale, SaleContext, SaleLine, SaleStatus, StockDemand, StockTarget,
};
use kasa_db::{CommitOutcome, DbError, SaleRepository, StockLedger};

use crate::engine::Engine;
use crate::error::EngineResult;
use crate::events::Invalidation;

/// Result of a completed checkout.
///
/// `receipt` is `None` while a mobile-money sale awaits confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleOutcome {
    pub sale: Sale,
    pub receipt: Option<Receipt>,
}

impl SaleOutcome {
    pub fn is_pending(&self) -> bool {
        self.sale.status == SaleStatus::AwaitingPaymentConfirmation
    }
}

impl Engine {
    /// Completes the active cart as a sale.
    ///
    /// `backdate` records the sale on an earlier business day (the time of
    /// day is kept). A rejected checkout leaves the cart untouched.
    pub async fn complete_sale(&self, backdate: Option<NaiveDate>) -> EngineResult<SaleOutcome> {
        let now = Utc::now();
        validate_backdate(now, backdate)?;

        let state = FinalizerState::Draft.transition(FinalizerState::Validating)?;
        let (tab_id, cart) = self.sessions.with_mut(|s| -> CoreResult<(String, Cart)> {
            validate_for_checkout(s.active_cart()?)?;
            s.begin_checkout()
        })?;
        debug!(tab_id = %tab_id, cart_id = %cart.id, lines = cart.lines.len(), ?state, "Checkout started");

        // The frozen tab goes to disk before the commit; a restart after the
        // commit then finds this cart id on the sale and clears the tab.
        if let Err(e) = self.persist_sessions().await {
            warn!(tab_id = %tab_id, error = %e, "Could not save checkout marker");
        }

        let committed = self.commit_checkout(&cart, now, backdate).await;

        let sold = committed.is_ok();
        if let Err(e) = self.sessions.with_mut(|s| s.end_checkout(&tab_id, sold)) {
            warn!(tab_id = %tab_id, error = %e, "Could not release checkout lock");
        }
        let (mut sale, lines) = committed?;

        if let Err(e) = self.persist_sessions().await {
            warn!(sale_id = %sale.id, error = %e, "Sale committed but cart session was not saved");
        }

        let stock_changed = lines.iter().any(|l| l.kind == ItemKind::Product);
        self.events.sale_committed(self.department_id(), &sale.id, stock_changed);

        let state = state
            .transition(FinalizerState::Committing)?
            .transition(FinalizerState::after_commit(sale.payment_method))?;

        if state == FinalizerState::AwaitingPaymentConfirmation {
            info!(
                sale_id = %sale.id,
                receipt_number = %sale.receipt_number,
                total = %sale.total,
                "Sale committed, awaiting mobile-money confirmation"
            );
            if let Err(e) = self.request_confirmation(&sale).await {
                sale.payment_error = Some(e.0);
            }
            return Ok(SaleOutcome { sale, receipt: None });
        }

        let receipt = Receipt::for_sale(&sale, &lines, &self.business)?;
        let state = state.transition(FinalizerState::Finalized)?;
        info!(
            sale_id = %sale.id,
            receipt_number = %sale.receipt_number,
            total = %sale.total,
            method = ?sale.payment_method,
            ?state,
            "Sale completed"
        );
        Ok(SaleOutcome {
            sale,
            receipt: Some(receipt),
        })
    }

    /// Pre-check, then ledger + sale in one transaction.
    async fn commit_checkout(
        &self,
        cart: &Cart,
        now: DateTime<Utc>,
        backdate: Option<NaiveDate>,
    ) -> EngineResult<(Sale, Vec<SaleLine>)> {
        let department_id = self.department_id();
        let demands = cart.stock_demands();

        for demand in &demands {
            let check = self.check_stock(&demand.target, demand.quantity).await?;
            if !check.available {
                info!(
                    item = %demand.item_name,
                    requested = demand.quantity,
                    available = check.available_quantity,
                    "Checkout rejected by stock pre-check"
                );
                return Err(CoreError::InsufficientStock {
                    item_name: demand.item_name.clone(),
                    requested: demand.quantity,
                    available: check.available_quantity,
                }
                .into());
            }
        }

        let mut tx = self.db.begin().await?;

        if let CommitOutcome::Failed(check) = StockLedger::commit_in(&mut tx, department_id, &demands).await? {
            tx.rollback().await.map_err(DbError::from)?;
            return Err(CoreError::CommitConflict {
                item_name: check.item_name,
                requested: check.requested,
                available: check.available_quantity,
            }
            .into());
        }

        let sold_at = stamp_sale_time(now, backdate);
        let receipt_number =
            SaleRepository::allocate_receipt_number_in(&mut tx, department_id, sold_at.date_naive(), now).await;

        let (sale, lines) = Sale::from_cart(
            cart,
            SaleContext {
                department_id,
                terminal_id: self.terminal_id(),
                receipt_number,
                sold_at,
            },
        )?;
        SaleRepository::insert_in(&mut tx, &sale, &lines).await?;
        tx.commit().await.map_err(DbError::from)?;

        debug!(sale_id = %sale.id, demands = demands.len(), "Checkout transaction committed");
        Ok((sale, lines))
    }

    /// Voids a Finalized or pending sale.
    pub async fn void_sale(&self, sale_id: &str, reason: Option<&str>) -> EngineResult<Sale> {
        let department_id = self.department_id();
        let reason = normalize_label("void reason", reason).map_err(CoreError::from)?;
        let restock = self.config.policy.restock_on_void;

        // Write first: the conditional update takes the write lock before
        // this transaction reads anything.
        let mut tx = self.db.begin().await?;
        let voided = SaleRepository::void_in(&mut tx, department_id, sale_id, reason.as_deref(), Utc::now()).await?;
        let sale = SaleRepository::get_in(&mut tx, department_id, sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;
        if !voided {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale.id,
                current_status: sale.status.to_string(),
                operation: "void".to_string(),
            }
            .into());
        }
        let was_pending = sale.finalized_at.is_none();

        let mut restocked = false;
        if restock {
            let lines = SaleRepository::lines_in(&mut tx, sale_id).await?;
            let demands = release_demands(&lines);
            StockLedger::release_in(&mut tx, department_id, &demands).await?;
            restocked = !demands.is_empty();
        }
        tx.commit().await.map_err(DbError::from)?;

        self.gate.cancel(sale_id);
        info!(
            sale_id,
            receipt_number = %sale.receipt_number,
            was_pending,
            restocked,
            "Sale voided"
        );

        if restocked {
            self.events.emit(Invalidation::Catalog {
                department_id: department_id.to_string(),
            });
        }
        self.events.emit(Invalidation::SalesHistory {
            department_id: department_id.to_string(),
        });
        self.events.emit(Invalidation::Dashboard {
            department_id: department_id.to_string(),
        });
        self.events.emit(Invalidation::Sale {
            sale_id: sale_id.to_string(),
        });

        self.require_sale(sale_id).await
    }

    /// Rebuilds the receipt of a Finalized sale from its stored lines.
    pub async fn receipt_for(&self, sale_id: &str) -> EngineResult<Receipt> {
        let sale = self.require_sale(sale_id).await?;
        let lines = self.db.sales().lines(sale_id).await?;
        Ok(Receipt::for_sale(&sale, &lines, &self.business)?)
    }

    pub async fn get_sale(&self, sale_id: &str) -> EngineResult<Sale> {
        self.require_sale(sale_id).await
    }

    /// Newest sales of one status, e.g. pending mobile-money sales.
    pub async fn list_sales(&self, status: SaleStatus, limit: i64) -> EngineResult<Vec<Sale>> {
        Ok(self
            .db
            .sales()
            .list_by_status(self.department_id(), status, limit)
            .await?)
    }
}

/// Quantities to put back for a voided sale's product lines.
fn release_demands(lines: &[SaleLine]) -> Vec<StockDemand> {
    let mut demands: BTreeMap<StockTarget, StockDemand> = BTreeMap::new();
    for line in lines.iter().filter(|l| l.kind == ItemKind::Product) {
        let target = match &line.variant_id {
            Some(v) => StockTarget::Variant(v.clone()),
            None => StockTarget::Item(line.item_id.clone()),
        };
        demands
            .entry(target.clone())
            .and_modify(|d| d.quantity += line.quantity)
            .or_insert_with(|| StockDemand {
                target,
                item_name: line.name.clone(),
                quantity: line.quantity,
            });
    }
    demands.into_values().collect()
}
