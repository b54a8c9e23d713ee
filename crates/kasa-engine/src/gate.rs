//! # Payment Confirmation Gate
//!
//! Holds back the receipt of a mobile-money sale until the gateway reports
//! a terminal result.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  complete_sale (mobile money)                                          │
//! │       │  sale committed as AwaitingPaymentConfirmation                 │
//! │       ▼                                                                 │
//! │  gate.register(sale_id) ── oneshot pair stored                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  gateway.request_payment(..)                                           │
//! │                                                                         │
//! │  await_confirmation(sale_id)          on_payment_result(sale_id, r)    │
//! │       │  takes the receiver,               │  updates the sale row,     │
//! │       │  waits up to the timeout           │  then resolves the sender  │
//! │       ▼                                    ▼                            │
//! │  Confirmed(receipt) | Failed{reason} | TimedOut | Cancelled            │
//! │                                                                         │
//! │  Failed and TimedOut leave the sale pending; the operator decides      │
//! │  between retry_payment and void_sale.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sale row is the source of truth. The gate only wakes whoever is
//! waiting, so a callback that arrives after a timeout still finalizes the
//! sale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use kasa_core::{CoreError, Receipt, Sale, SaleStatus};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::events::Invalidation;
use crate::gateway::{GatewayError, PaymentRequest, PaymentResult};

/// Message recorded on a sale whose confirmation did not arrive in time.
pub const CONFIRMATION_TIMED_OUT: &str = "payment confirmation timed out";

/// What a confirmation waiter resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Confirmation {
    Confirmed { receipt: Receipt },
    Failed { reason: String },
    TimedOut,
    /// Superseded by a retry, or the sale was voided.
    Cancelled,
}

/// One registration. `rx` is `None` once a waiter has taken it.
#[derive(Debug)]
struct Registration {
    generation: u64,
    tx: oneshot::Sender<Confirmation>,
    rx: Option<oneshot::Receiver<Confirmation>>,
}

#[derive(Debug, Default)]
struct Pending {
    next_generation: u64,
    registrations: HashMap<String, Registration>,
}

#[derive(Debug, Clone)]
pub struct PaymentConfirmationGate {
    pending: Arc<Mutex<Pending>>,
    timeout: Duration,
}

impl PaymentConfirmationGate {
    pub fn new(timeout: Duration) -> Self {
        PaymentConfirmationGate {
            pending: Arc::new(Mutex::new(Pending::default())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers interest in one sale. A previous registration for the same
    /// sale is replaced and its waiter resolves `Cancelled`.
    pub fn register(&self, sale_id: &str) {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.lock();
        pending.next_generation += 1;
        let generation = pending.next_generation;
        pending.registrations.insert(
            sale_id.to_string(),
            Registration {
                generation,
                tx,
                rx: Some(rx),
            },
        );
        debug!(sale_id, generation, "Confirmation waiter registered");
    }

    /// Delivers the terminal result and drops the registration.
    ///
    /// Returns `false` if nobody was waiting. The result is not buffered:
    /// a later `await_confirmation` reads it from the sale row.
    pub fn resolve(&self, sale_id: &str, confirmation: Confirmation) -> bool {
        let Some(registration) = self.lock().registrations.remove(sale_id) else {
            return false;
        };
        if registration.rx.is_some() {
            debug!(sale_id, "No confirmation waiter yet, registration dropped");
            return false;
        }
        if registration.tx.send(confirmation).is_err() {
            debug!(sale_id, "Confirmation waiter already gone");
            return false;
        }
        true
    }

    /// Drops the registration; a current waiter resolves `Cancelled`.
    pub fn cancel(&self, sale_id: &str) {
        self.lock().registrations.remove(sale_id);
    }

    pub fn is_pending(&self, sale_id: &str) -> bool {
        self.lock().registrations.contains_key(sale_id)
    }

    /// Number of live registrations.
    pub fn pending_count(&self) -> usize {
        self.lock().registrations.len()
    }

    fn take_receiver(&self, sale_id: &str) -> Option<(u64, oneshot::Receiver<Confirmation>)> {
        let mut pending = self.lock();
        let registration = pending.registrations.get_mut(sale_id)?;
        let rx = registration.rx.take()?;
        Some((registration.generation, rx))
    }

    async fn wait(&self, sale_id: &str, generation: u64, rx: oneshot::Receiver<Confirmation>) -> Confirmation {
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(confirmation)) => confirmation,
            Ok(Err(_)) => Confirmation::Cancelled,
            Err(_) => {
                let mut pending = self.lock();
                // A retry may have registered again while this waiter slept
                if pending
                    .registrations
                    .get(sale_id)
                    .is_some_and(|r| r.generation == generation)
                {
                    pending.registrations.remove(sale_id);
                }
                Confirmation::TimedOut
            }
        }
    }
}

// =============================================================================
// Engine operations
// =============================================================================

impl Engine {
    /// Waits for the gateway's verdict on a pending sale.
    ///
    /// On timeout the sale stays `AwaitingPaymentConfirmation` with
    /// [`CONFIRMATION_TIMED_OUT`] recorded for the operator.
    pub async fn await_confirmation(&self, sale_id: &str) -> EngineResult<Confirmation> {
        let Some((generation, rx)) = self.gate.take_receiver(sale_id) else {
            return self.settled_confirmation(sale_id).await;
        };

        let confirmation = self.gate.wait(sale_id, generation, rx).await;
        if confirmation == Confirmation::TimedOut {
            warn!(
                sale_id,
                timeout_secs = self.gate.timeout().as_secs(),
                "Payment confirmation timed out, sale left pending"
            );
            self.db
                .sales()
                .record_payment_error(self.department_id(), sale_id, CONFIRMATION_TIMED_OUT)
                .await?;
            self.events.emit(Invalidation::Sale {
                sale_id: sale_id.to_string(),
            });
        }
        Ok(confirmation)
    }

    /// The verdict already recorded on the sale row, for callers that
    /// arrive after the gate let go of the sale.
    async fn settled_confirmation(&self, sale_id: &str) -> EngineResult<Confirmation> {
        let sale = self.require_sale(sale_id).await?;
        match (sale.status, sale.payment_error) {
            (SaleStatus::Finalized, _) => Ok(Confirmation::Confirmed {
                receipt: self.receipt_for(sale_id).await?,
            }),
            (SaleStatus::Voided, _) => Ok(Confirmation::Cancelled),
            (SaleStatus::AwaitingPaymentConfirmation, Some(error)) if error == CONFIRMATION_TIMED_OUT => {
                Ok(Confirmation::TimedOut)
            }
            (SaleStatus::AwaitingPaymentConfirmation, Some(reason)) => Ok(Confirmation::Failed { reason }),
            (SaleStatus::AwaitingPaymentConfirmation, None) => Err(CoreError::InvalidSaleStatus {
                sale_id: sale.id,
                current_status: sale.status.to_string(),
                operation: "await a payment that was never requested".to_string(),
            }
            .into()),
        }
    }

    /// Callback surface for the payment gateway adapter.
    ///
    /// Returns the receipt when the payment is confirmed. A result for a
    /// sale that is no longer awaiting confirmation is ignored.
    pub async fn on_payment_result(&self, sale_id: &str, result: PaymentResult) -> EngineResult<Option<Receipt>> {
        let department_id = self.department_id();

        match result {
            PaymentResult::Confirmed { reference } => {
                let finalized = self.db.sales().mark_finalized(department_id, sale_id, Utc::now()).await?;
                if !finalized {
                    let sale = self.require_sale(sale_id).await?;
                    warn!(sale_id, status = %sale.status, "Ignoring payment confirmation for sale not awaiting one");
                    return Ok(None);
                }

                let receipt = self.receipt_for(sale_id).await?;
                info!(
                    sale_id,
                    receipt_number = %receipt.receipt_number,
                    reference = reference.as_deref().unwrap_or("-"),
                    "Mobile-money payment confirmed, sale finalized"
                );
                self.events.emit(Invalidation::SalesHistory {
                    department_id: department_id.to_string(),
                });
                self.events.emit(Invalidation::Dashboard {
                    department_id: department_id.to_string(),
                });
                self.events.emit(Invalidation::Sale {
                    sale_id: sale_id.to_string(),
                });
                self.gate.resolve(
                    sale_id,
                    Confirmation::Confirmed {
                        receipt: receipt.clone(),
                    },
                );
                Ok(Some(receipt))
            }
            PaymentResult::Failed { reason } => {
                let recorded = self
                    .db
                    .sales()
                    .record_payment_error(department_id, sale_id, &reason)
                    .await?;
                if !recorded {
                    let sale = self.require_sale(sale_id).await?;
                    warn!(sale_id, status = %sale.status, "Ignoring payment failure for sale not awaiting one");
                    return Ok(None);
                }

                warn!(sale_id, reason = %reason, "Mobile-money payment failed, sale left pending");
                self.events.emit(Invalidation::Sale {
                    sale_id: sale_id.to_string(),
                });
                self.gate.resolve(sale_id, Confirmation::Failed { reason });
                Ok(None)
            }
        }
    }

    /// Asks the gateway again for a sale that is still pending.
    pub async fn retry_payment(&self, sale_id: &str) -> EngineResult<Sale> {
        let sale = self.require_sale(sale_id).await?;
        sale.ensure_awaiting_payment("retry payment")?;

        info!(sale_id, receipt_number = %sale.receipt_number, "Retrying mobile-money payment");
        if let Err(e) = self.request_confirmation(&sale).await {
            return Err(EngineError::Core(CoreError::PaymentGateway {
                sale_id: sale.id,
                reason: e.0,
            }));
        }
        Ok(sale)
    }

    /// Registers a waiter and sends the collection request.
    ///
    /// A rejected request is recorded on the sale and the waiter dropped.
    pub(crate) async fn request_confirmation(&self, sale: &Sale) -> Result<(), GatewayError> {
        self.gate.register(&sale.id);

        let request = PaymentRequest {
            sale_id: sale.id.clone(),
            department_id: sale.department_id.clone(),
            receipt_number: sale.receipt_number.clone(),
            amount: sale.total,
            customer_label: sale.customer_label.clone(),
        };
        debug!(sale_id = %sale.id, amount = %sale.total, "Requesting mobile-money payment");

        match self.gateway.request_payment(request).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(sale_id = %sale.id, error = %e, "Payment gateway rejected request, sale left pending");
                self.gate.cancel(&sale.id);
                if let Err(db_err) = self
                    .db
                    .sales()
                    .record_payment_error(&sale.department_id, &sale.id, &e.0)
                    .await
                {
                    warn!(sale_id = %sale.id, error = %db_err, "Could not record payment error");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_waiter_receives_result() {
        let gate = PaymentConfirmationGate::new(Duration::from_secs(5));
        gate.register("s1");
        let (generation, rx) = gate.take_receiver("s1").unwrap();
        assert!(gate.is_pending("s1"));
        assert!(gate.resolve("s1", Confirmation::Failed { reason: "declined".into() }));
        assert!(!gate.is_pending("s1"));

        assert_eq!(
            gate.wait("s1", generation, rx).await,
            Confirmation::Failed {
                reason: "declined".into()
            }
        );
        assert_eq!(gate.pending_count(), 0);
    }

    #[test]
    fn test_resolve_without_waiter_drops_registration() {
        let gate = PaymentConfirmationGate::new(Duration::from_secs(5));
        for sale in ["s1", "s2", "s3"] {
            gate.register(sale);
            assert!(!gate.resolve(sale, Confirmation::Failed { reason: "declined".into() }));
        }
        assert_eq!(gate.pending_count(), 0);
        assert!(gate.take_receiver("s1").is_none());
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let gate = PaymentConfirmationGate::new(Duration::from_millis(20));
        gate.register("s1");
        let (generation, rx) = gate.take_receiver("s1").unwrap();
        assert_eq!(gate.wait("s1", generation, rx).await, Confirmation::TimedOut);
        assert!(!gate.is_pending("s1"));
        assert!(!gate.resolve("s1", Confirmation::TimedOut));
    }

    #[tokio::test]
    async fn test_stale_timeout_keeps_newer_registration() {
        let gate = PaymentConfirmationGate::new(Duration::from_millis(20));
        gate.register("s1");
        let (old_generation, _) = gate.take_receiver("s1").unwrap();
        gate.register("s1");

        // The old waiter's timer fires after the retry registered again
        let (_tx, stale_rx) = oneshot::channel();
        assert_eq!(gate.wait("s1", old_generation, stale_rx).await, Confirmation::TimedOut);

        assert!(gate.is_pending("s1"));
        let (generation, rx) = gate.take_receiver("s1").unwrap();
        assert_ne!(generation, old_generation);
        assert!(gate.resolve("s1", Confirmation::Failed { reason: "declined".into() }));
        assert_eq!(
            gate.wait("s1", generation, rx).await,
            Confirmation::Failed {
                reason: "declined".into()
            }
        );
    }

    #[tokio::test]
    async fn test_reregister_cancels_previous_waiter() {
        let gate = PaymentConfirmationGate::new(Duration::from_secs(5));
        gate.register("s1");
        let (generation, first) = gate.take_receiver("s1").unwrap();
        gate.register("s1");
        assert_eq!(gate.wait("s1", generation, first).await, Confirmation::Cancelled);
        assert!(gate.is_pending("s1"));
    }

    #[test]
    fn test_resolve_unknown_sale() {
        let gate = PaymentConfirmationGate::new(Duration::from_secs(1));
        assert!(!gate.resolve("nope", Confirmation::Cancelled));
    }
}
