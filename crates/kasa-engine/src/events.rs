//! # Invalidation Events
//!
//! After a sale commits (or is confirmed or voided), read-side views must
//! refresh. The engine broadcasts what changed; subscribers decide what to
//! reload.
//!
//! ```text
//! complete_sale ──► Catalog + SalesHistory + Dashboard + Sale(id)
//! on_payment_result (confirmed) ──► SalesHistory + Dashboard + Sale(id)
//! void_sale ──► SalesHistory + Dashboard + Sale(id) (+ Catalog if restocked)
//! ```

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Enough to buffer a burst of checkouts for a slow subscriber.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Invalidation {
    /// Stock levels of a department changed.
    Catalog { department_id: String },
    SalesHistory { department_id: String },
    Dashboard { department_id: String },
    /// One sale changed status.
    Sale { sale_id: String },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Invalidation>,
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: Invalidation) {
        // Err only means nobody is listening
        if self.tx.send(event.clone()).is_err() {
            trace!(?event, "No invalidation subscribers");
        }
    }

    pub(crate) fn sale_committed(&self, department_id: &str, sale_id: &str, stock_changed: bool) {
        if stock_changed {
            self.emit(Invalidation::Catalog {
                department_id: department_id.to_string(),
            });
        }
        self.emit(Invalidation::SalesHistory {
            department_id: department_id.to_string(),
        });
        self.emit(Invalidation::Dashboard {
            department_id: department_id.to_string(),
        });
        self.emit(Invalidation::Sale {
            sale_id: sale_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sale_committed_fan_out() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.sale_committed("d1", "s1", true);

        assert_eq!(
            rx.recv().await.unwrap(),
            Invalidation::Catalog {
                department_id: "d1".into()
            }
        );
        assert!(matches!(rx.recv().await.unwrap(), Invalidation::SalesHistory { .. }));
        assert!(matches!(rx.recv().await.unwrap(), Invalidation::Dashboard { .. }));
        assert_eq!(rx.recv().await.unwrap(), Invalidation::Sale { sale_id: "s1".into() });
    }

    #[test]
    fn test_emit_without_subscribers() {
        EventBus::new().emit(Invalidation::Sale { sale_id: "s1".into() });
    }
}
