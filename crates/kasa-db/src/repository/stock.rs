//! # Stock Ledger
//!
//! Authoritative stock quantities per department, item and variant.
//!
//! ## Check vs Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  check_availability(target, qty)   read-only, advisory                 │
//! │       │  used while building a cart and as the pre-check               │
//! │       │  before checkout. Never reserves anything.                     │
//! │                                                                         │
//! │  commit_in(tx, demands)            authoritative                       │
//! │       │  for each demand, ordered by target:                           │
//! │       │     UPDATE ... SET stock = stock - qty                         │
//! │       │     WHERE id = ? AND stock >= qty                              │
//! │       │                                                                 │
//! │       ├── every UPDATE hit one row ──► Committed                       │
//! │       └── any UPDATE hit zero rows ──► Failed(StockCheck)              │
//! │                                        caller drops the tx (rollback)  │
//! │                                                                         │
//! │  Two cashiers racing for the last unit: SQLite serializes the writers, │
//! │  the second UPDATE sees the first one's decrement and matches nothing. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Items that have variants keep stock on the variants only. An `Item`
//! target pointing at such an item is never available and never
//! decremented.

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use kasa_core::{StockCheck, StockDemand, StockTarget};

/// Result of an authoritative multi-row stock commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All demands were decremented.
    Committed,
    /// The first demand that could not be satisfied, with fresh numbers.
    /// Nothing in the transaction should be kept.
    Failed(StockCheck),
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }
}

#[derive(Debug, FromRow)]
struct StockLevelRow {
    name: String,
    stock_quantity: Option<i64>,
    volume_unit: Option<String>,
    has_variants: bool,
}

/// Stock reads and decrements, always scoped by department.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    /// Point-in-time answer to "can `requested` units of `target` be sold?".
    ///
    /// `requested` is the total the caller wants to hold, not an increment.
    pub async fn check_availability(
        &self,
        department_id: &str,
        target: &StockTarget,
        requested: i64,
    ) -> DbResult<StockCheck> {
        let mut conn = self.pool.acquire().await?;
        check_in(&mut conn, department_id, target, requested).await
    }

    /// Commits `demands` in a transaction of its own.
    pub async fn commit(&self, department_id: &str, demands: &[StockDemand]) -> DbResult<CommitOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = Self::commit_in(&mut tx, department_id, demands).await?;
        if outcome.is_committed() {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(outcome)
    }

    /// Decrements every demand inside the caller's transaction.
    ///
    /// On [`CommitOutcome::Failed`] earlier decrements are still applied to
    /// the transaction; the caller must roll it back.
    pub async fn commit_in(
        conn: &mut SqliteConnection,
        department_id: &str,
        demands: &[StockDemand],
    ) -> DbResult<CommitOutcome> {
        let mut ordered: Vec<&StockDemand> = demands.iter().collect();
        ordered.sort_by(|a, b| a.target.cmp(&b.target));

        for demand in ordered {
            let rows = decrement(conn, department_id, &demand.target, demand.quantity).await?;
            if rows != 1 {
                let check = check_in(conn, department_id, &demand.target, demand.quantity).await?;
                warn!(
                    department_id,
                    target = %demand.target.id(),
                    requested = demand.quantity,
                    available = check.available_quantity,
                    "Stock commit failed"
                );
                return Ok(CommitOutcome::Failed(check));
            }
            debug!(target = %demand.target.id(), quantity = demand.quantity, "Stock decremented");
        }

        Ok(CommitOutcome::Committed)
    }

    /// Puts previously committed quantities back (restock on void).
    pub async fn release_in(conn: &mut SqliteConnection, department_id: &str, demands: &[StockDemand]) -> DbResult<()> {
        let mut ordered: Vec<&StockDemand> = demands.iter().collect();
        ordered.sort_by(|a, b| a.target.cmp(&b.target));

        for demand in ordered {
            let rows = increment(conn, department_id, &demand.target, demand.quantity).await?;
            if rows == 0 {
                // Deleted from the catalog since the sale; nothing to return to.
                warn!(target = %demand.target.id(), "Stock release skipped, target no longer exists");
            }
        }
        Ok(())
    }
}

// =============================================================================
// Statements
// =============================================================================

async fn check_in(
    conn: &mut SqliteConnection,
    department_id: &str,
    target: &StockTarget,
    requested: i64,
) -> DbResult<StockCheck> {
    let row: Option<StockLevelRow> = match target {
        StockTarget::Item(id) => {
            sqlx::query_as(
                r#"
                SELECT i.name, i.stock_quantity, i.volume_unit,
                       EXISTS (SELECT 1 FROM catalog_variants v WHERE v.item_id = i.id) AS has_variants
                FROM catalog_items i
                WHERE i.id = ?1 AND i.department_id = ?2
                "#,
            )
            .bind(id)
            .bind(department_id)
            .fetch_optional(&mut *conn)
            .await?
        }
        StockTarget::Variant(id) => {
            sqlx::query_as(
                r#"
                SELECT i.name || ' (' || v.name || ')' AS name, v.stock_quantity, i.volume_unit,
                       0 AS has_variants
                FROM catalog_variants v
                JOIN catalog_items i ON i.id = v.item_id
                WHERE v.id = ?1 AND i.department_id = ?2
                "#,
            )
            .bind(id)
            .bind(department_id)
            .fetch_optional(&mut *conn)
            .await?
        }
    };

    let row = row.ok_or_else(|| DbError::not_found("Stock target", target.id()))?;
    let available = if row.has_variants {
        0
    } else {
        row.stock_quantity.unwrap_or(0)
    };

    Ok(StockCheck::evaluate(
        target.clone(),
        row.name,
        requested,
        available,
        row.volume_unit.as_deref(),
    ))
}

async fn decrement(
    conn: &mut SqliteConnection,
    department_id: &str,
    target: &StockTarget,
    quantity: i64,
) -> DbResult<u64> {
    let now = Utc::now();
    let result = match target {
        StockTarget::Item(id) => {
            sqlx::query(
                r#"
                UPDATE catalog_items
                SET stock_quantity = stock_quantity - ?1, updated_at = ?2
                WHERE id = ?3
                  AND department_id = ?4
                  AND stock_quantity IS NOT NULL
                  AND stock_quantity >= ?1
                  AND NOT EXISTS (SELECT 1 FROM catalog_variants v WHERE v.item_id = catalog_items.id)
                "#,
            )
            .bind(quantity)
            .bind(now)
            .bind(id)
            .bind(department_id)
            .execute(&mut *conn)
            .await?
        }
        StockTarget::Variant(id) => {
            sqlx::query(
                r#"
                UPDATE catalog_variants
                SET stock_quantity = stock_quantity - ?1, updated_at = ?2
                WHERE id = ?3
                  AND stock_quantity >= ?1
                  AND item_id IN (SELECT id FROM catalog_items WHERE department_id = ?4)
                "#,
            )
            .bind(quantity)
            .bind(now)
            .bind(id)
            .bind(department_id)
            .execute(&mut *conn)
            .await?
        }
    };
    Ok(result.rows_affected())
}

pub(crate) async fn increment(
    conn: &mut SqliteConnection,
    department_id: &str,
    target: &StockTarget,
    quantity: i64,
) -> DbResult<u64> {
    let now = Utc::now();
    let result = match target {
        StockTarget::Item(id) => {
            sqlx::query(
                r#"
                UPDATE catalog_items
                SET stock_quantity = COALESCE(stock_quantity, 0) + ?1, updated_at = ?2
                WHERE id = ?3 AND department_id = ?4
                "#,
            )
            .bind(quantity)
            .bind(now)
            .bind(id)
            .bind(department_id)
            .execute(&mut *conn)
            .await?
        }
        StockTarget::Variant(id) => {
            sqlx::query(
                r#"
                UPDATE catalog_variants
                SET stock_quantity = stock_quantity + ?1, updated_at = ?2
                WHERE id = ?3
                  AND item_id IN (SELECT id FROM catalog_items WHERE department_id = ?4)
                "#,
            )
            .bind(quantity)
            .bind(now)
            .bind(id)
            .bind(department_id)
            .execute(&mut *conn)
            .await?
        }
    };
    Ok(result.rows_affected())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use kasa_core::{CatalogItem, ItemKind, Money, Variant};
    use uuid::Uuid;

    fn rice(stock: i64) -> CatalogItem {
        let mut item = CatalogItem::new("dept-a", "Rice 5kg", ItemKind::Product, Money::from_minor(1200));
        item.stock_quantity = Some(stock);
        item
    }

    fn shirt(stock: i64) -> CatalogItem {
        let mut item = CatalogItem::new("dept-a", "Shirt", ItemKind::Product, Money::from_minor(2000));
        let variant = Variant::new(item.id.clone(), "M", Money::zero(), stock);
        item.variants.push(variant);
        item
    }

    fn demand(target: StockTarget, quantity: i64) -> StockDemand {
        StockDemand {
            target,
            item_name: "test".to_string(),
            quantity,
        }
    }

    async fn stock_of(db: &Database, item_id: &str) -> Option<i64> {
        db.catalog().require_item("dept-a", item_id).await.unwrap().stock_quantity
    }

    #[tokio::test]
    async fn test_check_availability() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let item = rice(3);
        db.catalog().insert_item(&item).await.unwrap();
        let target = StockTarget::Item(item.id.clone());

        let ok = db.stock().check_availability("dept-a", &target, 3).await.unwrap();
        assert!(ok.available);
        assert_eq!(ok.available_quantity, 3);

        let short = db.stock().check_availability("dept-a", &target, 5).await.unwrap();
        assert!(!short.available);
        assert_eq!(short.message, "Only 3 of Rice 5kg available, 5 requested");

        let other_dept = db.stock().check_availability("dept-b", &target, 1).await;
        assert!(matches!(other_dept, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_item_with_variants_has_no_item_level_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut item = shirt(4);
        item.stock_quantity = Some(10);
        db.catalog().insert_item(&item).await.unwrap();

        let item_target = StockTarget::Item(item.id.clone());
        let check = db.stock().check_availability("dept-a", &item_target, 1).await.unwrap();
        assert!(!check.available);

        let outcome = db.stock().commit("dept-a", &[demand(item_target, 1)]).await.unwrap();
        assert!(!outcome.is_committed());
        assert_eq!(stock_of(&db, &item.id).await, Some(10));

        let variant_target = StockTarget::Variant(item.variants[0].id.clone());
        let check = db.stock().check_availability("dept-a", &variant_target, 4).await.unwrap();
        assert!(check.available);
        assert_eq!(check.item_name, "Shirt (M)");
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = rice(5);
        let b = rice(1);
        db.catalog().insert_item(&a).await.unwrap();
        db.catalog().insert_item(&b).await.unwrap();

        let outcome = db
            .stock()
            .commit(
                "dept-a",
                &[
                    demand(StockTarget::Item(a.id.clone()), 2),
                    demand(StockTarget::Item(b.id.clone()), 2),
                ],
            )
            .await
            .unwrap();

        match outcome {
            CommitOutcome::Failed(check) => {
                assert_eq!(check.target, StockTarget::Item(b.id.clone()));
                assert_eq!(check.available_quantity, 1);
            }
            CommitOutcome::Committed => panic!("commit should fail"),
        }
        assert_eq!(stock_of(&db, &a.id).await, Some(5));
        assert_eq!(stock_of(&db, &b.id).await, Some(1));

        let outcome = db
            .stock()
            .commit("dept-a", &[demand(StockTarget::Item(a.id.clone()), 5)])
            .await
            .unwrap();
        assert!(outcome.is_committed());
        assert_eq!(stock_of(&db, &a.id).await, Some(0));
    }

    #[tokio::test]
    async fn test_release_in_restores_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let item = shirt(4);
        db.catalog().insert_item(&item).await.unwrap();
        let demands = vec![demand(StockTarget::Variant(item.variants[0].id.clone()), 3)];

        assert!(db.stock().commit("dept-a", &demands).await.unwrap().is_committed());

        let mut tx = db.begin().await.unwrap();
        StockLedger::release_in(&mut tx, "dept-a", &demands).await.unwrap();
        tx.commit().await.unwrap();

        let loaded = db.catalog().require_item("dept-a", &item.id).await.unwrap();
        assert_eq!(loaded.variants[0].stock_quantity, 4);
    }

    #[tokio::test]
    async fn test_concurrent_commits_for_last_units() {
        let path = std::env::temp_dir().join(format!("kasa-test-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(4)).await.unwrap();
        let item = shirt(5);
        db.catalog().insert_item(&item).await.unwrap();
        let demands = vec![demand(StockTarget::Variant(item.variants[0].id.clone()), 3)];

        let ledger_a = db.stock();
        let ledger_b = db.stock();
        let (a, b) = tokio::join!(ledger_a.commit("dept-a", &demands), ledger_b.commit("dept-a", &demands));
        let committed = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|o| o.is_committed())
            .count();

        assert_eq!(committed, 1);
        let loaded = db.catalog().require_item("dept-a", &item.id).await.unwrap();
        assert_eq!(loaded.variants[0].stock_quantity, 2);

        db.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
