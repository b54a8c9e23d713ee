//! # Sale Repository
//!
//! Sale headers, their decoupled line copies, and per-department receipt
//! numbering.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. INSERT (inside the stock-commit transaction)                       │
//! │     └── insert_in() → status Finalized or AwaitingPaymentConfirmation  │
//! │                                                                         │
//! │  2. CONFIRM (asynchronous payment methods only)                        │
//! │     ├── mark_finalized()          gateway said yes                     │
//! │     └── record_payment_error()    gateway said no, stays pending       │
//! │                                                                         │
//! │  3. (OPTIONAL) VOID                                                    │
//! │     └── void_in() → status Voided, reason kept                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sale lines are copies. They never reference the catalog so later
//! catalog edits cannot rewrite history.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use kasa_core::{
    fallback_receipt_number, format_receipt_number, ItemKind, Money, PaymentMethod, PriceTier, Sale, SaleLine,
    SaleStatus,
};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct SaleRow {
    id: String,
    department_id: String,
    terminal_id: String,
    cart_id: String,
    receipt_number: String,
    status: SaleStatus,
    payment_method: PaymentMethod,
    customer_label: Option<String>,
    subtotal: i64,
    total: i64,
    line_count: i64,
    sold_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
    voided_at: Option<DateTime<Utc>>,
    void_reason: Option<String>,
    payment_error: Option<String>,
}

impl From<SaleRow> for Sale {
    fn from(row: SaleRow) -> Self {
        Sale {
            id: row.id,
            department_id: row.department_id,
            terminal_id: row.terminal_id,
            cart_id: row.cart_id,
            receipt_number: row.receipt_number,
            status: row.status,
            payment_method: row.payment_method,
            customer_label: row.customer_label,
            subtotal: Money::from_minor(row.subtotal),
            total: Money::from_minor(row.total),
            line_count: row.line_count,
            sold_at: row.sold_at,
            created_at: row.created_at,
            finalized_at: row.finalized_at,
            voided_at: row.voided_at,
            void_reason: row.void_reason,
            payment_error: row.payment_error,
        }
    }
}

#[derive(Debug, FromRow)]
struct SaleLineRow {
    id: String,
    sale_id: String,
    position: i64,
    item_id: String,
    variant_id: Option<String>,
    name: String,
    kind: ItemKind,
    tier: PriceTier,
    unit_price: i64,
    quantity: i64,
    unit_label: Option<String>,
    line_total: i64,
}

impl From<SaleLineRow> for SaleLine {
    fn from(row: SaleLineRow) -> Self {
        SaleLine {
            id: row.id,
            sale_id: row.sale_id,
            position: row.position,
            item_id: row.item_id,
            variant_id: row.variant_id,
            name: row.name,
            kind: row.kind,
            tier: row.tier,
            unit_price: Money::from_minor(row.unit_price),
            quantity: row.quantity,
            unit_label: row.unit_label,
            line_total: Money::from_minor(row.line_total),
        }
    }
}

const SALE_COLUMNS: &str = r#"
    id, department_id, terminal_id, cart_id, receipt_number, status, payment_method,
    customer_label, subtotal, total, line_count,
    sold_at, created_at, finalized_at, voided_at, void_reason, payment_error
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Inserts a sale and its lines inside the caller's transaction.
    pub async fn insert_in(conn: &mut SqliteConnection, sale: &Sale, lines: &[SaleLine]) -> DbResult<()> {
        debug!(id = %sale.id, receipt_number = %sale.receipt_number, status = %sale.status, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, department_id, terminal_id, cart_id, receipt_number, status, payment_method,
                customer_label, subtotal, total, line_count,
                sold_at, created_at, finalized_at, voided_at, void_reason, payment_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.department_id)
        .bind(&sale.terminal_id)
        .bind(&sale.cart_id)
        .bind(&sale.receipt_number)
        .bind(sale.status)
        .bind(sale.payment_method)
        .bind(&sale.customer_label)
        .bind(sale.subtotal.minor())
        .bind(sale.total.minor())
        .bind(sale.line_count)
        .bind(sale.sold_at)
        .bind(sale.created_at)
        .bind(sale.finalized_at)
        .bind(sale.voided_at)
        .bind(&sale.void_reason)
        .bind(&sale.payment_error)
        .execute(&mut *conn)
        .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO sale_lines (
                    id, sale_id, position, item_id, variant_id, name, kind, tier,
                    unit_price, quantity, unit_label, line_total
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(&line.id)
            .bind(&line.sale_id)
            .bind(line.position)
            .bind(&line.item_id)
            .bind(&line.variant_id)
            .bind(&line.name)
            .bind(line.kind)
            .bind(line.tier)
            .bind(line.unit_price.minor())
            .bind(line.quantity)
            .bind(&line.unit_label)
            .bind(line.line_total.minor())
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Gets a sale by ID within a department.
    pub async fn get(&self, department_id: &str, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, department_id, id).await
    }

    /// Same as [`SaleRepository::get`], inside an open transaction.
    pub async fn get_in(conn: &mut SqliteConnection, department_id: &str, id: &str) -> DbResult<Option<Sale>> {
        let row: Option<SaleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sales WHERE id = ?1 AND department_id = ?2",
            SALE_COLUMNS
        ))
        .bind(id)
        .bind(department_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.map(Sale::from))
    }

    /// Gets a sale or fails with `NotFound`.
    pub async fn require(&self, department_id: &str, id: &str) -> DbResult<Sale> {
        self.get(department_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))
    }

    /// The sale made from a cart, if that cart was ever checked out.
    pub async fn find_by_cart(&self, department_id: &str, cart_id: &str) -> DbResult<Option<Sale>> {
        let row: Option<SaleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sales WHERE cart_id = ?1 AND department_id = ?2",
            SALE_COLUMNS
        ))
        .bind(cart_id)
        .bind(department_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Sale::from))
    }

    /// The line copies of a sale, in cart order.
    pub async fn lines(&self, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let mut conn = self.pool.acquire().await?;
        Self::lines_in(&mut conn, sale_id).await
    }

    pub async fn lines_in(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let rows: Vec<SaleLineRow> = sqlx::query_as(
            r#"
            SELECT id, sale_id, position, item_id, variant_id, name, kind, tier,
                   unit_price, quantity, unit_label, line_total
            FROM sale_lines
            WHERE sale_id = ?1
            ORDER BY position
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(SaleLine::from).collect())
    }

    /// Sales of a department in one status, newest first.
    pub async fn list_by_status(&self, department_id: &str, status: SaleStatus, limit: i64) -> DbResult<Vec<Sale>> {
        let rows: Vec<SaleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sales WHERE department_id = ?1 AND status = ?2 ORDER BY sold_at DESC LIMIT ?3",
            SALE_COLUMNS
        ))
        .bind(department_id)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Sale::from).collect())
    }

    /// Moves an awaiting sale to Finalized and clears any payment error.
    ///
    /// Returns `false` when the sale was not awaiting confirmation (already
    /// finalized, voided, or missing), leaving it untouched.
    pub async fn mark_finalized(&self, department_id: &str, id: &str, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET status = ?1, finalized_at = ?2, payment_error = NULL
            WHERE id = ?3 AND department_id = ?4 AND status = ?5
            "#,
        )
        .bind(SaleStatus::Finalized)
        .bind(at)
        .bind(id)
        .bind(department_id)
        .bind(SaleStatus::AwaitingPaymentConfirmation)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Stores the latest payment failure on an awaiting sale.
    pub async fn record_payment_error(&self, department_id: &str, id: &str, error: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET payment_error = ?1
            WHERE id = ?2 AND department_id = ?3 AND status = ?4
            "#,
        )
        .bind(error)
        .bind(id)
        .bind(department_id)
        .bind(SaleStatus::AwaitingPaymentConfirmation)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Marks a sale Voided inside the caller's transaction.
    ///
    /// Only Finalized or AwaitingPaymentConfirmation sales are touched;
    /// returns `false` otherwise.
    pub async fn void_in(
        conn: &mut SqliteConnection,
        department_id: &str,
        id: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET status = ?1, voided_at = ?2, void_reason = ?3
            WHERE id = ?4 AND department_id = ?5 AND status IN (?6, ?7)
            "#,
        )
        .bind(SaleStatus::Voided)
        .bind(at)
        .bind(reason)
        .bind(id)
        .bind(department_id)
        .bind(SaleStatus::Finalized)
        .bind(SaleStatus::AwaitingPaymentConfirmation)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Next receipt number for a department and business day.
    ///
    /// The counter lives in `receipt_sequences` and is bumped inside the
    /// caller's transaction, so numbers are unique per department even with
    /// several terminals. If the counter cannot be read, a timestamp-based
    /// number is used instead and the failure is logged.
    pub async fn allocate_receipt_number_in(
        conn: &mut SqliteConnection,
        department_id: &str,
        business_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> String {
        match next_sequence(conn, department_id, business_date).await {
            Ok(seq) => format_receipt_number(business_date, seq),
            Err(e) => {
                warn!(error = %e, department_id, "Receipt sequence unavailable, using fallback number");
                fallback_receipt_number(business_date, now)
            }
        }
    }
}

async fn next_sequence(conn: &mut SqliteConnection, department_id: &str, business_date: NaiveDate) -> DbResult<i64> {
    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO receipt_sequences (department_id, business_date, last_value)
        VALUES (?1, ?2, 1)
        ON CONFLICT (department_id, business_date)
        DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(department_id)
    .bind(business_date.format("%Y%m%d").to_string())
    .fetch_one(&mut *conn)
    .await?;
    Ok(seq)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use kasa_core::{Cart, CatalogItem, SaleContext};

    fn cart(method: PaymentMethod) -> Cart {
        let svc = CatalogItem::new("dept-a", "Repair", ItemKind::Service, Money::from_minor(1500));
        let data = CatalogItem::new("dept-a", "1GB bundle", ItemKind::DataPackage, Money::from_minor(500));
        let mut cart = Cart::new();
        cart.add_item(&svc, None, 1, None, None).unwrap();
        cart.add_item(&data, None, 2, None, None).unwrap();
        cart.set_payment_method(Some(method));
        cart
    }

    async fn insert(db: &Database, method: PaymentMethod, receipt: &str) -> Sale {
        let (sale, lines) = Sale::from_cart(
            &cart(method),
            SaleContext {
                department_id: "dept-a",
                terminal_id: "till-1",
                receipt_number: receipt.to_string(),
                sold_at: Utc::now(),
            },
        )
        .unwrap();
        let mut tx = db.begin().await.unwrap();
        SaleRepository::insert_in(&mut tx, &sale, &lines).await.unwrap();
        tx.commit().await.unwrap();
        sale
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sale = insert(&db, PaymentMethod::Cash, "20240101-00001").await;

        let loaded = db.sales().require("dept-a", &sale.id).await.unwrap();
        assert_eq!(loaded.status, SaleStatus::Finalized);
        assert_eq!(loaded.total, Money::from_minor(2500));
        assert_eq!(loaded.line_count, 2);

        let lines = db.sales().lines(&sale.id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].name, "Repair");
        assert_eq!(lines[1].line_total, Money::from_minor(1000));

        assert!(db.sales().get("dept-b", &sale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_receipt_number_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        insert(&db, PaymentMethod::Cash, "20240101-00001").await;

        let (sale, lines) = Sale::from_cart(
            &cart(PaymentMethod::Card),
            SaleContext {
                department_id: "dept-a",
                terminal_id: "till-2",
                receipt_number: "20240101-00001".to_string(),
                sold_at: Utc::now(),
            },
        )
        .unwrap();
        let mut tx = db.begin().await.unwrap();
        let err = SaleRepository::insert_in(&mut tx, &sale, &lines).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_one_sale_per_cart() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cart = cart(PaymentMethod::Cash);
        let sell = |receipt: &str| {
            Sale::from_cart(
                &cart,
                SaleContext {
                    department_id: "dept-a",
                    terminal_id: "till-1",
                    receipt_number: receipt.to_string(),
                    sold_at: Utc::now(),
                },
            )
            .unwrap()
        };

        let (sale, lines) = sell("20240101-00001");
        let mut tx = db.begin().await.unwrap();
        SaleRepository::insert_in(&mut tx, &sale, &lines).await.unwrap();
        tx.commit().await.unwrap();

        let found = db.sales().find_by_cart("dept-a", &cart.id).await.unwrap().unwrap();
        assert_eq!(found.id, sale.id);
        assert!(db.sales().find_by_cart("dept-b", &cart.id).await.unwrap().is_none());

        let (again, lines) = sell("20240101-00002");
        let mut tx = db.begin().await.unwrap();
        let err = SaleRepository::insert_in(&mut tx, &again, &lines).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_payment_confirmation_transitions() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sale = insert(&db, PaymentMethod::MobileMoney, "20240101-00001").await;
        assert_eq!(sale.status, SaleStatus::AwaitingPaymentConfirmation);

        assert!(db
            .sales()
            .record_payment_error("dept-a", &sale.id, "insufficient funds")
            .await
            .unwrap());
        let pending = db.sales().list_by_status("dept-a", SaleStatus::AwaitingPaymentConfirmation, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payment_error.as_deref(), Some("insufficient funds"));

        assert!(db.sales().mark_finalized("dept-a", &sale.id, Utc::now()).await.unwrap());
        let loaded = db.sales().require("dept-a", &sale.id).await.unwrap();
        assert_eq!(loaded.status, SaleStatus::Finalized);
        assert!(loaded.payment_error.is_none());
        assert!(loaded.finalized_at.is_some());

        // Second confirmation is a no-op
        assert!(!db.sales().mark_finalized("dept-a", &sale.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_void_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sale = insert(&db, PaymentMethod::Cash, "20240101-00001").await;

        let mut tx = db.begin().await.unwrap();
        assert!(SaleRepository::void_in(&mut tx, "dept-a", &sale.id, Some("customer changed mind"), Utc::now())
            .await
            .unwrap());
        assert!(!SaleRepository::void_in(&mut tx, "dept-a", &sale.id, None, Utc::now())
            .await
            .unwrap());
        tx.commit().await.unwrap();

        let loaded = db.sales().require("dept-a", &sale.id).await.unwrap();
        assert_eq!(loaded.status, SaleStatus::Voided);
        assert_eq!(loaded.void_reason.as_deref(), Some("customer changed mind"));
    }

    #[tokio::test]
    async fn test_receipt_sequence_per_department_and_day() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        let a1 = SaleRepository::allocate_receipt_number_in(&mut tx, "dept-a", day, now).await;
        let a2 = SaleRepository::allocate_receipt_number_in(&mut tx, "dept-a", day, now).await;
        let b1 = SaleRepository::allocate_receipt_number_in(&mut tx, "dept-b", day, now).await;
        let a3 = SaleRepository::allocate_receipt_number_in(&mut tx, "dept-a", next_day, now).await;
        tx.commit().await.unwrap();

        assert_eq!(a1, "20240309-00001");
        assert_eq!(a2, "20240309-00002");
        assert_eq!(b1, "20240309-00001");
        assert_eq!(a3, "20240310-00001");
    }
}
