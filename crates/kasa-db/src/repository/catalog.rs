//! # Catalog Repository
//!
//! Read side of the Catalog Store, scoped by department.
//!
//! The engine only reads here. The insert/restock helpers exist for the
//! seed binary, back-office tooling and tests; stock decrements during a
//! sale go through [`crate::repository::stock::StockLedger`] only.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasa_core::{CatalogItem, CustomPricePolicy, ItemKind, Money, TierPrices, Variant, VolumePricing};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct CatalogItemRow {
    id: String,
    department_id: String,
    name: String,
    kind: ItemKind,
    base_price: i64,
    retail_price: i64,
    wholesale_price: i64,
    individual_price: i64,
    volume_unit: Option<String>,
    volume_retail_per_unit: i64,
    volume_wholesale_per_unit: i64,
    allow_custom_price: bool,
    min_price: Option<i64>,
    max_price: Option<i64>,
    stock_quantity: Option<i64>,
    is_active: bool,
}

impl CatalogItemRow {
    fn into_item(self, variants: Vec<Variant>) -> CatalogItem {
        CatalogItem {
            id: self.id,
            department_id: self.department_id,
            name: self.name,
            kind: self.kind,
            base_price: Money::from_minor(self.base_price),
            tier_prices: TierPrices {
                retail: Money::from_minor(self.retail_price),
                wholesale: Money::from_minor(self.wholesale_price),
                individual: Money::from_minor(self.individual_price),
            },
            volume: self.volume_unit.map(|unit_label| VolumePricing {
                unit_label,
                retail_per_unit: Money::from_minor(self.volume_retail_per_unit),
                wholesale_per_unit: Money::from_minor(self.volume_wholesale_per_unit),
            }),
            price_policy: CustomPricePolicy {
                allow_custom_price: self.allow_custom_price,
                min_price: self.min_price.map(Money::from_minor),
                max_price: self.max_price.map(Money::from_minor),
            },
            stock_quantity: self.stock_quantity,
            variants,
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, FromRow)]
struct VariantRow {
    id: String,
    item_id: String,
    name: String,
    price_adjustment: i64,
    stock_quantity: i64,
}

impl From<VariantRow> for Variant {
    fn from(row: VariantRow) -> Self {
        Variant {
            id: row.id,
            item_id: row.item_id,
            name: row.name,
            price_adjustment: Money::from_minor(row.price_adjustment),
            stock_quantity: row.stock_quantity,
        }
    }
}

const ITEM_COLUMNS: &str = r#"
    id, department_id, name, kind, base_price,
    retail_price, wholesale_price, individual_price,
    volume_unit, volume_retail_per_unit, volume_wholesale_per_unit,
    allow_custom_price, min_price, max_price,
    stock_quantity, is_active
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog items and their variants.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Reads one item (with variants) from a department.
    pub async fn get_item(&self, department_id: &str, id: &str) -> DbResult<Option<CatalogItem>> {
        let row: Option<CatalogItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM catalog_items WHERE id = ?1 AND department_id = ?2",
            ITEM_COLUMNS
        ))
        .bind(id)
        .bind(department_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let variants: Vec<VariantRow> = sqlx::query_as(
            r#"
            SELECT id, item_id, name, price_adjustment, stock_quantity
            FROM catalog_variants
            WHERE item_id = ?1
            ORDER BY name
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_item(variants.into_iter().map(Variant::from).collect())))
    }

    /// Reads one item, failing with `NotFound` when it is absent.
    pub async fn require_item(&self, department_id: &str, id: &str) -> DbResult<CatalogItem> {
        self.get_item(department_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Catalog item", id))
    }

    /// Reads a variant by id, scoped to the department of its item.
    pub async fn get_variant(&self, department_id: &str, variant_id: &str) -> DbResult<Option<Variant>> {
        let row: Option<VariantRow> = sqlx::query_as(
            r#"
            SELECT v.id, v.item_id, v.name, v.price_adjustment, v.stock_quantity
            FROM catalog_variants v
            JOIN catalog_items i ON i.id = v.item_id
            WHERE v.id = ?1 AND i.department_id = ?2
            "#,
        )
        .bind(variant_id)
        .bind(department_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Variant::from))
    }

    /// All active items of a department, ordered by name, with variants.
    pub async fn list_by_department(&self, department_id: &str) -> DbResult<Vec<CatalogItem>> {
        let rows: Vec<CatalogItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM catalog_items WHERE department_id = ?1 AND is_active = 1 ORDER BY name",
            ITEM_COLUMNS
        ))
        .bind(department_id)
        .fetch_all(&self.pool)
        .await?;

        let variant_rows: Vec<VariantRow> = sqlx::query_as(
            r#"
            SELECT v.id, v.item_id, v.name, v.price_adjustment, v.stock_quantity
            FROM catalog_variants v
            JOIN catalog_items i ON i.id = v.item_id
            WHERE i.department_id = ?1 AND i.is_active = 1
            ORDER BY v.name
            "#,
        )
        .bind(department_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_item: HashMap<String, Vec<Variant>> = HashMap::new();
        for row in variant_rows {
            by_item.entry(row.item_id.clone()).or_default().push(row.into());
        }

        debug!(department_id, items = rows.len(), "Loaded department catalog");

        Ok(rows
            .into_iter()
            .map(|row| {
                let variants = by_item.remove(&row.id).unwrap_or_default();
                row.into_item(variants)
            })
            .collect())
    }

    // -------------------------------------------------------------------------
    // Seed / back-office writes
    // -------------------------------------------------------------------------

    /// Inserts an item together with its variants.
    pub async fn insert_item(&self, item: &CatalogItem) -> DbResult<()> {
        debug!(id = %item.id, name = %item.name, "Inserting catalog item");
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let volume = item.volume.as_ref();
        sqlx::query(
            r#"
            INSERT INTO catalog_items (
                id, department_id, name, kind, base_price,
                retail_price, wholesale_price, individual_price,
                volume_unit, volume_retail_per_unit, volume_wholesale_per_unit,
                allow_custom_price, min_price, max_price,
                stock_quantity, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
            "#,
        )
        .bind(&item.id)
        .bind(&item.department_id)
        .bind(&item.name)
        .bind(item.kind)
        .bind(item.base_price.minor())
        .bind(item.tier_prices.retail.minor())
        .bind(item.tier_prices.wholesale.minor())
        .bind(item.tier_prices.individual.minor())
        .bind(volume.map(|v| v.unit_label.clone()))
        .bind(volume.map(|v| v.retail_per_unit.minor()).unwrap_or(0))
        .bind(volume.map(|v| v.wholesale_per_unit.minor()).unwrap_or(0))
        .bind(item.price_policy.allow_custom_price)
        .bind(item.price_policy.min_price.map(|m| m.minor()))
        .bind(item.price_policy.max_price.map(|m| m.minor()))
        .bind(item.stock_quantity)
        .bind(item.is_active)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for variant in &item.variants {
            insert_variant(&mut tx, variant).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Adds a variant to an existing item.
    pub async fn insert_variant(&self, variant: &Variant) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_variant(&mut conn, variant).await
    }

    /// Adds stock to an item or variant (goods received). Not used by sales.
    pub async fn restock(&self, department_id: &str, target: &kasa_core::StockTarget, quantity: i64) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        let rows = crate::repository::stock::increment(&mut conn, department_id, target, quantity).await?;
        if rows == 0 {
            return Err(DbError::not_found("Stock target", target.id()));
        }
        Ok(())
    }
}

async fn insert_variant(conn: &mut sqlx::SqliteConnection, variant: &Variant) -> DbResult<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO catalog_variants (id, item_id, name, price_adjustment, stock_quantity, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        "#,
    )
    .bind(&variant.id)
    .bind(&variant.item_id)
    .bind(&variant.name)
    .bind(variant.price_adjustment.minor())
    .bind(variant.stock_quantity)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
