//! # Seed Data Generator
//!
//! Populates a department catalog with development data.
//!
//! ## Usage
//! ```bash
//! # Seed the default department into ./kasa_dev.db
//! cargo run -p kasa-db --bin seed
//!
//! # Seed another department
//! cargo run -p kasa-db --bin seed -- --department fuel-bay
//!
//! # Specify database path
//! cargo run -p kasa-db --bin seed -- --db ./data/kasa.db
//! ```
//!
//! ## Generated Items
//! - Plain products with unit stock
//! - Products with variants (stock lives on the variants)
//! - Volume-tracked products (stock in millilitres)
//! - Services and data packages (not stock-tracked)

use std::env;

use kasa_core::{CatalogItem, CustomPricePolicy, ItemKind, Money, TierPrices, Variant, VolumePricing};
use kasa_db::{Database, DbConfig};

/// (name, price, wholesale price, stock)
const PRODUCTS: &[(&str, i64, i64, i64)] = &[
    ("Sugar 1kg", 250, 220, 120),
    ("Rice 5kg", 1200, 1100, 40),
    ("Cooking Oil 1L", 480, 450, 60),
    ("Bread Loaf", 150, 0, 30),
    ("Bottled Water 500ml", 60, 50, 240),
    ("Soap Bar", 90, 80, 100),
];

/// (name, base price, [(variant, adjustment, stock)])
const VARIANT_PRODUCTS: &[(&str, i64, &[(&str, i64, i64)])] = &[
    ("T-Shirt", 2000, &[("S", 0, 6), ("M", 0, 10), ("L", 0, 8), ("XL", 200, 3)]),
    ("Sandals", 3500, &[("40", 0, 4), ("42", 0, 5), ("44", 300, 2)]),
];

/// (name, unit, retail per unit, wholesale per unit, stock)
const VOLUME_PRODUCTS: &[(&str, &str, i64, i64, i64)] = &[
    ("Diesel", "ml", 2, 0, 150_000),
    ("Kerosene", "ml", 1, 1, 80_000),
];

const SERVICES: &[(&str, i64)] = &[("Phone Repair", 1500), ("Printing (page)", 10), ("Haircut", 800)];

const DATA_PACKAGES: &[(&str, i64)] = &[("Daily 1GB", 100), ("Weekly 5GB", 450), ("Monthly 20GB", 1500)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./kasa_dev.db");
    let mut department = String::from("main-store");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--department" | "-D" => {
                if i + 1 < args.len() {
                    department = args[i + 1].clone();
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kasa POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -D, --department <ID>  Department to seed (default: main-store)");
                println!("  -d, --db <PATH>        Database file path (default: ./kasa_dev.db)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Kasa POS Seed Data Generator");
    println!("============================");
    println!("Database:   {}", db_path);
    println!("Department: {}", department);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database, migrations applied");

    let existing = db.catalog().list_by_department(&department).await?;
    if !existing.is_empty() {
        println!("⚠ Department already has {} items", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let mut items = Vec::new();

    for (name, price, wholesale, stock) in PRODUCTS {
        let mut item = CatalogItem::new(&department, *name, ItemKind::Product, Money::from_minor(*price));
        item.tier_prices = TierPrices {
            retail: Money::from_minor(*price),
            wholesale: Money::from_minor(*wholesale),
            individual: Money::zero(),
        };
        item.stock_quantity = Some(*stock);
        items.push(item);
    }

    for (name, price, variants) in VARIANT_PRODUCTS {
        let mut item = CatalogItem::new(&department, *name, ItemKind::Product, Money::from_minor(*price));
        item.stock_quantity = None;
        item.price_policy = CustomPricePolicy {
            allow_custom_price: true,
            min_price: Some(Money::from_minor(price * 80 / 100)),
            max_price: None,
        };
        for (variant, adjustment, stock) in variants.iter() {
            item.variants
                .push(Variant::new(item.id.clone(), *variant, Money::from_minor(*adjustment), *stock));
        }
        items.push(item);
    }

    for (name, unit, retail, wholesale, stock) in VOLUME_PRODUCTS {
        let mut item = CatalogItem::new(&department, *name, ItemKind::Product, Money::zero());
        item.volume = Some(VolumePricing {
            unit_label: unit.to_string(),
            retail_per_unit: Money::from_minor(*retail),
            wholesale_per_unit: Money::from_minor(*wholesale),
        });
        item.stock_quantity = Some(*stock);
        items.push(item);
    }

    for (name, price) in SERVICES {
        items.push(CatalogItem::new(&department, *name, ItemKind::Service, Money::from_minor(*price)));
    }

    for (name, price) in DATA_PACKAGES {
        items.push(CatalogItem::new(&department, *name, ItemKind::DataPackage, Money::from_minor(*price)));
    }

    let mut generated = 0;
    for item in &items {
        if let Err(e) = db.catalog().insert_item(item).await {
            eprintln!("Failed to insert {}: {}", item.name, e);
            continue;
        }
        generated += 1;
    }

    println!("✓ Inserted {} catalog items", generated);
    println!("✓ Seed complete!");

    Ok(())
}
