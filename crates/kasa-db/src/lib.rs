//! # kasa-db: Database Layer for Kasa POS
//!
//! SQLite persistence for the transaction engine: the Catalog Store, the
//! Stock Ledger, sales and cart-session snapshots.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kasa POS Data Flow                               │
//! │                                                                         │
//! │  kasa-engine (complete_sale)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kasa-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ CatalogRepo   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ StockLedger   │    │ init.sql     │  │   │
//! │  │   │ Transactions  │    │ SaleRepo      │    │              │  │   │
//! │  │   │               │    │ SessionRepo   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database shared by every terminal of the store                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kasa_db::{Database, DbConfig, StockLedger};
//!
//! let db = Database::new(DbConfig::new("kasa.db")).await?;
//! let check = db.stock().check_availability("dept-1", &target, 2).await?;
//!
//! let mut tx = db.begin().await?;
//! let outcome = StockLedger::commit_in(&mut tx, "dept-1", &cart.stock_demands()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::catalog::CatalogRepository;
pub use repository::sale::SaleRepository;
pub use repository::session::SessionRepository;
pub use repository::stock::{CommitOutcome, StockLedger};
