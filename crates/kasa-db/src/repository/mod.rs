//! # Repository Module
//!
//! Database repository implementations for Kasa POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Engine                                                                │
//! │       │                                                                 │
//! │       │  db.stock().check_availability(dept, &target, 3)               │
//! │       ▼                                                                 │
//! │  StockLedger / CatalogRepository / SaleRepository / SessionRepository  │
//! │       │                                                                 │
//! │       │  SQL, always filtered by department_id                         │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Methods ending in `_in` take `&mut SqliteConnection` and run inside   │
//! │  a transaction the caller owns (`db.begin()`), so the stock commit,    │
//! │  the receipt number and the sale insert succeed or fail together.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`catalog::CatalogRepository`] - Department catalog reads
//! - [`stock::StockLedger`] - Availability checks and atomic decrements
//! - [`sale::SaleRepository`] - Sales, lines, receipt numbering
//! - [`session::SessionRepository`] - Per-terminal cart sessions

pub mod catalog;
pub mod sale;
pub mod session;
pub mod stock;
