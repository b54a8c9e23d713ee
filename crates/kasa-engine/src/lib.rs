//! # kasa-engine: Transaction Engine for Kasa POS
//!
//! The orchestration layer a till UI (or API) talks to. It owns the
//! terminal's cart session, runs stock-checked cart mutations, finalizes
//! sales and gates mobile-money receipts on the gateway's callback.
//!
//! ## Module Organization
//! ```text
//! kasa_engine/
//! ├── lib.rs          ◄─── You are here (exports & tracing setup)
//! ├── engine.rs       ◄─── Engine struct, startup, shared helpers
//! ├── cart.rs         ◄─── Cart, tab and parked-cart operations
//! ├── finalizer.rs    ◄─── complete_sale, void_sale, receipts
//! ├── gate.rs         ◄─── Payment Confirmation Gate + gateway callback
//! ├── gateway.rs      ◄─── Payment Gateway Adapter trait
//! ├── directory.rs    ◄─── Department Directory
//! ├── events.rs       ◄─── Invalidation signals for read-side views
//! ├── config.rs       ◄─── TOML + environment configuration
//! ├── state/          ◄─── Cart session behind a mutex
//! └── error.rs        ◄─── Engine error with machine-readable codes
//! ```
//!
//! ## Example Usage
//! ```rust,ignore
//! let config = EngineConfig::load("kasa.toml")?;
//! let directory = StaticDirectory::from_config(&config);
//! let engine = Engine::start(config, &directory, Arc::new(MyGateway::new())).await?;
//!
//! engine.add_item(&item_id, None, 2, None).await?;
//! engine.set_payment_method(Some(PaymentMethod::Cash)).await?;
//! let outcome = engine.complete_sale(None).await?;
//! print(outcome.receipt);
//! ```

pub mod cart;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod gate;
pub mod gateway;
pub mod state;

#[cfg(test)]
mod testing;

use tracing_subscriber::EnvFilter;

pub use cart::CartView;
pub use config::EngineConfig;
pub use directory::{DepartmentContext, DepartmentDirectory, StaticDirectory};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ErrorCode, ErrorPayload};
pub use events::{EventBus, Invalidation};
pub use finalizer::SaleOutcome;
pub use gate::{Confirmation, PaymentConfirmationGate, CONFIRMATION_TIMED_OUT};
pub use gateway::{GatewayError, PaymentGateway, PaymentRequest, PaymentResult};

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=kasa_engine=trace` - Show trace for the engine only
/// - Default: INFO, DEBUG for kasa crates
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kasa=debug,sqlx=warn"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
