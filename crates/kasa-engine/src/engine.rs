//! # Engine
//!
//! One engine instance serves one terminal of one department.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Startup                                    │
//! │                                                                         │
//! │  1. Resolve Department ───────────────────────────────────────────────► │
//! │     • DepartmentDirectory::active_department()                          │
//! │                                                                         │
//! │  2. Connect to Database ──────────────────────────────────────────────► │
//! │     • SQLite with WAL mode, pending migrations applied                  │
//! │                                                                         │
//! │  3. Restore Cart Session ─────────────────────────────────────────────► │
//! │     • tabs + parked carts saved for (department, terminal)              │
//! │     • tabs whose cart already has a sale get a fresh cart               │
//! │     • fresh single-tab session if nothing was saved                     │
//! │                                                                         │
//! │  4. Wire Collaborators ───────────────────────────────────────────────► │
//! │     • payment gateway adapter, confirmation gate, event bus             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use kasa_core::{BusinessInfo, CartSessionManager, CatalogItem, CoreError, Sale};
use kasa_db::{Database, DbError};

use crate::config::EngineConfig;
use crate::directory::{DepartmentContext, DepartmentDirectory};
use crate::error::EngineResult;
use crate::events::{EventBus, Invalidation};
use crate::gate::PaymentConfirmationGate;
use crate::gateway::PaymentGateway;
use crate::state::SessionState;

pub struct Engine {
    pub(crate) db: Database,
    pub(crate) config: EngineConfig,
    pub(crate) department: DepartmentContext,
    pub(crate) business: BusinessInfo,
    pub(crate) sessions: SessionState,
    pub(crate) gate: PaymentConfirmationGate,
    pub(crate) gateway: Arc<dyn PaymentGateway>,
    pub(crate) events: EventBus,
    /// Serializes snapshot writes so the newest snapshot always lands last.
    persist_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("department", &self.department)
            .field("terminal_id", &self.config.terminal.id)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Opens the configured database and starts the engine.
    pub async fn start(
        config: EngineConfig,
        directory: &dyn DepartmentDirectory,
        gateway: Arc<dyn PaymentGateway>,
    ) -> EngineResult<Engine> {
        let db = Database::new(config.db_config()?).await?;
        Engine::with_database(db, config, directory, gateway).await
    }

    /// Starts the engine on an already-open database.
    pub async fn with_database(
        db: Database,
        config: EngineConfig,
        directory: &dyn DepartmentDirectory,
        gateway: Arc<dyn PaymentGateway>,
    ) -> EngineResult<Engine> {
        let department = directory.active_department()?;
        info!(
            department_id = %department.department_id,
            terminal_id = %config.terminal.id,
            "Starting transaction engine"
        );

        let mut manager = match db
            .sessions()
            .load(&department.department_id, &config.terminal.id)
            .await?
        {
            Some(snapshot) => {
                debug!(tabs = snapshot.tabs.len(), parked = snapshot.parked.len(), "Restoring cart session");
                CartSessionManager::restore(snapshot)
            }
            None => CartSessionManager::new(),
        };

        let mut settled = 0;
        for cart_id in manager.open_cart_ids() {
            if let Some(sale) = db.sales().find_by_cart(&department.department_id, &cart_id).await? {
                warn!(
                    cart_id = %cart_id,
                    sale_id = %sale.id,
                    receipt_number = %sale.receipt_number,
                    "Restored tab holds an already sold cart, clearing it"
                );
                settled += usize::from(manager.settle_sold_cart(&cart_id));
            }
        }

        let mut business = config.business_info();
        business.department_name = department.department_name.clone();

        let engine = Engine {
            gate: PaymentConfirmationGate::new(config.confirmation_timeout()),
            sessions: SessionState::new(manager),
            events: EventBus::new(),
            persist_lock: tokio::sync::Mutex::new(()),
            business,
            department,
            gateway,
            config,
            db,
        };
        if settled > 0 {
            engine.persist_sessions().await?;
        }
        Ok(engine)
    }

    pub fn department_id(&self) -> &str {
        &self.department.department_id
    }

    pub fn terminal_id(&self) -> &str {
        &self.config.terminal.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Receives invalidation signals for read-side views.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Invalidation> {
        self.events.subscribe()
    }

    /// Active catalog of the department.
    pub async fn list_catalog(&self) -> EngineResult<Vec<CatalogItem>> {
        Ok(self.db.catalog().list_by_department(self.department_id()).await?)
    }

    pub(crate) async fn require_item(&self, item_id: &str) -> EngineResult<CatalogItem> {
        self.db
            .catalog()
            .get_item(self.department_id(), item_id)
            .await?
            .filter(|item| item.is_active)
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()).into())
    }

    pub(crate) async fn require_sale(&self, sale_id: &str) -> EngineResult<Sale> {
        match self.db.sales().require(self.department_id(), sale_id).await {
            Ok(sale) => Ok(sale),
            Err(DbError::NotFound { .. }) => Err(CoreError::SaleNotFound(sale_id.to_string()).into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the current session snapshot for this terminal.
    pub(crate) async fn persist_sessions(&self) -> EngineResult<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.sessions.with(|s| s.snapshot());
        self.db
            .sessions()
            .save(self.department_id(), self.terminal_id(), &snapshot)
            .await?;
        Ok(())
    }

    /// Closes the database pool.
    pub async fn shutdown(&self) {
        info!("Shutting down transaction engine");
        self.db.close().await;
    }
}
