//! Shared fixtures for engine tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use kasa_core::{CatalogItem, ItemKind, Money, Variant};
use kasa_db::{Database, DbConfig};

use crate::config::EngineConfig;
use crate::directory::StaticDirectory;
use crate::engine::Engine;
use crate::gateway::{GatewayError, PaymentGateway, PaymentRequest};

pub(crate) const DEPARTMENT: &str = "dept-a";

/// Records every request; fails while `fail_next(true)` is in effect.
#[derive(Debug, Default)]
pub(crate) struct MockGateway {
    requests: Mutex<Vec<PaymentRequest>>,
    failing: AtomicBool,
}

impl MockGateway {
    pub(crate) fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn fail_next(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn request_payment(&self, request: PaymentRequest) -> Result<(), GatewayError> {
        self.requests.lock().unwrap().push(request);
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError("network unreachable".to_string()));
        }
        Ok(())
    }
}

fn directory() -> StaticDirectory {
    StaticDirectory::new(DEPARTMENT, "Department A")
}

async fn start(db: Database, config: EngineConfig, gateway: Arc<MockGateway>) -> Engine {
    Engine::with_database(db, config, &directory(), gateway).await.unwrap()
}

/// Engine on a fresh in-memory database, with default configuration.
pub(crate) async fn engine() -> (Engine, Database) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let engine = start(db.clone(), EngineConfig::default(), Arc::new(MockGateway::default())).await;
    (engine, db)
}

/// Engine with adjusted configuration and access to the mock gateway.
pub(crate) async fn engine_with(configure: impl FnOnce(&mut EngineConfig)) -> (Engine, Arc<MockGateway>) {
    let mut config = EngineConfig::default();
    configure(&mut config);
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let gateway = Arc::new(MockGateway::default());
    let engine = start(db, config, gateway.clone()).await;
    (engine, gateway)
}

/// A second engine on the same database, as after a restart.
pub(crate) async fn restart(db: Database) -> Engine {
    start(db, EngineConfig::default(), Arc::new(MockGateway::default())).await
}

/// Engine for another terminal of the same department.
pub(crate) async fn terminal(db: Database, terminal_id: &str) -> Engine {
    let mut config = EngineConfig::default();
    config.terminal.id = terminal_id.to_string();
    start(db, config, Arc::new(MockGateway::default())).await
}

/// A database file in the temp dir, for tests that need real concurrent
/// connections. The caller removes the file.
pub(crate) async fn file_database() -> (Database, PathBuf) {
    let path = std::env::temp_dir().join(format!("kasa-engine-{}.db", Uuid::new_v4()));
    let db = Database::new(DbConfig::new(&path).max_connections(4)).await.unwrap();
    (db, path)
}

pub(crate) async fn seed_product(engine: &Engine, name: &str, price: i64, stock: i64) -> CatalogItem {
    let mut item = CatalogItem::new(DEPARTMENT, name, ItemKind::Product, Money::from_minor(price));
    item.stock_quantity = Some(stock);
    engine.database().catalog().insert_item(&item).await.unwrap();
    item
}

pub(crate) async fn seed_service(engine: &Engine, name: &str, price: i64) -> CatalogItem {
    let item = CatalogItem::new(DEPARTMENT, name, ItemKind::Service, Money::from_minor(price));
    engine.database().catalog().insert_item(&item).await.unwrap();
    item
}

/// "Shirt" with variants M (stocked) and L (empty).
pub(crate) async fn seed_shirt(engine: &Engine, medium_stock: i64) -> CatalogItem {
    let mut item = CatalogItem::new(DEPARTMENT, "Shirt", ItemKind::Product, Money::from_minor(1500));
    item.stock_quantity = None;
    item.variants = vec![
        Variant::new(item.id.clone(), "M", Money::zero(), medium_stock),
        Variant::new(item.id.clone(), "L", Money::from_minor(200), 0),
    ];
    engine.database().catalog().insert_item(&item).await.unwrap();
    item
}
