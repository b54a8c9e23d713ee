//! # Session Repository
//!
//! Persists each terminal's order tabs and parked carts as one JSON
//! snapshot, so a restart brings the cashier back to where they were.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use kasa_core::SessionSnapshot;

#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Replaces the stored snapshot for a terminal.
    pub async fn save(&self, department_id: &str, terminal_id: &str, snapshot: &SessionSnapshot) -> DbResult<()> {
        let json = serde_json::to_string(snapshot)?;
        debug!(department_id, terminal_id, tabs = snapshot.tabs.len(), "Saving cart session");

        sqlx::query(
            r#"
            INSERT INTO cart_sessions (department_id, terminal_id, snapshot, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (department_id, terminal_id)
            DO UPDATE SET snapshot = excluded.snapshot, updated_at = excluded.updated_at
            "#,
        )
        .bind(department_id)
        .bind(terminal_id)
        .bind(json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Loads the stored snapshot, if the terminal has one.
    pub async fn load(&self, department_id: &str, terminal_id: &str) -> DbResult<Option<SessionSnapshot>> {
        let json: Option<String> = sqlx::query_scalar(
            "SELECT snapshot FROM cart_sessions WHERE department_id = ?1 AND terminal_id = ?2",
        )
        .bind(department_id)
        .bind(terminal_id)
        .fetch_optional(&self.pool)
        .await?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use kasa_core::{CartSessionManager, CatalogItem, ItemKind, Money};

    #[tokio::test]
    async fn test_save_and_load_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.sessions().load("dept-a", "till-1").await.unwrap().is_none());

        let item = CatalogItem::new("dept-a", "Haircut", ItemKind::Service, Money::from_minor(800));
        let mut sessions = CartSessionManager::new();
        sessions.active_cart_mut().unwrap().add_item(&item, None, 1, None, None).unwrap();
        sessions.park(Some("customer went to ATM")).unwrap();
        sessions.new_tab();

        db.sessions().save("dept-a", "till-1", &sessions.snapshot()).await.unwrap();
        db.sessions().save("dept-a", "till-1", &sessions.snapshot()).await.unwrap();

        let loaded = db.sessions().load("dept-a", "till-1").await.unwrap().unwrap();
        assert_eq!(loaded, sessions.snapshot());
        assert_eq!(loaded.parked.len(), 1);
        assert!(db.sessions().load("dept-a", "till-2").await.unwrap().is_none());
    }
}
