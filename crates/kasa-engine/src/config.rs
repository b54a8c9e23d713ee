//! # Engine Configuration
//!
//! Settings loaded once at startup.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`KASA_*`)
//! 2. Config file (`kasa.toml`)
//! 3. Defaults (this file)
//!
//! ## Example File
//! ```toml
//! [department]
//! id = "fuel-bay"
//! name = "Fuel Bay"
//!
//! [business]
//! name = "Kasa Mart"
//! address_lines = ["12 Market Road"]
//! currency_code = "KES"
//!
//! [terminal]
//! id = "till-2"
//!
//! [payments]
//! confirmation_timeout_secs = 90
//!
//! [policy]
//! restock_on_void = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use kasa_core::BusinessInfo;
use kasa_db::DbConfig;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub department: DepartmentConfig,
    pub business: BusinessConfig,
    pub terminal: TerminalConfig,
    pub database: DatabaseConfig,
    pub payments: PaymentsConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepartmentConfig {
    /// Opaque scoping key for every catalog read and sale write.
    pub id: String,
    pub name: String,
}

impl Default for DepartmentConfig {
    fn default() -> Self {
        DepartmentConfig {
            id: "main-store".to_string(),
            name: "Main Store".to_string(),
        }
    }
}

/// Receipt header and footer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessConfig {
    pub name: String,
    pub address_lines: Vec<String>,
    pub phone: Option<String>,
    pub currency_code: String,
    pub footer: Option<String>,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        BusinessConfig {
            name: "Kasa POS Dev Store".to_string(),
            address_lines: Vec::new(),
            phone: None,
            currency_code: "KES".to_string(),
            footer: Some("Thank you for shopping with us".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub id: String,
    pub cashier_label: Option<String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        TerminalConfig {
            id: "till-1".to_string(),
            cashier_label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `None` picks the platform data directory.
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    /// How long to wait for a mobile-money callback before flagging the
    /// sale for manual follow-up.
    pub confirmation_timeout_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        PaymentsConfig {
            confirmation_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Put a voided sale's quantities back into stock.
    pub restock_on_void: bool,
}

impl EngineConfig {
    /// Reads a TOML file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config: EngineConfig =
            toml::from_str(&text).map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = EngineConfig::default();
        config.apply_env();
        config
    }

    /// Writes the configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let text = toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), text)
            .map_err(|e| EngineError::Config(format!("cannot write {}: {}", path.as_ref().display(), e)))
    }

    /// ## Environment Variables
    /// - `KASA_DEPARTMENT_ID`: Override department id
    /// - `KASA_TERMINAL_ID`: Override terminal id
    /// - `KASA_DB_PATH`: Override database file
    /// - `KASA_PAYMENT_TIMEOUT_SECS`: Override confirmation timeout
    /// - `KASA_RESTOCK_ON_VOID`: `true`/`false`
    fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(id) = var("KASA_DEPARTMENT_ID") {
            self.department.id = id;
        }

        if let Some(id) = var("KASA_TERMINAL_ID") {
            self.terminal.id = id;
        }

        if let Some(path) = var("KASA_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(secs) = var("KASA_PAYMENT_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => self.payments.confirmation_timeout_secs = secs,
                Err(_) => tracing::warn!(value = %secs, "Ignoring invalid KASA_PAYMENT_TIMEOUT_SECS"),
            }
        }

        if let Some(flag) = var("KASA_RESTOCK_ON_VOID") {
            match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.policy.restock_on_void = true,
                "0" | "false" | "no" => self.policy.restock_on_void = false,
                _ => tracing::warn!(value = %flag, "Ignoring invalid KASA_RESTOCK_ON_VOID"),
            }
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.payments.confirmation_timeout_secs)
    }

    /// Receipt metadata for the configured department.
    pub fn business_info(&self) -> BusinessInfo {
        BusinessInfo {
            name: self.business.name.clone(),
            department_name: self.department.name.clone(),
            address_lines: self.business.address_lines.clone(),
            phone: self.business.phone.clone(),
            currency_code: self.business.currency_code.clone(),
            footer: self.business.footer.clone(),
        }
    }

    /// Database settings, defaulting the file location to the platform
    /// data directory.
    ///
    /// ## Platform-Specific Paths
    /// - **macOS**: `~/Library/Application Support/com.kasa.pos/kasa.db`
    /// - **Windows**: `%APPDATA%\kasa\pos\data\kasa.db`
    /// - **Linux**: `~/.local/share/pos/kasa.db`
    pub fn db_config(&self) -> EngineResult<DbConfig> {
        let path = match &self.database.path {
            Some(path) => path.clone(),
            None => {
                let dirs = ProjectDirs::from("com", "kasa", "pos")
                    .ok_or_else(|| EngineError::Config("could not determine app data directory".into()))?;
                let data_dir = dirs.data_dir();
                std::fs::create_dir_all(data_dir)
                    .map_err(|e| EngineError::Config(format!("cannot create {}: {}", data_dir.display(), e)))?;
                data_dir.join("kasa.db")
            }
        };
        Ok(DbConfig::new(path).max_connections(self.database.max_connections))
    }
}
