//! # Department Directory
//!
//! Resolves which department an engine instance works for. The id is an
//! opaque key; the engine never interprets it.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentContext {
    pub department_id: String,
    pub department_name: String,
}

/// Source of the active department.
pub trait DepartmentDirectory: Send + Sync {
    fn active_department(&self) -> EngineResult<DepartmentContext>;
}

/// Directory with one fixed department, usually taken from configuration.
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    context: DepartmentContext,
}

impl StaticDirectory {
    pub fn new(department_id: impl Into<String>, department_name: impl Into<String>) -> Self {
        StaticDirectory {
            context: DepartmentContext {
                department_id: department_id.into(),
                department_name: department_name.into(),
            },
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        StaticDirectory::new(config.department.id.clone(), config.department.name.clone())
    }
}

impl DepartmentDirectory for StaticDirectory {
    fn active_department(&self) -> EngineResult<DepartmentContext> {
        if self.context.department_id.trim().is_empty() {
            return Err(EngineError::Department("department id is empty".to_string()));
        }
        Ok(self.context.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_directory() {
        let dir = StaticDirectory::new("fuel-bay", "Fuel Bay");
        assert_eq!(dir.active_department().unwrap().department_id, "fuel-bay");

        let empty = StaticDirectory::new(" ", "Nowhere");
        assert!(empty.active_department().is_err());
    }
}
