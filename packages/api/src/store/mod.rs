//! Commission store backends
//!
//! ```bash
//! COMMISSION_STORE_BACKEND=postgres  # postgres (default), memory
//! DATABASE_URL=postgres://...
//! ```

mod postgres;

pub use postgres::PostgresCommissionStore;

use matrix_commission::{CommissionStore, InMemoryCommissionStore, RuleSetConfig, StoreError};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Backend type for commission storage
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn from_env() -> Self {
        match std::env::var("COMMISSION_STORE_BACKEND")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "memory" | "in-memory" => Self::Memory,
            _ => Self::Postgres,
        }
    }
}

/// Configuration for creating commission stores
#[derive(Default)]
pub struct StoreConfig {
    pub db: Option<Arc<DatabaseConnection>>,
    pub rule_set: Option<RuleSetConfig>,
}

impl StoreConfig {
    pub fn with_db(mut self, db: Arc<DatabaseConnection>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_rule_set(mut self, rule_set: Option<RuleSetConfig>) -> Self {
        self.rule_set = rule_set;
        self
    }
}

/// Create a commission store for the selected backend
pub fn create_store(
    backend: StoreBackend,
    config: StoreConfig,
) -> Result<Arc<dyn CommissionStore>, StoreError> {
    match backend {
        StoreBackend::Postgres => {
            let db = config.db.ok_or_else(|| {
                StoreError::Configuration(
                    "Database connection required for Postgres backend".into(),
                )
            })?;
            Ok(Arc::new(
                PostgresCommissionStore::new(db).with_fallback_rule_set(config.rule_set),
            ))
        }
        StoreBackend::Memory => {
            let store = InMemoryCommissionStore::new();
            if let Some(rule_set) = config.rule_set {
                store.set_rule_set(rule_set);
            }
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_backend_requires_connection() {
        let err = create_store(StoreBackend::Postgres, StoreConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn memory_backend_needs_no_connection() {
        let store = create_store(StoreBackend::Memory, StoreConfig::default()).unwrap();
        assert_eq!(store.backend_name(), "memory");
    }
}
