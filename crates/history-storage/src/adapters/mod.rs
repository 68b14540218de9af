//! # Adapters Layer
//!
//! Storage backends and the default hasher and clock.

pub mod memory;
pub mod mongo;
pub mod mysql;
pub mod system;

pub use memory::InMemoryHistoryStore;
pub use mongo::MongoHistoryStore;
pub use mysql::MySqlHistoryStore;
pub use system::{Sha256TxHasher, SystemClock};

use std::sync::Arc;

use crate::config::{BackendKind, HistoryDbConfig};
use crate::domain::StorageError;
use crate::ports::HistoryStorage;

/// Open the backend selected by `config`.
///
/// Returns `Ok(None)` when the configuration leaves the replica disabled.
pub async fn open_history_storage(
    config: &HistoryDbConfig,
) -> Result<Option<Arc<dyn HistoryStorage>>, StorageError> {
    let kind = config
        .backend()
        .map_err(|e| StorageError::Config(e.to_string()))?;

    let storage: Arc<dyn HistoryStorage> = match kind {
        None => return Ok(None),
        Some(BackendKind::MySql) => {
            Arc::new(MySqlHistoryStore::connect(&config.host, &config.name).await?)
        }
        Some(BackendKind::MongoDb) => {
            Arc::new(MongoHistoryStore::connect(&config.host, &config.name).await?)
        }
    };
    Ok(Some(storage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_config_opens_nothing() {
        let opened = open_history_storage(&HistoryDbConfig::default()).await.unwrap();
        assert!(opened.is_none());
    }

    #[tokio::test]
    async fn test_unknown_backend_is_config_error() {
        let config = HistoryDbConfig::new("sqlite", "file.db", "history");
        assert!(matches!(
            open_history_storage(&config).await,
            Err(StorageError::Config(_))
        ));
    }
}
