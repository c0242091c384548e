//! Circuit State Store
//!
//! Persistence seam for the circuit breaker. Implementations must return a
//! fresh CLOSED record for unknown models and upsert on put.

pub mod database;
pub mod memory;

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::resilience::CircuitRecord;
use crate::types::Result;

pub use database::{Database, PoolConfig, SharedDatabase};
pub use memory::InMemoryCircuitStore;

/// Durable per-model circuit state
pub trait CircuitStateStore: Send + Sync {
    /// Record for `model_id`, CLOSED with no failures if never written
    fn get_state(&self, model_id: &str) -> Result<CircuitRecord>;

    /// Insert or replace the record for `record.model_id`
    fn put_state(&self, record: &CircuitRecord) -> Result<()>;

    /// Every stored record, ordered by model id
    fn list_states(&self) -> Result<Vec<CircuitRecord>>;
}

pub type SharedCircuitStore = Arc<dyn CircuitStateStore>;

/// Open the store selected by configuration
pub fn open_store(config: &StorageConfig) -> Result<SharedCircuitStore> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryCircuitStore::new())),
        StorageBackend::Sqlite => {
            let path = config.database_path();
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let db = Database::open(&path)?;
            db.initialize()?;
            tracing::debug!(path = %path.display(), "Opened circuit state database");
            Ok(Arc::new(db))
        }
    }
}
