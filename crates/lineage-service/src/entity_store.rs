use lineage_core::{EntityKey, Payload};
use lineage_storage::{KVStore, KeyEncoder, Result, StorageError};
use std::sync::Arc;
use tracing::debug;

/// Persistence of the materialized current state
///
/// The façade keeps this view in sync with the head snapshot's payload
/// after every successful mutation, so readers that only care about "what
/// is the entity now" never walk the version graph.
pub trait EntityStore: Send + Sync {
    /// Load the current payload, if the entity has one
    fn load(&self, entity: &EntityKey) -> Result<Option<Payload>>;

    /// Save the current payload
    fn save(&self, entity: &EntityKey, payload: &Payload) -> Result<()>;
}

/// EntityStore backed by the same KV storage as the version graph
pub struct KvEntityStore {
    storage: Arc<dyn KVStore>,
}

impl KvEntityStore {
    /// Create a KvEntityStore over a storage backend
    pub fn new(storage: Arc<dyn KVStore>) -> Self {
        Self { storage }
    }
}

impl EntityStore for KvEntityStore {
    fn load(&self, entity: &EntityKey) -> Result<Option<Payload>> {
        let key = KeyEncoder::state_key(entity);
        match self.storage.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(StorageError::from)?,
            )),
            None => Ok(None),
        }
    }

    fn save(&self, entity: &EntityKey, payload: &Payload) -> Result<()> {
        debug!("Materializing current state of {}", entity);
        let key = KeyEncoder::state_key(entity);
        let bytes = serde_json::to_vec(payload).map_err(StorageError::from)?;
        self.storage.put(key.as_bytes(), &bytes)
    }
}
