use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

/// Fixed key under which the serialized map view is stored.
pub const MAP_CACHE_KEY: &str = "map_data_cache";

/// In-process string-keyed blob store shared by the map cache and the job
/// progress registry.
///
/// A multi-process deployment would swap the interior for an external store
/// with the same get/set/remove surface; every consumer receives this handle
/// by clone, never through a global.
#[derive(Clone, Default)]
pub struct SharedCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl SharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the blob stored under `key`, if any.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    /// Stores `value` under `key`, replacing any previous blob as a single
    /// atomic assignment.
    pub async fn set(&self, key: impl Into<String>, value: String) {
        self.entries.write().await.insert(key.into(), value);
    }

    /// Removes the blob stored under `key`.
    pub async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}
