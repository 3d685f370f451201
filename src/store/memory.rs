// ABOUTME: In-memory config store keeping every revision of every key.
// ABOUTME: Used by tests and by embedders that own persistence themselves.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{ConfigStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    entries: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values ever written to `key`, oldest first.
    pub fn history(&self, key: &str) -> Vec<String> {
        self.entries.read().get(key).cloned().unwrap_or_default()
    }

    /// Number of writes `key` has seen.
    pub fn revision(&self, key: &str) -> u64 {
        self.entries.read().get(key).map_or(0, |h| h.len() as u64)
    }

    /// Snapshot of the latest value of every key.
    pub fn latest(&self) -> HashMap<String, String> {
        self.entries
            .read()
            .iter()
            .filter_map(|(k, h)| h.last().map(|v| (k.clone(), v.clone())))
            .collect()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        self.entries
            .read()
            .get(key)
            .and_then(|history| history.last().cloned())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.write();
        let history = entries.entry(key.to_string()).or_default();
        history.push(value.to_string());
        Ok(history.len() as u64)
    }
}
