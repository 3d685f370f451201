// ABOUTME: In-memory object store for tests and the local edge simulator.
// ABOUTME: Objects are kept in a sorted map so prefix checks are range scans.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{ObjectStore, ObjectStoreError, normalize};

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths of every stored object, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, path: &str, body: Bytes) -> Result<(), ObjectStoreError> {
        let path = normalize(path)?;
        self.objects.write().insert(path, body);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Bytes, ObjectStoreError> {
        let path = normalize(path)?;
        self.objects
            .read()
            .get(&path)
            .cloned()
            .ok_or(ObjectStoreError::NotFound(path))
    }

    async fn exists(&self, prefix: &str) -> Result<bool, ObjectStoreError> {
        let prefix = format!("{}/", normalize(prefix)?);
        Ok(self
            .objects
            .read()
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(path, _)| path.starts_with(&prefix)))
    }
}
