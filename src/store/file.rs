// ABOUTME: File-backed config store persisting parameters as one JSON document.
// ABOUTME: Reads hit the file every time; writes replace it atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{ConfigStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    value: String,
    revision: u64,
    updated_at: DateTime<Utc>,
}

type Document = BTreeMap<String, Entry>;

/// Config store kept in a JSON file, e.g. `.edgeswap/state/params.json`.
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Document, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(document)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        self.load()
            .await?
            .remove(key)
            .map(|entry| entry.value)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        let revision = document.get(key).map_or(1, |e| e.revision + 1);
        document.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                revision,
                updated_at: Utc::now(),
            },
        );
        self.save(&document).await?;
        tracing::debug!(key, revision, "parameter written");
        Ok(revision)
    }
}
