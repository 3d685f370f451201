// ABOUTME: Directory-backed object store used by the CLI.
// ABOUTME: Store paths map onto files below a root directory.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::{ObjectStore, ObjectStoreError, normalize, segments};

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, path: &str) -> Result<PathBuf, ObjectStoreError> {
        let mut file = self.root.clone();
        for segment in segments(path)? {
            file.push(segment);
        }
        Ok(file)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, path: &str, body: Bytes) -> Result<(), ObjectStoreError> {
        normalize(path)?;
        let file = self.file_path(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, &body).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Bytes, ObjectStoreError> {
        let key = normalize(path)?;
        match tokio::fs::read(self.file_path(path)?).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::IsADirectory
                ) =>
            {
                Err(ObjectStoreError::NotFound(key))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, prefix: &str) -> Result<bool, ObjectStoreError> {
        normalize(prefix)?;
        let dir = self.file_path(prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(entries.next_entry().await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn objects_land_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store
            .put("/v1/assets/app.js", Bytes::from_static(b"console.log(1)"))
            .await
            .unwrap();

        assert!(dir.path().join("v1/assets/app.js").is_file());
        assert!(store.exists("/v1/").await.unwrap());
        assert!(!store.exists("/v2/").await.unwrap());
        assert_eq!(
            store.get("/v1/assets/app.js").await.unwrap(),
            Bytes::from_static(b"console.log(1)")
        );
    }

    #[tokio::test]
    async fn directory_is_not_an_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store
            .put("/v1/index.html", Bytes::from_static(b"<html>"))
            .await
            .unwrap();
        assert!(store.get("/v1").await.unwrap_err().is_not_found());
    }
}
