// ABOUTME: Publishes a built artifact directory under its version prefix.
// ABOUTME: Uploads run concurrently with a small fan-out.

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};

use super::{ObjectStore, ObjectStoreError};
use crate::types::Version;

const UPLOAD_CONCURRENCY: usize = 8;

/// Summary of one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub prefix: String,
    pub objects: usize,
    pub bytes: u64,
}

/// Upload every file below `dir` to `/{version}/{relative path}`.
pub async fn publish_artifact(
    objects: &dyn ObjectStore,
    version: &Version,
    dir: &Path,
) -> Result<PublishReport, ObjectStoreError> {
    let files = collect_files(dir).await?;
    let prefix = version.object_prefix();

    let sizes: Vec<u64> = stream::iter(files)
        .map(|relative| {
            let source = dir.join(&relative);
            let target = format!("{prefix}{}", to_store_path(&relative));
            async move {
                let body = tokio::fs::read(&source).await?;
                let len = body.len() as u64;
                objects.put(&target, Bytes::from(body)).await?;
                Ok::<_, ObjectStoreError>(len)
            }
        })
        .buffer_unordered(UPLOAD_CONCURRENCY)
        .try_collect()
        .await?;

    tracing::debug!(version = %version, objects = sizes.len(), "artifact published");

    Ok(PublishReport {
        prefix,
        objects: sizes.len(),
        bytes: sizes.iter().sum(),
    })
}

fn to_store_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Relative paths of all regular files below `root`.
pub(crate) async fn collect_files(root: &Path) -> Result<Vec<PathBuf>, ObjectStoreError> {
    let mut files = Vec::new();
    let mut pending = vec![PathBuf::new()];

    while let Some(relative) = pending.pop() {
        let mut entries = tokio::fs::read_dir(root.join(&relative)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let child = relative.join(entry.file_name());
            if file_type.is_dir() {
                pending.push(child);
            } else if file_type.is_file() {
                files.push(child);
            }
        }
    }

    files.sort();
    Ok(files)
}
