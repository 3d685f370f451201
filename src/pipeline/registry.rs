// ABOUTME: Registry of pipeline runs with change notification.
// ABOUTME: Archives finished and rolled-back runs as JSON so later processes can inspect and purge them.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

use super::run::{PipelineRun, RunStatus};
use crate::types::{RunId, ServiceName};

#[derive(Debug)]
pub struct RunRegistry {
    runs: RwLock<HashMap<RunId, PipelineRun>>,
    changes: watch::Sender<u64>,
    sequence: AtomicU64,
    archive_dir: Option<PathBuf>,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            changes: watch::Sender::new(0),
            sequence: AtomicU64::new(0),
            archive_dir: None,
        }
    }

    /// Registry that archives terminal runs under `dir` and loads earlier ones.
    pub fn with_archive(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        let mut runs = HashMap::new();

        match std::fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries {
                    let path = entry?.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        match load_run(&path) {
                            Ok(run) => {
                                runs.insert(run.id.clone(), run);
                            }
                            Err(e) => {
                                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable run archive");
                            }
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let loaded = runs.len() as u64;
        Ok(Self {
            runs: RwLock::new(runs),
            sequence: AtomicU64::new(loaded),
            archive_dir: Some(dir),
            ..Self::new()
        })
    }

    /// Fresh run id, e.g. `shop-20260118T101500-3`.
    pub fn next_run_id(&self, service: &ServiceName) -> RunId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        RunId::new(format!("{service}-{stamp}-{seq}"))
    }

    pub fn insert(&self, run: PipelineRun) {
        let archived = run.status.is_terminal().then(|| run.clone());
        self.runs.write().insert(run.id.clone(), run);
        if let Some(run) = archived {
            self.archive(&run);
        }
        self.changes.send_modify(|n| *n += 1);
    }

    /// Apply `change` to a run. Returns the updated run, or `None` if unknown.
    pub fn update(
        &self,
        run_id: &RunId,
        change: impl FnOnce(&mut PipelineRun),
    ) -> Option<PipelineRun> {
        let updated = {
            let mut runs = self.runs.write();
            let run = runs.get_mut(run_id)?;
            change(run);
            run.clone()
        };
        // Rolled-back runs are archived too so a later process can redeliver the purge.
        if updated.status.is_terminal() || updated.awaits_purge() {
            self.archive(&updated);
        }
        self.changes.send_modify(|n| *n += 1);
        Some(updated)
    }

    pub fn get(&self, run_id: &RunId) -> Option<PipelineRun> {
        self.runs.read().get(run_id).cloned()
    }

    /// Runs of `service`, oldest first.
    pub fn list(&self, service: &ServiceName) -> Vec<PipelineRun> {
        let mut runs: Vec<_> = self
            .runs
            .read()
            .values()
            .filter(|r| &r.service == service)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        runs
    }

    /// Runs of `service` still in `running`.
    pub fn running(&self, service: &ServiceName) -> Vec<PipelineRun> {
        self.list(service)
            .into_iter()
            .filter(|r| r.status == RunStatus::Running)
            .collect()
    }

    /// Wait until the run reaches a terminal status.
    pub async fn wait_terminal(&self, run_id: &RunId) -> Option<PipelineRun> {
        let mut rx = self.changes.subscribe();
        loop {
            match self.get(run_id) {
                Some(run) if run.status.is_terminal() => return Some(run),
                Some(_) => {}
                None => return None,
            }
            // The sender lives in self, so this only fails if self is gone.
            if rx.changed().await.is_err() {
                return self.get(run_id);
            }
        }
    }

    fn archive(&self, run: &PipelineRun) {
        let Some(dir) = &self.archive_dir else {
            return;
        };
        if let Err(e) = save_run(dir, run) {
            tracing::warn!(run_id = %run.id, error = %e, "failed to archive run");
        }
    }
}

fn load_run(path: &Path) -> std::io::Result<PipelineRun> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(std::io::Error::other)
}

fn save_run(dir: &Path, run: &PipelineRun) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", run.id));
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(run).map_err(std::io::Error::other)?;
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)
}
