// ABOUTME: Local state directory shared by every command that touches a service.
// ABOUTME: Opens the params file, edge snapshot, object tree, and run archive.

use edgeswap::config::Config;
use edgeswap::diagnostics::{Diagnostics, Warning};
use edgeswap::distribution::{DistributionManager, MemoryEdge};
use edgeswap::error::{Error, Result};
use edgeswap::objects::FsObjectStore;
use edgeswap::pipeline::RunRegistry;
use edgeswap::store::{FileConfigStore, ParamStore};
use edgeswap::types::DistributionId;
use std::path::PathBuf;
use std::sync::Arc;

const PARAMS_FILE: &str = "params.json";
const EDGE_FILE: &str = "edge.json";
const OBJECTS_DIR: &str = "objects";
const RUNS_DIR: &str = "runs";
const WORK_DIR: &str = "work";

pub struct Workspace {
    pub state_dir: PathBuf,
    pub params: ParamStore,
    pub edge: Arc<MemoryEdge>,
    pub objects: Arc<FsObjectStore>,
}

impl Workspace {
    pub fn open(config: &Config) -> Result<Self> {
        let state_dir = config.state_dir();
        let store = Arc::new(FileConfigStore::new(state_dir.join(PARAMS_FILE)));
        let edge = Arc::new(MemoryEdge::load(&state_dir.join(EDGE_FILE))?);
        let objects = Arc::new(FsObjectStore::new(state_dir.join(OBJECTS_DIR)));

        tracing::debug!(state_dir = %state_dir.display(), "workspace opened");

        Ok(Self {
            params: ParamStore::new(store, config.service.clone()),
            state_dir,
            edge,
            objects,
        })
    }

    pub fn distributions(&self) -> DistributionManager {
        DistributionManager::new(self.edge.clone(), self.objects.clone())
    }

    pub fn registry(&self) -> Result<RunRegistry> {
        Ok(RunRegistry::with_archive(self.state_dir.join(RUNS_DIR))?)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.state_dir.join(WORK_DIR)
    }

    /// Production distribution of a bootstrapped service.
    pub async fn production(&self) -> Result<DistributionId> {
        match self.params.production_distribution_id().await {
            Ok(id) => Ok(id),
            Err(e) if e.is_not_found() => {
                Err(Error::NotBootstrapped(self.params.service().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the edge state, recording a warning instead of failing.
    pub fn save_edge(&self, diag: &mut Diagnostics) {
        let path = self.state_dir.join(EDGE_FILE);
        if let Err(e) = self.edge.save(&path) {
            diag.warn(Warning::edge_snapshot(format!(
                "failed to save edge state: {e}"
            )));
        }
    }
}
