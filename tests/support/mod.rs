// ABOUTME: Test support utilities.
// ABOUTME: Provides a scripted stage agent and an in-memory pipeline harness.

// Each test binary only uses part of this module.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use edgeswap::agent::{AgentError, AgentOutcome, StageAgent, StageEnv, Step, vars};
use edgeswap::approval::{ApprovalGateway, ApprovalPrompt, MemoryNotifier};
use edgeswap::distribution::{DistributionManager, EdgeOps, MemoryEdge, SERVED_BY_HEADER, serve};
use edgeswap::events::{Decision, SourceChange};
use edgeswap::objects::{MemoryObjectStore, ObjectStore};
use edgeswap::pipeline::{
    Orchestrator, PipelineContext, PipelineSettings, RunRegistry, SourceFilter, SourceOutcome,
};
use edgeswap::purge::PurgeController;
use edgeswap::store::{DeploymentParams, MemoryConfigStore, ParamStore};
use edgeswap::types::{DistributionId, HeaderPredicate, ServiceName, Version};
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use nonempty::nonempty;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const SERVICE: &str = "shop";
pub const REPOSITORY: &str = "acme/shop";
pub const BRANCH: &str = "main";
pub const CONSOLE_URL: &str = "https://console.example.com/distributions/";
pub const STAGING_HEADER: (&str, &str) = ("aws-cf-cd-staging", "true");

const WAIT: Duration = Duration::from_secs(10);

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("edgeswap=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Stage agent that builds a two-file site named after the commit.
pub struct FakeAgent {
    dir: tempfile::TempDir,
    calls: Mutex<Vec<(Step, StageEnv)>>,
    fail_build: Mutex<Option<i32>>,
    empty_build: Mutex<bool>,
    version: Mutex<Option<String>>,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            calls: Mutex::new(Vec::new()),
            fail_build: Mutex::new(None),
            empty_build: Mutex::new(false),
            version: Mutex::new(None),
        }
    }

    /// Make the next build exit with `code`.
    pub fn fail_next_build(&self, code: i32) {
        *self.fail_build.lock() = Some(code);
    }

    /// Make the next build succeed without writing any files.
    pub fn empty_next_build(&self) {
        *self.empty_build.lock() = true;
    }

    /// Make the next build report `version` instead of using the commit.
    pub fn report_version(&self, version: &str) {
        *self.version.lock() = Some(version.to_string());
    }

    pub fn calls(&self) -> Vec<(Step, StageEnv)> {
        self.calls.lock().clone()
    }

    pub fn steps(&self) -> Vec<Step> {
        self.calls.lock().iter().map(|(step, _)| *step).collect()
    }

    fn build(&self, env: &StageEnv) -> Result<AgentOutcome, AgentError> {
        if let Some(code) = self.fail_build.lock().take() {
            return Ok(AgentOutcome {
                exit_code: code,
                stderr: "build broke".to_string(),
                ..AgentOutcome::default()
            });
        }

        let run = env.get(vars::RUN_ID).unwrap_or("adhoc");
        let commit = env.get(vars::COMMIT).unwrap_or("unknown");
        let out = self.dir.path().join(run);
        if std::mem::take(&mut *self.empty_build.lock()) {
            std::fs::create_dir_all(&out)?;
            return Ok(AgentOutcome {
                artifact: Some(out),
                ..AgentOutcome::default()
            });
        }
        std::fs::create_dir_all(out.join("assets"))?;
        std::fs::write(out.join("index.html"), format!("<h1>{commit}</h1>"))?;
        std::fs::write(out.join("assets/app.js"), "console.log('app');")?;

        let mut outputs = BTreeMap::new();
        if let Some(version) = self.version.lock().take() {
            outputs.insert("version".to_string(), version);
        }
        Ok(AgentOutcome {
            artifact: Some(out),
            outputs,
            ..AgentOutcome::default()
        })
    }
}

#[async_trait]
impl StageAgent for FakeAgent {
    async fn run(&self, step: Step, env: &StageEnv) -> Result<AgentOutcome, AgentError> {
        self.calls.lock().push((step, env.clone()));
        match step {
            Step::Build => self.build(env),
            Step::Source | Step::Deploy => Ok(AgentOutcome::skipped()),
        }
    }
}

/// Builder for [`Harness`].
pub struct HarnessBuilder {
    cleanup: bool,
    approval_timeout: Option<Duration>,
    deploy_attempts: u32,
}

impl HarnessBuilder {
    pub fn cleanup(mut self, enabled: bool) -> Self {
        self.cleanup = enabled;
        self
    }

    pub fn approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = Some(timeout);
        self
    }

    pub fn deploy_attempts(mut self, attempts: u32) -> Self {
        self.deploy_attempts = attempts;
        self
    }

    pub async fn build(self) -> Harness {
        init_tracing();
        let service = ServiceName::new(SERVICE).unwrap();
        let v1 = Version::new("v1").unwrap();

        let edge = Arc::new(MemoryEdge::new());
        let production = edge.provision_production(&v1, "shop production").id;

        let objects = Arc::new(MemoryObjectStore::new());
        objects
            .put("/v1/index.html", Bytes::from_static(b"<h1>v1</h1>"))
            .await
            .unwrap();

        let store = Arc::new(MemoryConfigStore::new());
        let params = ParamStore::new(store.clone(), service.clone());
        params
            .seed(&DeploymentParams {
                frontend_version: v1,
                production_distribution_id: production.clone(),
                staging_distribution_id: None,
                staging_cleanup_enabled: self.cleanup,
                single_header_predicate: HeaderPredicate::default(),
            })
            .await
            .unwrap();

        let notifier = Arc::new(MemoryNotifier::new());
        let gateway = ApprovalGateway::new(
            notifier.clone(),
            CONSOLE_URL,
            nonempty!["qa@example.com".to_string()],
        )
        .with_timeout(self.approval_timeout);

        let agent = Arc::new(FakeAgent::new());
        let distributions = DistributionManager::new(edge.clone(), objects.clone());
        let ctx = Arc::new(PipelineContext {
            service,
            params: params.clone(),
            distributions: distributions.clone(),
            agent: agent.clone(),
            gateway,
            settings: PipelineSettings {
                deploy_attempts: self.deploy_attempts,
                retry_delay: Duration::from_millis(10),
                env: BTreeMap::from([("SITE_TITLE".to_string(), "Shop".to_string())]),
            },
        });

        let registry = Arc::new(RunRegistry::new());
        let (purge_tx, purge_task) =
            PurgeController::new(distributions.clone(), params.clone(), registry.clone()).spawn(8);
        let orchestrator = Arc::new(Orchestrator::new(
            ctx,
            registry.clone(),
            purge_tx,
            SourceFilter {
                repository: REPOSITORY.to_string(),
                branch: BRANCH.to_string(),
            },
        ));

        Harness {
            edge,
            objects,
            store,
            params,
            notifier,
            agent,
            distributions,
            registry,
            orchestrator,
            production,
            purge_task,
        }
    }
}

/// A seeded service: production serving `v1`, nothing staged.
pub struct Harness {
    pub edge: Arc<MemoryEdge>,
    pub objects: Arc<MemoryObjectStore>,
    pub store: Arc<MemoryConfigStore>,
    pub params: ParamStore,
    pub notifier: Arc<MemoryNotifier>,
    pub agent: Arc<FakeAgent>,
    pub distributions: DistributionManager,
    pub registry: Arc<RunRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub production: DistributionId,
    pub purge_task: JoinHandle<()>,
}

/// What a request got back from the edge.
#[derive(Debug)]
pub struct Served {
    pub status: StatusCode,
    pub distribution: String,
    pub body: String,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            cleanup: true,
            approval_timeout: None,
            deploy_attempts: 3,
        }
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub fn event(commit: &str) -> SourceChange {
        SourceChange::new(REPOSITORY, BRANCH, Some(commit.to_string()))
    }

    /// Start a run for `commit` in the background.
    pub fn start(&self, commit: &str) -> JoinHandle<SourceOutcome> {
        let orchestrator = self.orchestrator.clone();
        let event = Self::event(commit);
        tokio::spawn(async move { orchestrator.on_source_changed(event).await })
    }

    /// Wait for the `nth` approval prompt (1-based).
    pub async fn prompt(&self, nth: usize) -> ApprovalPrompt {
        tokio::time::timeout(WAIT, self.notifier.wait_for_prompt(nth))
            .await
            .expect("timed out waiting for approval prompt")
            .expect("notifier closed")
    }

    /// Answer the `nth` approval prompt.
    pub async fn decide(&self, nth: usize, decision: Decision) -> ApprovalPrompt {
        let prompt = self.prompt(nth).await;
        self.orchestrator
            .on_approval_state_changed(&prompt.run_id, decision)
            .unwrap();
        prompt
    }

    /// Wait for a started run to finish.
    pub async fn finish(handle: JoinHandle<SourceOutcome>) -> SourceOutcome {
        tokio::time::timeout(WAIT, handle)
            .await
            .expect("timed out waiting for run")
            .unwrap()
    }

    /// GET `path` with `headers` through production.
    pub async fn serve(&self, headers: &[(&str, &str)], path: &str) -> Served {
        let mut builder = Request::builder().uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(()).unwrap();
        let response = serve(
            self.edge.as_ref() as &dyn EdgeOps,
            self.objects.as_ref() as &dyn ObjectStore,
            &self.production,
            &request,
        )
        .await
        .unwrap();

        let status = response.status();
        let distribution = response
            .headers()
            .get(SERVED_BY_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        Served {
            status,
            distribution,
            body: String::from_utf8(body.to_vec()).unwrap(),
        }
    }

    /// A second controller sharing this harness's state, for redelivery.
    pub fn purge_controller(&self) -> PurgeController {
        PurgeController::new(
            self.distributions.clone(),
            self.params.clone(),
            self.registry.clone(),
        )
    }
}
