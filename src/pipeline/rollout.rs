// ABOUTME: Rollout parameterized by stage state, with one method per transition.
// ABOUTME: Each transition consumes self and returns the next state on success.

use snafu::{OptionExt, ResultExt, ensure};

use super::context::PipelineContext;
use super::error::{
    AgentSnafu, ApprovalSnafu, EdgeSnafu, InvalidVersionSnafu, MissingArtifactSnafu,
    MissingVersionSnafu, ParamsSnafu, PublishSnafu, StageError, StepFailedSnafu,
};
use super::run::Stage;
use super::state::{
    Approved, AwaitingApproval, Built, Completed, Deployed, Promoted, Rejected, Sourced, Staged,
    Triggered,
};
use crate::agent::{AgentOutcome, StageEnv, Step, vars};
use crate::approval::ApprovalOutcome;
use crate::events::SourceChange;
use crate::objects::publish_artifact;
use crate::purge::PurgeRequest;
use crate::types::{DistributionId, RunId, Version};

/// Result type for transitions that hand the rollout back on failure.
pub type TransitionResult<T, S> = Result<Rollout<T>, (Rollout<S>, StageError)>;

/// A rollout in progress, parameterized by its current state.
///
/// The state type parameter `S` carries what the finished stages produced, so
/// a transition cannot run before the data it needs exists. Promoting a
/// deployed rollout that was never approved does not compile.
#[derive(Debug)]
#[must_use = "rollout state must be used"]
pub struct Rollout<S> {
    run_id: RunId,
    source: SourceChange,
    state: S,
}

/// How the reviewer decided.
#[derive(Debug)]
pub enum Decided {
    Approved(Rollout<Approved>),
    Rejected(Rollout<Rejected>),
}

impl Rollout<Triggered> {
    pub fn new(run_id: RunId, source: SourceChange) -> Self {
        Rollout {
            run_id,
            source,
            state: Triggered,
        }
    }
}

impl<S> Rollout<S> {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn source_change(&self) -> &SourceChange {
        &self.source
    }

    fn transition<T>(self, state: T) -> Rollout<T> {
        Rollout {
            run_id: self.run_id,
            source: self.source,
            state,
        }
    }

    /// Environment for a step, built from fresh config store reads.
    async fn step_env(
        &self,
        ctx: &PipelineContext,
        stage: Stage,
        version: Option<&Version>,
        previous: Option<&Version>,
    ) -> Result<StageEnv, StageError> {
        let params = ctx.params.snapshot().await.context(ParamsSnafu { stage })?;

        let mut env = StageEnv::new();
        env.extend(ctx.settings.env.clone());
        env.set(vars::SERVICE, ctx.service.as_str())
            .set(vars::RUN_ID, self.run_id.as_str())
            .set(vars::REPOSITORY, self.source.repository.as_str())
            .set(vars::BRANCH, self.source.branch.as_str())
            .set_opt(vars::COMMIT, self.source.commit.as_deref())
            .set_opt(vars::VERSION, version.map(Version::as_str))
            .set_opt(vars::PREVIOUS_VERSION, previous.map(Version::as_str))
            .set(
                vars::PRODUCTION_DISTRIBUTION_ID,
                params.production_distribution_id.as_str(),
            )
            .set(
                vars::STAGING_DISTRIBUTION_ID,
                params
                    .staging_distribution_id
                    .as_ref()
                    .map_or(crate::store::STAGING_NONE, |id| id.as_str()),
            )
            .set(
                vars::STAGING_CLEANUP_ENABLED,
                params.staging_cleanup_enabled.to_string(),
            )
            .set(vars::SINGLE_HEADER, params.single_header_predicate.to_json());
        Ok(env)
    }
}

async fn run_step(
    ctx: &PipelineContext,
    step: Step,
    env: &StageEnv,
) -> Result<AgentOutcome, StageError> {
    let outcome = ctx.agent.run(step, env).await.context(AgentSnafu { step })?;
    ensure!(
        outcome.success(),
        StepFailedSnafu {
            step,
            code: outcome.exit_code,
            stderr: outcome.stderr.clone(),
        }
    );
    Ok(outcome)
}

async fn has_entries(dir: &std::path::Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

// =============================================================================
// Triggered -> Sourced
// =============================================================================

impl Rollout<Triggered> {
    /// Check out the change and read the version production serves.
    pub async fn source(self, ctx: &PipelineContext) -> Result<Rollout<Sourced>, StageError> {
        let previous = ctx
            .params
            .frontend_version()
            .await
            .context(ParamsSnafu {
                stage: Stage::Source,
            })?;
        let env = self
            .step_env(ctx, Stage::Source, None, Some(&previous))
            .await?;
        run_step(ctx, Step::Source, &env).await?;
        Ok(self.transition(Sourced { previous }))
    }
}

// =============================================================================
// Sourced -> Built
// =============================================================================

impl Rollout<Sourced> {
    pub fn previous_version(&self) -> &Version {
        &self.state.previous
    }

    /// Build the artifact. The version is the reported `version` output, else the commit.
    pub async fn build(self, ctx: &PipelineContext) -> Result<Rollout<Built>, StageError> {
        let previous = self.state.previous.clone();
        let env = self
            .step_env(ctx, Stage::Build, None, Some(&previous))
            .await?;
        let outcome = run_step(ctx, Step::Build, &env).await?;

        let raw = outcome
            .output("version")
            .map(str::to_string)
            .or_else(|| self.source.commit.clone())
            .context(MissingVersionSnafu)?;
        let version = Version::new(&raw).context(InvalidVersionSnafu)?;
        let artifact = outcome.artifact.context(MissingArtifactSnafu)?;
        ensure!(has_entries(&artifact).await, MissingArtifactSnafu);

        Ok(self.transition(Built {
            previous,
            version,
            artifact,
        }))
    }
}

// =============================================================================
// Built -> Deployed
// =============================================================================

impl Rollout<Built> {
    pub fn version(&self) -> &Version {
        &self.state.version
    }

    /// Publish, provision or re-point staging, and bind the policy.
    ///
    /// `held` lists staging distributions of earlier runs still waiting on a
    /// purge; those are never re-pointed, since a redelivered purge deletes them.
    /// On failure the rollout is handed back so the caller can retry.
    pub async fn deploy(
        self,
        ctx: &PipelineContext,
        held: &[DistributionId],
    ) -> TransitionResult<Deployed, Built> {
        match self.try_deploy(ctx, held).await {
            Ok(staged) => Ok(self.transition(Deployed { staged })),
            Err(e) => Err((self, e)),
        }
    }

    async fn try_deploy(
        &self,
        ctx: &PipelineContext,
        held: &[DistributionId],
    ) -> Result<Staged, StageError> {
        let Built {
            previous,
            version,
            artifact,
        } = &self.state;
        let stage = Stage::Deploy;

        let env = self
            .step_env(ctx, stage, Some(version), Some(previous))
            .await?;
        run_step(ctx, Step::Deploy, &env).await?;

        let report = publish_artifact(ctx.distributions.objects().as_ref(), version, artifact)
            .await
            .context(PublishSnafu)?;
        tracing::info!(
            run_id = %self.run_id,
            version = %version,
            objects = report.objects,
            "artifact published"
        );

        let production = ctx
            .params
            .production_distribution_id()
            .await
            .context(ParamsSnafu { stage })?;
        let predicate = ctx
            .params
            .single_header_predicate()
            .await
            .context(ParamsSnafu { stage })?;
        let existing = ctx
            .params
            .staging_distribution_id()
            .await
            .context(ParamsSnafu { stage })?
            .filter(|id| {
                let free = !held.contains(id);
                if !free {
                    tracing::warn!(
                        distribution = %id,
                        "recorded staging distribution still awaits a purge, creating a new one"
                    );
                }
                free
            });

        let staging = match existing {
            Some(id) => match ctx.distributions.repoint_staging(&id, version).await {
                Ok(record) => record,
                Err(e) if e.is_not_found() => {
                    tracing::warn!(
                        distribution = %id,
                        "recorded staging distribution is gone, creating a new one"
                    );
                    ctx.distributions
                        .create_staging(&production, version)
                        .await
                        .context(EdgeSnafu { stage })?
                }
                Err(e) => return Err(e).context(EdgeSnafu { stage }),
            },
            None => ctx
                .distributions
                .create_staging(&production, version)
                .await
                .context(EdgeSnafu { stage })?,
        };

        // Recorded before binding so a failed bind leaves nothing untracked.
        ctx.params
            .set_staging_distribution_id(Some(&staging.id))
            .await
            .context(ParamsSnafu { stage })?;

        let binding = ctx
            .distributions
            .bind_policy(&production, &staging.id, &predicate)
            .await
            .context(EdgeSnafu { stage })?;

        Ok(Staged {
            previous: previous.clone(),
            version: version.clone(),
            production,
            staging: staging.id,
            policy: binding.policy.id,
            predicate,
            production_revision: binding.production_revision,
        })
    }
}

// =============================================================================
// Deployed -> AwaitingApproval
// =============================================================================

impl Rollout<Deployed> {
    pub fn staged(&self) -> &Staged {
        &self.state.staged
    }

    /// Deliver the approval prompt and suspend the run on it.
    pub async fn request_approval(
        self,
        ctx: &PipelineContext,
    ) -> TransitionResult<AwaitingApproval, Deployed> {
        let staged = self.state.staged.clone();
        let prompt = ctx
            .gateway
            .prompt(&self.run_id, &ctx.service, &staged.staging, &staged.predicate);
        let link = prompt.link.clone();

        match ctx.gateway.request(prompt).await.context(ApprovalSnafu) {
            Ok(pending) => Ok(self.transition(AwaitingApproval {
                staged,
                link,
                pending,
            })),
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// AwaitingApproval -> Approved | Rejected
// =============================================================================

impl Rollout<AwaitingApproval> {
    pub fn staged(&self) -> &Staged {
        &self.state.staged
    }

    pub fn link(&self) -> &str {
        &self.state.link
    }

    /// Wait for the reviewer. There is no error path: expiry is a rejection.
    pub async fn await_decision(self) -> Decided {
        let Rollout {
            run_id,
            source,
            state: AwaitingApproval {
                staged, pending, ..
            },
        } = self;

        let rejected = |expired| Rollout {
            run_id: run_id.clone(),
            source: source.clone(),
            state: Rejected {
                staged: staged.clone(),
                expired,
            },
        };

        match pending.wait().await {
            ApprovalOutcome::Accepted => Decided::Approved(Rollout {
                run_id: run_id.clone(),
                source: source.clone(),
                state: Approved {
                    staged: staged.clone(),
                },
            }),
            ApprovalOutcome::Rejected => Decided::Rejected(rejected(false)),
            ApprovalOutcome::Expired => Decided::Rejected(rejected(true)),
        }
    }
}

// =============================================================================
// Approved -> Promoted
// =============================================================================

impl Rollout<Approved> {
    pub fn staged(&self) -> &Staged {
        &self.state.staged
    }

    /// Swap production onto staging's configuration, then record the version.
    pub async fn promote(self, ctx: &PipelineContext) -> Result<Rollout<Promoted>, StageError> {
        let stage = Stage::Promote;
        let mut staged = self.state.staged.clone();

        let revision = ctx
            .distributions
            .promote(&staged.production, &staged.policy, &staged.production_revision)
            .await
            .context(EdgeSnafu { stage })?;
        ctx.params
            .set_frontend_version(&staged.version)
            .await
            .context(ParamsSnafu { stage })?;

        staged.production_revision = revision;
        Ok(self.transition(Promoted { staged }))
    }
}

// =============================================================================
// Promoted -> Completed
// =============================================================================

impl Rollout<Promoted> {
    pub fn staged(&self) -> &Staged {
        &self.state.staged
    }

    /// Tear staging down when cleanup is enabled; otherwise leave it for reuse.
    pub async fn finish(self, ctx: &PipelineContext) -> Result<Rollout<Completed>, StageError> {
        let stage = Stage::Cleanup;
        let staged = &self.state.staged;

        let cleanup = ctx
            .params
            .staging_cleanup_enabled()
            .await
            .context(ParamsSnafu { stage })?;

        if cleanup {
            ctx.distributions
                .delete_staging(&staged.production, &staged.staging, Some(&staged.policy))
                .await
                .context(EdgeSnafu { stage })?;
            ctx.params
                .set_staging_distribution_id(None)
                .await
                .context(ParamsSnafu { stage })?;
        } else {
            tracing::info!(
                run_id = %self.run_id,
                distribution = %staged.staging,
                "staging cleanup disabled, keeping staging distribution"
            );
        }

        let version = staged.version.clone();
        Ok(self.transition(Completed {
            version,
            cleaned_up: cleanup,
        }))
    }
}

// =============================================================================
// Rejected / Completed
// =============================================================================

impl Rollout<Rejected> {
    pub fn staged(&self) -> &Staged {
        &self.state.staged
    }

    pub fn expired(&self) -> bool {
        self.state.expired
    }

    /// Message asking the purge controller to tear staging down.
    pub fn purge_request(&self, service: &crate::types::ServiceName) -> PurgeRequest {
        let staged = &self.state.staged;
        PurgeRequest {
            run_id: self.run_id.clone(),
            service: service.clone(),
            production: staged.production.clone(),
            staging: staged.staging.clone(),
            policy: Some(staged.policy.clone()),
        }
    }
}

impl Rollout<Completed> {
    pub fn version(&self) -> &Version {
        &self.state.version
    }

    pub fn cleaned_up(&self) -> bool {
        self.state.cleaned_up
    }
}
