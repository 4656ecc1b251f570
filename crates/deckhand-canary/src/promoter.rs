//! Canary promoter: drives a canary deployment to promotion or failure.
//!
//! ```text
//! Resolved ──► Skipped (first version, no deployment, stale, not running, no canaries)
//!    │
//!    └──► WaitingHealthy ──► Promoting ──► ConvergingEvaluation ──► Done
//!
//! any step ──► error (deadline, cancellation, scheduler failure)
//! ```
//!
//! The promote/fail call is issued at most once per `promote`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use deckhand_core::{
    AbortReason, CanarySettings, Context, DeckhandError, DeckhandResult, MonitorSettings,
    ProgressSink, Step, StepGroup, StepStatus, Style,
};
use deckhand_monitor::{EvaluationMonitor, short_id};
use deckhand_scheduler::{
    DEPLOYMENT_STATUS_RUNNING, Deployment, Job, QueryOptions, SchedulerClient, SchedulerFuture,
    UpdateStrategy,
};

use crate::config::{DeploymentRef, RELEASE_URL_META_KEY, ReleaserConfig};
use crate::decision::CanaryDecision;

/// Why a release finished without touching the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The job has only ever had one version.
    FirstVersion,
    NoDeployment,
    /// The latest deployment belongs to an older job version.
    StaleDeployment { deployment_version: u64, job_version: u64 },
    NotRunning { status: String },
    NoCanaries,
}

/// How a release ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Promoted { groups: Vec<String> },
    DeploymentFailed,
    Skipped(SkipReason),
}

/// Result of a successful `promote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseResult {
    pub job_id: String,
    pub deployment_id: Option<String>,
    /// Evaluation created by the promote/fail call.
    pub eval_id: Option<String>,
    pub outcome: ReleaseOutcome,
    /// From job metadata; empty when the job declares none.
    pub url: String,
}

/// Promotes (or fails) canary deployments.
pub struct CanaryPromoter {
    client: Arc<dyn SchedulerClient>,
    sink: Arc<dyn ProgressSink>,
    settings: CanarySettings,
    monitor_settings: MonitorSettings,
    query: QueryOptions,
}

impl CanaryPromoter {
    pub fn new(client: Arc<dyn SchedulerClient>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            client,
            sink,
            settings: CanarySettings::default(),
            monitor_settings: MonitorSettings::default(),
            query: QueryOptions::default(),
        }
    }

    pub fn with_settings(mut self, settings: CanarySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Timings for the evaluation watch that follows the promote call.
    pub fn with_monitor_settings(mut self, settings: MonitorSettings) -> Self {
        self.monitor_settings = settings;
        self
    }

    pub fn with_query(mut self, query: QueryOptions) -> Self {
        self.query = query;
        self
    }

    /// Release `target` according to `config`.
    pub async fn promote(
        &self,
        ctx: &Context,
        target: &DeploymentRef,
        config: &ReleaserConfig,
    ) -> DeckhandResult<ReleaseResult> {
        let job = self.resolve_job(ctx, &target.name).await?;
        info!(job_id = %job.id, version = job.version, "resolved job for release");

        let mut result = ReleaseResult {
            job_id: job.id.clone(),
            deployment_id: None,
            eval_id: None,
            outcome: ReleaseOutcome::Skipped(SkipReason::FirstVersion),
            url: job.meta.get(RELEASE_URL_META_KEY).cloned().unwrap_or_default(),
        };

        if job.version == 0 {
            self.sink.output(
                &format!(
                    "Job {:?} is at its first version; there is no canary to promote",
                    job.id
                ),
                Style::Info,
            );
            return Ok(result);
        }

        let deployment = match self.latest_deployment(ctx, &job.id).await? {
            Some(deployment) => deployment,
            None => {
                self.sink.output(
                    &format!("Job {:?} has no deployment; nothing to promote", job.id),
                    Style::Info,
                );
                result.outcome = ReleaseOutcome::Skipped(SkipReason::NoDeployment);
                return Ok(result);
            }
        };
        result.deployment_id = Some(deployment.id.clone());

        if deployment.job_version != job.version {
            self.sink.output(
                &format!(
                    "Latest deployment {:?} is for job version {}, current version is {}; nothing to promote",
                    short_id(&deployment.id),
                    deployment.job_version,
                    job.version
                ),
                Style::Info,
            );
            result.outcome = ReleaseOutcome::Skipped(SkipReason::StaleDeployment {
                deployment_version: deployment.job_version,
                job_version: job.version,
            });
            return Ok(result);
        }

        if deployment.status != DEPLOYMENT_STATUS_RUNNING {
            self.sink.output(
                &format!(
                    "Deployment {:?} is {:?}, not running; nothing to promote",
                    short_id(&deployment.id),
                    deployment.status
                ),
                Style::Info,
            );
            result.outcome = ReleaseOutcome::Skipped(SkipReason::NotRunning {
                status: deployment.status.clone(),
            });
            return Ok(result);
        }

        let decision = CanaryDecision::compute(config, &deployment);
        if decision.is_empty() {
            warn!(deployment_id = %deployment.id, "no canary groups selected");
            self.sink.output(
                &format!(
                    "No canaries detected in deployment {:?}",
                    short_id(&deployment.id)
                ),
                Style::Warning,
            );
            result.outcome = ReleaseOutcome::Skipped(SkipReason::NoCanaries);
            return Ok(result);
        }

        let health_deadline = self.health_deadline(config, &job, &decision);
        self.wait_healthy(ctx, &job.id, &deployment, &decision, health_deadline)
            .await?;

        let eval_id = self.apply_decision(&deployment, &decision).await?;
        result.eval_id = Some(eval_id.clone());

        EvaluationMonitor::new(self.client.clone(), self.sink.clone())
            .with_settings(self.monitor_settings)
            .with_query(self.query.clone())
            .monitor(ctx, &eval_id)
            .await?;

        result.outcome = if decision.fail_deployment {
            ReleaseOutcome::DeploymentFailed
        } else {
            ReleaseOutcome::Promoted {
                groups: decision.groups(),
            }
        };
        info!(job_id = %job.id, deployment_id = %deployment.id, "release finished");
        Ok(result)
    }

    /// Find the job whose ID is exactly `name` among prefix matches.
    async fn resolve_job(&self, ctx: &Context, name: &str) -> DeckhandResult<Job> {
        let candidates = with_context(
            ctx,
            "listing jobs",
            self.client.jobs_by_prefix(name, &self.query),
        )
        .await?;

        if !candidates.iter().any(|stub| stub.id == name) {
            let msg = if candidates.is_empty() {
                format!("job {name:?} not found")
            } else {
                let names: Vec<&str> = candidates.iter().map(|s| s.id.as_str()).collect();
                format!(
                    "job {name:?} not found; did you mean one of: {}",
                    names.join(", ")
                )
            };
            self.sink.output(&msg, Style::Error);
            return Err(DeckhandError::Precondition(msg));
        }

        with_context(ctx, "fetching job", self.client.job(name, &self.query)).await
    }

    async fn latest_deployment(
        &self,
        ctx: &Context,
        job_id: &str,
    ) -> DeckhandResult<Option<Deployment>> {
        with_context(
            ctx,
            "fetching latest deployment",
            self.client.latest_deployment(job_id, &self.query),
        )
        .await
    }

    /// Configured override, else the longest healthy deadline among the
    /// selected groups (falling back to the job's), else the default.
    fn health_deadline(
        &self,
        config: &ReleaserConfig,
        job: &Job,
        decision: &CanaryDecision,
    ) -> Duration {
        if let Some(deadline) = config.health_deadline {
            return deadline;
        }
        let job_deadline = job.update.as_ref().and_then(UpdateStrategy::healthy_deadline);
        decision
            .groups_to_promote
            .iter()
            .filter_map(|name| {
                job.task_groups
                    .iter()
                    .find(|tg| &tg.name == name)
                    .and_then(|tg| tg.update.as_ref())
                    .and_then(UpdateStrategy::healthy_deadline)
                    .or(job_deadline)
            })
            .max()
            .unwrap_or(self.settings.health_deadline)
    }

    /// Poll the deployment until every selected group's canaries are
    /// healthy, or the deadline passes.
    async fn wait_healthy(
        &self,
        ctx: &Context,
        job_id: &str,
        initial: &Deployment,
        decision: &CanaryDecision,
        health_deadline: Duration,
    ) -> DeckhandResult<()> {
        let deadline = Instant::now() + health_deadline;
        let wait_ctx = ctx.with_deadline(deadline);
        info!(deployment_id = %initial.id, ?health_deadline, "waiting for healthy canaries");

        let mut group_ui = self.sink.step_group();
        let result = self
            .wait_groups(&wait_ctx, group_ui.as_mut(), job_id, initial, decision)
            .await;
        group_ui.wait();
        result
    }

    async fn wait_groups(
        &self,
        wait_ctx: &Context,
        group_ui: &mut dyn StepGroup,
        job_id: &str,
        initial: &Deployment,
        decision: &CanaryDecision,
    ) -> DeckhandResult<()> {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Consume the immediate first tick; the initial snapshot is checked
        // without waiting.
        ticker.tick().await;

        let mut deployment = initial.clone();
        for group in &decision.groups_to_promote {
            let mut step = group_ui.add(&format!("Waiting for canaries in group {group:?}"));
            loop {
                let state = deployment.task_groups.get(group).ok_or_else(|| {
                    DeckhandError::Precondition(format!(
                        "group {group:?} disappeared from deployment {}",
                        deployment.id
                    ))
                });
                let state = match state {
                    Ok(state) => state,
                    Err(err) => {
                        step.abort();
                        return Err(err);
                    }
                };

                let placed = state.placed_canaries.len();
                step.update(&format!(
                    "Group {group:?}: {}/{} canaries healthy",
                    state.healthy_allocs, placed
                ));
                if state.canaries_healthy() {
                    debug!(%group, healthy = state.healthy_allocs, placed, "canaries healthy");
                    step.status(StepStatus::Success);
                    step.done();
                    break;
                }

                if let Err(err) = self.tick(wait_ctx, &mut ticker, group).await {
                    finish_step(step.as_mut(), &err);
                    return Err(err);
                }

                deployment = match self.refresh(wait_ctx, job_id, &deployment.id).await {
                    Ok(deployment) => deployment,
                    Err(err) => {
                        finish_step(step.as_mut(), &err);
                        return Err(err);
                    }
                };
            }
        }
        Ok(())
    }

    async fn tick(
        &self,
        ctx: &Context,
        ticker: &mut tokio::time::Interval,
        group: &str,
    ) -> DeckhandResult<()> {
        tokio::select! {
            biased;
            reason = ctx.done() => {
                warn!(%group, %reason, "stopped waiting for healthy canaries");
                Err(DeckhandError::aborted(
                    reason,
                    format!("waiting for canaries in group {group:?} to become healthy"),
                ))
            }
            _ = ticker.tick() => Ok(()),
        }
    }

    /// Re-fetch the deployment being watched. It must still be the latest
    /// and still running.
    async fn refresh(
        &self,
        ctx: &Context,
        job_id: &str,
        deployment_id: &str,
    ) -> DeckhandResult<Deployment> {
        let latest = self.latest_deployment(ctx, job_id).await?;
        match latest {
            Some(d) if d.id == deployment_id && d.status == DEPLOYMENT_STATUS_RUNNING => Ok(d),
            Some(d) if d.id == deployment_id => Err(DeckhandError::Failed(format!(
                "deployment {deployment_id} became {:?} while waiting for canaries{}",
                d.status,
                if d.status_description.is_empty() {
                    String::new()
                } else {
                    format!(": {}", d.status_description)
                }
            ))),
            Some(d) => Err(DeckhandError::Precondition(format!(
                "deployment {deployment_id} was superseded by {} while waiting for canaries",
                d.id
            ))),
            None => Err(DeckhandError::Precondition(format!(
                "deployment {deployment_id} disappeared while waiting for canaries"
            ))),
        }
    }

    /// Issue the single write call. Never retried.
    async fn apply_decision(
        &self,
        deployment: &Deployment,
        decision: &CanaryDecision,
    ) -> DeckhandResult<String> {
        let response = if decision.fail_deployment {
            self.sink.output(
                &format!("Failing deployment {:?}", short_id(&deployment.id)),
                Style::Warning,
            );
            self.client
                .fail_deployment(&deployment.id, &self.query)
                .await?
        } else {
            let groups = decision.groups();
            self.sink.output(
                &format!(
                    "Promoting deployment {:?} (groups: {})",
                    short_id(&deployment.id),
                    groups.join(", ")
                ),
                Style::Info,
            );
            self.client
                .promote_groups(&deployment.id, &groups, &self.query)
                .await?
        };
        info!(
            deployment_id = %deployment.id,
            eval_id = %response.eval_id,
            fail = decision.fail_deployment,
            "deployment update issued"
        );
        Ok(response.eval_id)
    }
}

fn finish_step(step: &mut dyn Step, err: &DeckhandError) {
    if err.abort_reason() == Some(AbortReason::DeadlineExceeded) {
        step.status(StepStatus::Timeout);
    }
    step.abort();
}

/// Run a read call, giving up when the context is done.
async fn with_context<T>(
    ctx: &Context,
    what: &str,
    call: SchedulerFuture<'_, T>,
) -> DeckhandResult<T> {
    tokio::select! {
        biased;
        reason = ctx.done() => Err(DeckhandError::aborted(reason, what.to_string())),
        res = call => Ok(res?),
    }
}
