//! Evaluation monitor: polls one evaluation until it settles.
//!
//! Each tick fetches the evaluation and its allocations, builds an
//! [`EvalState`], narrates the [`diff`] against the previous snapshot, and
//! classifies the status. The watch is bounded by the caller's context and
//! by the monitor's own deadline, whichever comes first.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use deckhand_core::{Context, DeckhandError, DeckhandResult, MonitorSettings, ProgressSink, Style};
use deckhand_scheduler::{Allocation, Evaluation, QueryOptions, SchedulerClient};

use crate::state::{EvalState, MonitorEvent, diff, short_id};
use crate::status::{Outcome, classify};

/// Watches scheduler evaluations and narrates their progress.
///
/// One instance watches one evaluation at a time; build another instance
/// to watch several concurrently.
pub struct EvaluationMonitor {
    client: Arc<dyn SchedulerClient>,
    sink: Arc<dyn ProgressSink>,
    settings: MonitorSettings,
    query: QueryOptions,
    /// Last applied snapshot, readable while a watch is running.
    state: Arc<Mutex<EvalState>>,
    watching: AtomicBool,
}

/// Releases the single-watch flag when a watch ends.
struct WatchGuard<'a>(&'a AtomicBool);

impl Drop for WatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EvaluationMonitor {
    pub fn new(client: Arc<dyn SchedulerClient>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            client,
            sink,
            settings: MonitorSettings::default(),
            query: QueryOptions::default(),
            state: Arc::new(Mutex::new(EvalState::default())),
            watching: AtomicBool::new(false),
        }
    }

    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Namespace/region scope passed through on every query.
    pub fn with_query(mut self, query: QueryOptions) -> Self {
        self.query = query;
        self
    }

    /// The most recently applied snapshot.
    pub async fn current_state(&self) -> EvalState {
        self.state.lock().await.clone()
    }

    /// Watch `eval_id` until it completes, fails, or the wait is aborted.
    ///
    /// Returns `Ok(())` only for `complete`. Scheduler-reported failure,
    /// cancellation, and blocking return `Failed`; an unknown status or a
    /// mismatched payload returns `Precondition`; query errors return
    /// `Upstream` immediately; running out of time returns `Aborted`.
    pub async fn monitor(&self, ctx: &Context, eval_id: &str) -> DeckhandResult<()> {
        if self.watching.swap(true, Ordering::AcqRel) {
            return Err(DeckhandError::Precondition(
                "evaluation monitor is already watching an evaluation".to_string(),
            ));
        }
        let _guard = WatchGuard(&self.watching);

        *self.state.lock().await = EvalState::default();
        let ctx = ctx.with_timeout(self.settings.deadline);

        info!(%eval_id, deadline = ?self.settings.deadline, "monitoring evaluation");
        self.sink.output(
            &format!("Monitoring evaluation {:?}", short_id(eval_id)),
            Style::Header,
        );

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut opts = self.query.clone();
        let mut first = true;
        let mut narrated_failures = BTreeSet::new();

        loop {
            tokio::select! {
                biased;
                reason = ctx.done() => {
                    warn!(%eval_id, %reason, "stopped monitoring evaluation");
                    return Err(DeckhandError::aborted(
                        reason,
                        format!("watching evaluation {eval_id}"),
                    ));
                }
                _ = ticker.tick() => {}
            }

            let (eval, allocs, wait_index) = tokio::select! {
                biased;
                reason = ctx.done() => {
                    warn!(%eval_id, %reason, "stopped monitoring evaluation mid-query");
                    return Err(DeckhandError::aborted(
                        reason,
                        format!("watching evaluation {eval_id}"),
                    ));
                }
                polled = self.poll(eval_id, &opts) => polled?,
            };
            opts = opts.with_wait_index(wait_index);

            if first {
                self.narrate_origin(&eval);
                first = false;
            }

            let next = EvalState::from_snapshot(&eval, &allocs, wait_index);
            for event in self.apply(next).await {
                debug!(%eval_id, ?event, "evaluation changed");
                self.sink.output(&event.to_string(), style_for(&event));
            }
            self.narrate_placement_failures(&eval, &mut narrated_failures);

            match classify(eval_id, &eval.status, &eval.status_description)? {
                Outcome::Continue => {
                    debug!(%eval_id, status = %eval.status, "evaluation still in progress");
                }
                Outcome::Success => {
                    info!(%eval_id, "evaluation complete");
                    self.sink.output(
                        &format!(
                            "Evaluation {:?} finished with status {:?}",
                            short_id(eval_id),
                            eval.status
                        ),
                        Style::Success,
                    );
                    return Ok(());
                }
                Outcome::Failure(msg) => {
                    warn!(%eval_id, status = %eval.status, "evaluation did not complete");
                    self.sink.output(
                        &format!(
                            "Evaluation {:?} finished with status {:?}",
                            short_id(eval_id),
                            eval.status
                        ),
                        Style::Error,
                    );
                    return Err(DeckhandError::Failed(msg));
                }
            }
        }
    }

    /// Fetch the evaluation and its allocations, checking they belong to
    /// `eval_id`.
    async fn poll(
        &self,
        eval_id: &str,
        opts: &QueryOptions,
    ) -> DeckhandResult<(Evaluation, Vec<Allocation>, u64)> {
        let eval = self.client.evaluation(eval_id, opts).await?;
        if eval.value.id != eval_id {
            return Err(DeckhandError::Precondition(format!(
                "asked for evaluation {eval_id}, scheduler returned {}",
                eval.value.id
            )));
        }

        let allocs = self.client.evaluation_allocations(eval_id, opts).await?;
        if let Some(stray) = allocs.value.iter().find(|a| a.eval_id != eval_id) {
            return Err(DeckhandError::Precondition(format!(
                "allocation {} belongs to evaluation {}, not {eval_id}",
                stray.id, stray.eval_id
            )));
        }

        let wait_index = eval.last_index.max(allocs.last_index);
        Ok((eval.value, allocs.value, wait_index))
    }

    /// Swap in the new snapshot and return what changed.
    async fn apply(&self, next: EvalState) -> Vec<MonitorEvent> {
        let mut current = self.state.lock().await;
        let events = diff(&current, &next);
        *current = next;
        events
    }

    fn narrate_origin(&self, eval: &Evaluation) {
        if !eval.job_id.is_empty() {
            let trigger = if eval.triggered_by.is_empty() {
                String::new()
            } else {
                format!(" ({})", eval.triggered_by)
            };
            self.sink.output(
                &format!("Evaluation triggered by job {:?}{trigger}", eval.job_id),
                Style::Plain,
            );
        }
        if let Some(deployment_id) = &eval.deployment_id {
            self.sink.output(
                &format!(
                    "Evaluation within deployment {:?}",
                    short_id(deployment_id)
                ),
                Style::Plain,
            );
        }
    }

    fn narrate_placement_failures(&self, eval: &Evaluation, seen: &mut BTreeSet<String>) {
        for (group, failure) in &eval.failed_tg_allocs {
            if !seen.insert(group.clone()) {
                continue;
            }
            let count = 1 + failure.coalesced_failures;
            self.sink.output(
                &format!(
                    "Task group {group:?} failed to place {count} allocation(s): \
                     {} nodes evaluated, {} exhausted",
                    failure.nodes_evaluated, failure.nodes_exhausted
                ),
                Style::Warning,
            );
        }
    }
}

fn style_for(event: &MonitorEvent) -> Style {
    match event {
        MonitorEvent::AllocStatusChanged { to, .. } if to == "failed" || to == "lost" => {
            Style::Warning
        }
        _ => Style::Plain,
    }
}
