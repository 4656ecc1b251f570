//! In-memory scheduler.
//!
//! Scripts the scheduler's view over time: each evaluation query advances to
//! the next queued snapshot and then stays on the last one, the same for
//! deployments. Write calls are recorded so callers can assert how many were
//! issued.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::client::{SchedulerClient, SchedulerFuture};
use crate::error::{SchedulerError, SchedulerResult};
use crate::types::*;

/// Scheduler operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Evaluation,
    EvaluationAllocations,
    JobsByPrefix,
    Job,
    LatestDeployment,
    PromoteGroups,
    FailDeployment,
}

/// A recorded write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    Promote {
        deployment_id: String,
        groups: Vec<String>,
    },
    Fail {
        deployment_id: String,
    },
}

/// Queue of snapshots that sticks on the last one once drained.
#[derive(Debug)]
struct Script<T> {
    pending: VecDeque<T>,
    current: Option<T>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
        }
    }
}

impl<T> Script<T> {
    fn advance(&mut self) -> Option<&T> {
        if let Some(next) = self.pending.pop_front() {
            self.current = Some(next);
        }
        self.current.as_ref()
    }
}

#[derive(Debug)]
struct EvalSnapshot {
    evaluation: Evaluation,
    allocations: Vec<Allocation>,
    index: u64,
}

#[derive(Debug, Default)]
struct Inner {
    evaluations: HashMap<String, Script<EvalSnapshot>>,
    jobs: BTreeMap<String, Job>,
    deployments: HashMap<String, Script<Option<Deployment>>>,
    update_eval_id: Option<String>,
    failures: HashMap<Operation, SchedulerError>,
    calls: HashMap<Operation, usize>,
    writes: Vec<WriteCall>,
    index: u64,
}

/// A scriptable [`SchedulerClient`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScheduler {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the next observed state of an evaluation and its allocations.
    pub fn push_evaluation(&self, evaluation: Evaluation, allocations: Vec<Allocation>) {
        let mut inner = self.lock();
        inner.index += 1;
        let index = inner.index;
        inner
            .evaluations
            .entry(evaluation.id.clone())
            .or_default()
            .pending
            .push_back(EvalSnapshot {
                evaluation,
                allocations,
                index,
            });
    }

    pub fn insert_job(&self, job: Job) {
        self.lock().jobs.insert(job.id.clone(), job);
    }

    /// Queue the next observed latest deployment of a job.
    pub fn push_deployment(&self, job_id: &str, deployment: Option<Deployment>) {
        self.lock()
            .deployments
            .entry(job_id.to_string())
            .or_default()
            .pending
            .push_back(deployment);
    }

    /// Evaluation ID returned by promote and fail calls.
    pub fn set_update_eval_id(&self, eval_id: &str) {
        self.lock().update_eval_id = Some(eval_id.to_string());
    }

    /// Make every call to `op` fail with `err`.
    pub fn fail_operation(&self, op: Operation, err: SchedulerError) {
        self.lock().failures.insert(op, err);
    }

    /// Number of times `op` was called.
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Every promote/fail call, in order.
    pub fn writes(&self) -> Vec<WriteCall> {
        self.lock().writes.clone()
    }

    /// Count the call and return the injected failure, if any.
    fn enter(&self, op: Operation) -> SchedulerResult<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        *inner.calls.entry(op).or_insert(0) += 1;
        if let Some(err) = inner.failures.get(&op) {
            return Err(err.clone());
        }
        Ok(inner)
    }

    fn update_response(inner: &mut Inner) -> DeploymentUpdateResponse {
        inner.index += 1;
        DeploymentUpdateResponse {
            eval_id: inner
                .update_eval_id
                .clone()
                .unwrap_or_else(|| format!("eval-{}", inner.index)),
            deployment_modify_index: inner.index,
        }
    }
}

impl SchedulerClient for InMemoryScheduler {
    fn evaluation<'a>(
        &'a self,
        eval_id: &'a str,
        opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, Indexed<Evaluation>> {
        Box::pin(async move {
            let mut inner = self.enter(Operation::Evaluation)?;
            debug!(%eval_id, wait_index = opts.wait_index, "in-memory evaluation query");
            let snapshot = inner
                .evaluations
                .get_mut(eval_id)
                .and_then(Script::advance)
                .ok_or_else(|| SchedulerError::NotFound(format!("evaluation {eval_id}")))?;
            Ok(Indexed {
                value: snapshot.evaluation.clone(),
                last_index: snapshot.index,
            })
        })
    }

    fn evaluation_allocations<'a>(
        &'a self,
        eval_id: &'a str,
        _opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, Indexed<Vec<Allocation>>> {
        Box::pin(async move {
            let inner = self.enter(Operation::EvaluationAllocations)?;
            let snapshot = inner
                .evaluations
                .get(eval_id)
                .and_then(|script| script.current.as_ref())
                .ok_or_else(|| SchedulerError::NotFound(format!("evaluation {eval_id}")))?;
            Ok(Indexed {
                value: snapshot.allocations.clone(),
                last_index: snapshot.index,
            })
        })
    }

    fn jobs_by_prefix<'a>(
        &'a self,
        prefix: &'a str,
        _opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, Vec<JobListStub>> {
        Box::pin(async move {
            let inner = self.enter(Operation::JobsByPrefix)?;
            Ok(inner
                .jobs
                .values()
                .filter(|job| job.id.starts_with(prefix))
                .map(|job| JobListStub {
                    id: job.id.clone(),
                    name: job.name.clone(),
                })
                .collect())
        })
    }

    fn job<'a>(&'a self, job_id: &'a str, _opts: &'a QueryOptions) -> SchedulerFuture<'a, Job> {
        Box::pin(async move {
            let inner = self.enter(Operation::Job)?;
            inner
                .jobs
                .get(job_id)
                .cloned()
                .ok_or_else(|| SchedulerError::NotFound(format!("job {job_id}")))
        })
    }

    fn latest_deployment<'a>(
        &'a self,
        job_id: &'a str,
        _opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, Option<Deployment>> {
        Box::pin(async move {
            let mut inner = self.enter(Operation::LatestDeployment)?;
            Ok(inner
                .deployments
                .get_mut(job_id)
                .and_then(Script::advance)
                .cloned()
                .flatten())
        })
    }

    fn promote_groups<'a>(
        &'a self,
        deployment_id: &'a str,
        groups: &'a [String],
        _opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, DeploymentUpdateResponse> {
        Box::pin(async move {
            let mut inner = self.enter(Operation::PromoteGroups)?;
            inner.writes.push(WriteCall::Promote {
                deployment_id: deployment_id.to_string(),
                groups: groups.to_vec(),
            });
            Ok(Self::update_response(&mut inner))
        })
    }

    fn fail_deployment<'a>(
        &'a self,
        deployment_id: &'a str,
        _opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, DeploymentUpdateResponse> {
        Box::pin(async move {
            let mut inner = self.enter(Operation::FailDeployment)?;
            inner.writes.push(WriteCall::Fail {
                deployment_id: deployment_id.to_string(),
            });
            Ok(Self::update_response(&mut inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(status: &str) -> Evaluation {
        Evaluation {
            id: "e1".into(),
            job_id: "web".into(),
            status: status.into(),
            create_index: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn evaluation_script_advances_then_sticks() {
        let sched = InMemoryScheduler::new();
        sched.push_evaluation(eval("pending"), vec![]);
        sched.push_evaluation(eval("complete"), vec![]);
        let opts = QueryOptions::default();

        let first = sched.evaluation("e1", &opts).await.unwrap();
        assert_eq!(first.value.status, "pending");
        let second = sched.evaluation("e1", &opts).await.unwrap();
        assert_eq!(second.value.status, "complete");
        let third = sched.evaluation("e1", &opts).await.unwrap();
        assert_eq!(third.value.status, "complete");
        assert!(second.last_index > first.last_index);
        assert_eq!(sched.calls(Operation::Evaluation), 3);
    }

    #[tokio::test]
    async fn unknown_evaluation_is_not_found() {
        let sched = InMemoryScheduler::new();
        let err = sched
            .evaluation("missing", &QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));
    }

    #[tokio::test]
    async fn prefix_listing_and_writes() {
        let sched = InMemoryScheduler::new();
        sched.insert_job(Job {
            id: "web".into(),
            name: "web".into(),
            ..Default::default()
        });
        sched.insert_job(Job {
            id: "web-admin".into(),
            name: "web-admin".into(),
            ..Default::default()
        });
        let opts = QueryOptions::default();

        let stubs = sched.jobs_by_prefix("web", &opts).await.unwrap();
        assert_eq!(stubs.len(), 2);

        sched.set_update_eval_id("e-promote");
        let groups = vec!["api".to_string()];
        let resp = sched.promote_groups("d1", &groups, &opts).await.unwrap();
        assert_eq!(resp.eval_id, "e-promote");
        assert_eq!(
            sched.writes(),
            vec![WriteCall::Promote {
                deployment_id: "d1".into(),
                groups
            }]
        );
    }

    #[tokio::test]
    async fn injected_failures_are_returned_and_counted() {
        let sched = InMemoryScheduler::new();
        sched.fail_operation(
            Operation::FailDeployment,
            SchedulerError::Request("timeout".into()),
        );
        let err = sched
            .fail_deployment("d1", &QueryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, SchedulerError::Request("timeout".into()));
        assert_eq!(sched.calls(Operation::FailDeployment), 1);
        assert!(sched.writes().is_empty());
    }
}
