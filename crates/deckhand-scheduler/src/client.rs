//! The scheduler client seam.
//!
//! Deckhand never talks to a scheduler directly; it is handed an
//! `Arc<dyn SchedulerClient>` owned by the caller. Implementations must be
//! safe to share between tasks. Retry policy belongs to the implementation,
//! except for the two write calls, which deckhand issues at most once.

use std::future::Future;
use std::pin::Pin;

use crate::error::SchedulerResult;
use crate::types::*;

/// Boxed future alias for scheduler calls.
pub type SchedulerFuture<'a, T> = Pin<Box<dyn Future<Output = SchedulerResult<T>> + Send + 'a>>;

pub trait SchedulerClient: Send + Sync {
    /// Fetch an evaluation. Blocks while `opts.wait_index` is current.
    fn evaluation<'a>(
        &'a self,
        eval_id: &'a str,
        opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, Indexed<Evaluation>>;

    /// List the allocations created or modified by an evaluation.
    fn evaluation_allocations<'a>(
        &'a self,
        eval_id: &'a str,
        opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, Indexed<Vec<Allocation>>>;

    /// List jobs whose ID starts with `prefix`.
    fn jobs_by_prefix<'a>(
        &'a self,
        prefix: &'a str,
        opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, Vec<JobListStub>>;

    fn job<'a>(&'a self, job_id: &'a str, opts: &'a QueryOptions) -> SchedulerFuture<'a, Job>;

    /// The most recent deployment of a job, if it has ever had one.
    fn latest_deployment<'a>(
        &'a self,
        job_id: &'a str,
        opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, Option<Deployment>>;

    /// Promote the canaries of `groups`.
    fn promote_groups<'a>(
        &'a self,
        deployment_id: &'a str,
        groups: &'a [String],
        opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, DeploymentUpdateResponse>;

    /// Mark a deployment failed, triggering rollback where configured.
    fn fail_deployment<'a>(
        &'a self,
        deployment_id: &'a str,
        opts: &'a QueryOptions,
    ) -> SchedulerFuture<'a, DeploymentUpdateResponse>;
}
