//! Scheduler records as deckhand sees them.
//!
//! These mirror the subset of the scheduler's API that the evaluation
//! monitor and canary promoter read. Every type is serde-friendly so a
//! client can decode them straight from the scheduler's JSON.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unique identifier for an evaluation.
pub type EvalId = String;

/// Unique identifier for an allocation.
pub type AllocId = String;

/// Unique identifier for a deployment.
pub type DeploymentId = String;

/// Desired status the scheduler assigns to an allocation it wants running.
pub const DESIRED_STATUS_RUN: &str = "run";

/// Deployment status while canaries and rollout are in flight.
pub const DEPLOYMENT_STATUS_RUNNING: &str = "running";

// ── Queries ───────────────────────────────────────────────────────

/// Options passed through on every scheduler call.
///
/// Deckhand treats these opaquely apart from `wait_index`, which it sets
/// for blocking-query continuation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub namespace: Option<String>,
    pub region: Option<String>,
    /// Return only once the scheduler's index exceeds this value.
    pub wait_index: u64,
}

impl QueryOptions {
    pub fn with_wait_index(&self, wait_index: u64) -> Self {
        Self {
            wait_index,
            ..self.clone()
        }
    }
}

/// A query result plus the scheduler index it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indexed<T> {
    pub value: T,
    pub last_index: u64,
}

// ── Evaluation ────────────────────────────────────────────────────

/// A scheduler evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvalId,
    pub job_id: String,
    /// What caused the evaluation: "job-register", "deployment-watcher", ...
    pub triggered_by: String,
    pub deployment_id: Option<DeploymentId>,
    /// Raw status string ("pending", "complete", "failed", ...).
    pub status: String,
    #[serde(default)]
    pub status_description: String,
    /// Task groups the scheduler failed to place, with placement metrics.
    #[serde(default)]
    pub failed_tg_allocs: BTreeMap<String, PlacementFailure>,
    pub create_index: u64,
    pub modify_index: u64,
}

/// Why a task group could not be placed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlacementFailure {
    pub nodes_evaluated: u32,
    pub nodes_exhausted: u32,
    /// Additional allocations that failed for the same reason.
    pub coalesced_failures: u32,
}

// ── Allocation ────────────────────────────────────────────────────

/// An allocation as listed for an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocId,
    pub eval_id: EvalId,
    pub job_id: String,
    pub task_group: String,
    pub node_id: String,
    #[serde(default)]
    pub node_name: String,
    pub desired_status: String,
    #[serde(default)]
    pub desired_description: String,
    pub client_status: String,
    #[serde(default)]
    pub client_description: String,
    pub create_index: u64,
}

// ── Job ───────────────────────────────────────────────────────────

/// Summary returned by a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListStub {
    pub id: String,
    pub name: String,
}

/// A scheduler job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub namespace: String,
    /// Incremented on every registration; 0 is the first version.
    pub version: u64,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// Job-level update strategy, inherited by groups that set none.
    pub update: Option<UpdateStrategy>,
    #[serde(default)]
    pub task_groups: Vec<TaskGroup>,
}

/// A task group within a job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskGroup {
    pub name: String,
    pub count: u32,
    pub update: Option<UpdateStrategy>,
}

/// Rollout parameters for a job or task group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateStrategy {
    pub canary: u32,
    pub auto_promote: bool,
    /// Seconds an allocation has to become healthy.
    pub healthy_deadline_secs: Option<u64>,
}

impl UpdateStrategy {
    pub fn healthy_deadline(&self) -> Option<Duration> {
        self.healthy_deadline_secs.map(Duration::from_secs)
    }
}

// ── Deployment ────────────────────────────────────────────────────

/// A deployment of one job version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub job_id: String,
    pub job_version: u64,
    /// "running", "successful", "failed", "cancelled", "paused", ...
    pub status: String,
    #[serde(default)]
    pub status_description: String,
    #[serde(default)]
    pub task_groups: BTreeMap<String, DeploymentGroupState>,
}

/// Per-group rollout progress inside a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentGroupState {
    pub desired_canaries: u32,
    pub desired_total: u32,
    /// Allocation IDs of canaries placed so far.
    #[serde(default)]
    pub placed_canaries: Vec<AllocId>,
    pub placed_allocs: u32,
    pub healthy_allocs: u32,
    pub unhealthy_allocs: u32,
    pub promoted: bool,
}

impl DeploymentGroupState {
    /// All placed canaries are counted healthy.
    pub fn canaries_healthy(&self) -> bool {
        self.healthy_allocs as usize >= self.placed_canaries.len()
    }
}

/// Response to a promote or fail request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentUpdateResponse {
    /// Evaluation created to carry out the change.
    pub eval_id: EvalId,
    pub deployment_modify_index: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canaries_healthy_compares_counts() {
        let mut group = DeploymentGroupState {
            desired_canaries: 2,
            placed_canaries: vec!["a1".into(), "a2".into()],
            healthy_allocs: 1,
            ..Default::default()
        };
        assert!(!group.canaries_healthy());
        group.healthy_allocs = 2;
        assert!(group.canaries_healthy());
    }

    #[test]
    fn decodes_scheduler_json() {
        let eval: Evaluation = serde_json::from_str(
            r#"{
                "id": "e1",
                "job_id": "web",
                "triggered_by": "job-register",
                "deployment_id": null,
                "status": "pending",
                "create_index": 10,
                "modify_index": 12
            }"#,
        )
        .unwrap();
        assert_eq!(eval.status, "pending");
        assert!(eval.failed_tg_allocs.is_empty());
    }

    #[test]
    fn wait_index_preserves_scope() {
        let opts = QueryOptions {
            namespace: Some("prod".into()),
            ..Default::default()
        };
        let next = opts.with_wait_index(42);
        assert_eq!(next.namespace.as_deref(), Some("prod"));
        assert_eq!(next.wait_index, 42);
    }
}
