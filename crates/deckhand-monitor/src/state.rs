//! Evaluation snapshots and the diff between consecutive ones.
//!
//! `diff` is a pure function of two snapshots; the monitor owns the only
//! copy of the previous snapshot and swaps it after each poll.

use std::collections::BTreeMap;
use std::fmt;

use deckhand_scheduler::{Allocation, DESIRED_STATUS_RUN, Evaluation};

/// Status every watch starts from.
pub const INITIAL_EVAL_STATUS: &str = "pending";

/// One allocation as observed in a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocState {
    pub id: String,
    pub group: String,
    pub node: String,
    pub desired_status: String,
    pub desired_description: String,
    pub client_status: String,
    pub client_description: String,
    /// Scheduler index at which the allocation was created.
    pub create_index: u64,
}

impl From<&Allocation> for AllocState {
    fn from(alloc: &Allocation) -> Self {
        Self {
            id: alloc.id.clone(),
            group: alloc.task_group.clone(),
            node: if alloc.node_name.is_empty() {
                alloc.node_id.clone()
            } else {
                alloc.node_name.clone()
            },
            desired_status: alloc.desired_status.clone(),
            desired_description: alloc.desired_description.clone(),
            client_status: alloc.client_status.clone(),
            client_description: alloc.client_description.clone(),
            create_index: alloc.create_index,
        }
    }
}

/// What one poll saw of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalState {
    pub status: String,
    /// Allocations keyed by ID.
    pub allocs: BTreeMap<String, AllocState>,
    /// The evaluation's own create index.
    pub create_index: u64,
    /// Index to block on for the next poll.
    pub wait_index: u64,
}

impl Default for EvalState {
    fn default() -> Self {
        Self {
            status: INITIAL_EVAL_STATUS.to_string(),
            allocs: BTreeMap::new(),
            create_index: 0,
            wait_index: 0,
        }
    }
}

impl EvalState {
    pub fn from_snapshot(eval: &Evaluation, allocs: &[Allocation], wait_index: u64) -> Self {
        Self {
            status: eval.status.clone(),
            allocs: allocs
                .iter()
                .map(|a| (a.id.clone(), AllocState::from(a)))
                .collect(),
            create_index: eval.create_index,
            wait_index,
        }
    }
}

/// A narratable change between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Newly scheduled allocation.
    AllocCreated {
        alloc_id: String,
        node: String,
        group: String,
    },
    /// Allocation that predates the evaluation and was altered by it.
    AllocModified {
        alloc_id: String,
        node: String,
        group: String,
    },
    AllocStatusChanged {
        alloc_id: String,
        from: String,
        to: String,
        description: String,
    },
    EvalStatusChanged {
        from: String,
        to: String,
    },
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocCreated {
                alloc_id,
                node,
                group,
            } => write!(
                f,
                "Allocation {} created: node {node:?}, group {group:?}",
                short_id(alloc_id)
            ),
            Self::AllocModified {
                alloc_id,
                node,
                group,
            } => write!(
                f,
                "Allocation {} modified: node {node:?}, group {group:?}",
                short_id(alloc_id)
            ),
            Self::AllocStatusChanged {
                alloc_id,
                from,
                to,
                description,
            } => {
                write!(
                    f,
                    "Allocation {} status changed: {from} -> {to}",
                    short_id(alloc_id)
                )?;
                if !description.is_empty() {
                    write!(f, " ({description})")?;
                }
                Ok(())
            }
            Self::EvalStatusChanged { from, to } => {
                write!(f, "Evaluation status changed: {from} -> {to}")
            }
        }
    }
}

/// Compute the narration for moving from `old` to `new`.
///
/// Allocations missing from `new` produce nothing: removal is not
/// narrated.
pub fn diff(old: &EvalState, new: &EvalState) -> Vec<MonitorEvent> {
    let mut events = Vec::new();

    for (id, alloc) in &new.allocs {
        match old.allocs.get(id) {
            None => {
                if alloc.create_index < new.create_index {
                    events.push(MonitorEvent::AllocModified {
                        alloc_id: id.clone(),
                        node: alloc.node.clone(),
                        group: alloc.group.clone(),
                    });
                } else if alloc.desired_status == DESIRED_STATUS_RUN {
                    events.push(MonitorEvent::AllocCreated {
                        alloc_id: id.clone(),
                        node: alloc.node.clone(),
                        group: alloc.group.clone(),
                    });
                }
            }
            Some(existing) if existing.client_status != alloc.client_status => {
                events.push(MonitorEvent::AllocStatusChanged {
                    alloc_id: id.clone(),
                    from: existing.client_status.clone(),
                    to: alloc.client_status.clone(),
                    description: alloc.client_description.clone(),
                });
            }
            Some(_) => {}
        }
    }

    // Transitions into pending are never narrated.
    if !old.status.is_empty() && old.status != new.status && new.status != INITIAL_EVAL_STATUS {
        events.push(MonitorEvent::EvalStatusChanged {
            from: old.status.clone(),
            to: new.status.clone(),
        });
    }

    events
}

/// First eight characters of an ID, the way operators usually see them.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}
