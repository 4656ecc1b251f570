//! Evaluation status classification.

use deckhand_core::{DeckhandError, DeckhandResult};

/// Known evaluation statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalStatus {
    Pending,
    Complete,
    Failed,
    Cancelled,
    Blocked,
}

impl EvalStatus {
    /// Parse a scheduler status string. Unknown strings are a precondition
    /// failure so a new status can never leave a watch hanging.
    pub fn parse(status: &str) -> DeckhandResult<Self> {
        match status {
            "" | "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            "canceled" | "cancelled" => Ok(Self::Cancelled),
            "blocked" => Ok(Self::Blocked),
            other => Err(DeckhandError::Precondition(format!(
                "unrecognized evaluation status {other:?}"
            ))),
        }
    }
}

/// What the monitor should do after a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Success,
    /// The scheduler reported a failure; carries a description.
    Failure(String),
}

/// Classify a status for the evaluation `eval_id`.
///
/// `blocked` counts as failure: the scheduler may spawn a follow-up
/// evaluation, but the caller only watches the one it named.
pub fn classify(eval_id: &str, status: &str, description: &str) -> DeckhandResult<Outcome> {
    let detail = if description.is_empty() {
        String::new()
    } else {
        format!(": {description}")
    };
    Ok(match EvalStatus::parse(status)? {
        EvalStatus::Pending => Outcome::Continue,
        EvalStatus::Complete => Outcome::Success,
        EvalStatus::Failed => Outcome::Failure(format!("evaluation {eval_id} failed{detail}")),
        EvalStatus::Cancelled => {
            Outcome::Failure(format!("evaluation {eval_id} was cancelled{detail}"))
        }
        EvalStatus::Blocked => Outcome::Failure(format!(
            "evaluation {eval_id} is blocked waiting for resources{detail}"
        )),
    })
}
