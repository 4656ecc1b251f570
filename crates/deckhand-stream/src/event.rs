//! Wire vocabulary of a job progress stream.
//!
//! A stream is `Open`, then any number of `StateTransition` and `Terminal`
//! events, then exactly one `Complete` or `Error`. Variants this build does
//! not know decode as `Unknown` and are skipped by the consumer.

use serde::{Deserialize, Serialize};

use deckhand_core::{
    AbortReason, DeckhandError, JobState, NamedValue, StepStatus, Style, TableEntry,
};

/// Status code carried by a job that was cancelled.
pub const STATUS_CANCELLED: i32 = 1;
/// Status code carried by a job that ran out of time.
pub const STATUS_DEADLINE_EXCEEDED: i32 = 4;

/// A job's final status when it did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl JobStatus {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Map onto the error taxonomy. Cancellation and timeouts reported by the
    /// server stay distinguishable from real failures.
    pub fn into_error(self, job_id: &str) -> DeckhandError {
        let context = format!("job {job_id}: {}", self.message);
        match self.code {
            STATUS_CANCELLED => DeckhandError::aborted(AbortReason::Cancelled, context),
            STATUS_DEADLINE_EXCEEDED => {
                DeckhandError::aborted(AbortReason::DeadlineExceeded, context)
            }
            code => DeckhandError::Failed(format!(
                "job {job_id} failed (code {code}): {}",
                self.message
            )),
        }
    }
}

impl From<&DeckhandError> for JobStatus {
    fn from(err: &DeckhandError) -> Self {
        let code = match err.abort_reason() {
            Some(AbortReason::Cancelled) => STATUS_CANCELLED,
            Some(AbortReason::DeadlineExceeded) => STATUS_DEADLINE_EXCEEDED,
            None => 2,
        };
        Self::new(code, err.to_string())
    }
}

/// Top-level event of a job progress stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobProgressEvent {
    Open,
    StateTransition {
        current: JobState,
    },
    Terminal {
        events: Vec<TerminalEvent>,
    },
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<JobStatus>,
    },
    Error {
        status: JobStatus,
    },
    #[serde(other)]
    Unknown,
}

impl JobProgressEvent {
    /// Single-event `Terminal` envelope.
    pub fn terminal(event: TerminalEvent) -> Self {
        Self::Terminal {
            events: vec![event],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::StateTransition { .. } => "state_transition",
            Self::Terminal { .. } => "terminal",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// One UI instruction inside a `Terminal` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalEvent {
    Line {
        msg: String,
        #[serde(default)]
        style: Style,
    },
    NamedValues {
        values: Vec<NamedValue>,
    },
    /// Empty `msg` with `step == false` closes the status line.
    Status {
        #[serde(default)]
        msg: String,
        #[serde(default)]
        step: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<StepStatus>,
    },
    Raw {
        data: Vec<u8>,
        #[serde(default)]
        stderr: bool,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<TableEntry>>,
    },
    /// Wait for the open group, then open a new one unless `close` is set.
    StepGroup {
        #[serde(default)]
        close: bool,
    },
    Step {
        id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<StepStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Vec<u8>>,
        #[serde(default)]
        close: bool,
    },
    #[serde(other)]
    Unknown,
}

impl TerminalEvent {
    /// A step event carrying only `msg`.
    pub fn step_message(id: u32, msg: impl Into<String>) -> Self {
        Self::Step {
            id,
            msg: Some(msg.into()),
            status: None,
            output: None,
            close: false,
        }
    }

    /// A step event that closes step `id`.
    pub fn step_close(id: u32) -> Self {
        Self::Step {
            id,
            msg: None,
            status: None,
            output: None,
            close: true,
        }
    }
}
