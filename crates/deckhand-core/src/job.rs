//! Job-state vocabulary shared by producers and consumers of a job stream.

use serde::{Deserialize, Serialize};

/// Top-level lifecycle state of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted by the server, not yet assigned.
    Queued,
    /// Assigned, waiting for a runner to pick it up.
    Waiting,
    Running,
    Error,
    Success,
    #[serde(other)]
    Unknown,
}

impl JobState {
    /// States in which the job is idle on the server waiting for a runner.
    pub fn is_awaiting_runner(self) -> bool {
        matches!(self, Self::Queued | Self::Waiting)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Queued => "queued",
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Error => "error",
            Self::Success => "success",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn awaiting_runner_states() {
        assert!(JobState::Queued.is_awaiting_runner());
        assert!(JobState::Waiting.is_awaiting_runner());
        assert!(!JobState::Running.is_awaiting_runner());
        assert!(JobState::Success.is_terminal());
    }

    #[test]
    fn unrecognized_state_decodes_as_unknown() {
        let state: JobState = serde_json::from_str("\"hibernating\"").unwrap();
        assert_eq!(state, JobState::Unknown);
        let state: JobState = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(state, JobState::Queued);
    }
}
