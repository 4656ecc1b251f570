//! Error taxonomy shared by every deckhand component.

use thiserror::Error;

/// Result type alias for deckhand operations.
pub type DeckhandResult<T> = Result<T, DeckhandError>;

/// Why a wait stopped before the watched operation reached a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The caller cancelled its context.
    Cancelled,
    /// A deadline (caller-supplied or component ceiling) elapsed.
    DeadlineExceeded,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Coarse category of a [`DeckhandError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Aborted,
    Precondition,
    Upstream,
    Failed,
}

/// Errors returned by the monitor, promoter, and stream consumer.
///
/// `Aborted` means we stopped watching; `Failed` means the scheduler or job
/// reported a real failure. Neither `Precondition` nor `Upstream` is retried
/// inside deckhand.
#[derive(Debug, Clone, Error)]
pub enum DeckhandError {
    #[error("aborted ({reason}): {context}")]
    Aborted { reason: AbortReason, context: String },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("scheduler request failed: {0}")]
    Upstream(String),

    #[error("{0}")]
    Failed(String),
}

impl DeckhandError {
    /// Build an `Aborted` error with a description of what was being awaited.
    pub fn aborted(reason: AbortReason, context: impl Into<String>) -> Self {
        Self::Aborted {
            reason,
            context: context.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Aborted { .. } => ErrorKind::Aborted,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Failed(_) => ErrorKind::Failed,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.kind() == ErrorKind::Aborted
    }

    /// The abort reason, if this error is `Aborted`.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            Self::Aborted { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinguishable() {
        let aborted = DeckhandError::aborted(AbortReason::DeadlineExceeded, "evaluation e1");
        let failed = DeckhandError::Failed("evaluation e1 failed".into());

        assert_eq!(aborted.kind(), ErrorKind::Aborted);
        assert_eq!(failed.kind(), ErrorKind::Failed);
        assert!(aborted.is_aborted());
        assert!(!failed.is_aborted());
        assert_eq!(aborted.abort_reason(), Some(AbortReason::DeadlineExceeded));
        assert_eq!(failed.abort_reason(), None);
    }

    #[test]
    fn display_messages() {
        let err = DeckhandError::aborted(AbortReason::Cancelled, "job j1 stream");
        assert_eq!(err.to_string(), "aborted (cancelled): job j1 stream");

        let err = DeckhandError::Upstream("connection refused".into());
        assert_eq!(err.to_string(), "scheduler request failed: connection refused");
    }
}
