//! Scheduler client error types.

use deckhand_core::DeckhandError;
use thiserror::Error;

/// Errors returned by a [`crate::SchedulerClient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl From<SchedulerError> for DeckhandError {
    fn from(err: SchedulerError) -> Self {
        DeckhandError::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::ErrorKind;

    #[test]
    fn scheduler_errors_are_upstream() {
        let err: DeckhandError = SchedulerError::Request("503 Service Unavailable".into()).into();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.to_string().contains("503"));
    }
}
