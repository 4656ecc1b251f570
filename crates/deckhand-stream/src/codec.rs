//! Newline-delimited JSON framing for job progress events.
//!
//! One event per line. Blank lines are skipped so keep-alive newlines from a
//! transport do not count as protocol errors.

use futures_util::stream;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use deckhand_core::DeckhandError;

use crate::client::JobEventStream;
use crate::event::JobProgressEvent;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("line {line}: malformed job event: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode job event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("job stream read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CodecError> for DeckhandError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(_) => DeckhandError::Upstream(err.to_string()),
            CodecError::Decode { .. } | CodecError::Encode(_) => {
                DeckhandError::Precondition(err.to_string())
            }
        }
    }
}

/// Encode one event as a single line, newline included.
pub fn encode_event(event: &JobProgressEvent) -> Result<String, CodecError> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line. `line_no` is only used in the error.
pub fn decode_line(line: &str, line_no: usize) -> Result<JobProgressEvent, CodecError> {
    serde_json::from_str(line.trim()).map_err(|source| CodecError::Decode {
        line: line_no,
        source,
    })
}

/// Adapt a reader of NDJSON into a job event stream.
///
/// The stream ends at EOF or after yielding the first error.
pub fn ndjson_stream<R>(reader: R) -> JobEventStream
where
    R: AsyncBufRead + Send + Unpin + 'static,
{
    struct State<R> {
        lines: tokio::io::Lines<R>,
        line_no: usize,
        failed: bool,
    }

    let state = State {
        lines: reader.lines(),
        line_no: 0,
        failed: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }
        loop {
            let next = match state.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(err) => {
                    state.failed = true;
                    return Some((Err(DeckhandError::from(CodecError::from(err))), state));
                }
            };
            state.line_no += 1;
            if next.trim().is_empty() {
                continue;
            }
            let decoded = decode_line(&next, state.line_no).map_err(DeckhandError::from);
            state.failed = decoded.is_err();
            return Some((decoded, state));
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::{ErrorKind, JobState};
    use futures_util::StreamExt;

    #[test]
    fn encoded_event_is_one_line() {
        let line = encode_event(&JobProgressEvent::StateTransition {
            current: JobState::Queued,
        })
        .unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(
            line.trim(),
            r#"{"type":"state_transition","current":"queued"}"#
        );
    }

    #[test]
    fn decode_error_names_the_line() {
        let err = decode_line("{not json", 7).unwrap_err();
        assert!(err.to_string().starts_with("line 7:"));
        assert_eq!(DeckhandError::from(err).kind(), ErrorKind::Precondition);
    }

    #[tokio::test]
    async fn stream_skips_blank_lines_and_stops_after_error() {
        let input = b"{\"type\":\"open\"}\n\n{\"type\":\"complete\"}\ngarbage\n{\"type\":\"open\"}\n";
        let events: Vec<_> = ndjson_stream(&input[..]).collect().await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].as_ref().unwrap(), &JobProgressEvent::Open);
        assert_eq!(
            events[1].as_ref().unwrap(),
            &JobProgressEvent::Complete { error: None }
        );
        let err = events[2].as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().contains("line 4"));
    }
}
