//! Producer side of a job stream.
//!
//! [`ForwardingSink`] implements [`ProgressSink`] by encoding each call as a
//! `Terminal` event on a channel, so narration produced next to the
//! scheduler can be re-rendered by a [`JobStreamConsumer`] elsewhere.
//!
//! [`JobStreamConsumer`]: crate::consumer::JobStreamConsumer

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use deckhand_core::{
    DeckhandResult, JobState, NamedValue, ProgressSink, StatusLine, Step, StepGroup, StepStatus,
    Style, Table,
};

use crate::client::{JobEventStream, channel_stream};
use crate::event::{JobProgressEvent, JobStatus, TerminalEvent};

#[derive(Debug)]
struct Shared {
    tx: mpsc::UnboundedSender<JobProgressEvent>,
    next_step: AtomicU32,
}

impl Shared {
    fn send(&self, event: JobProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!("job stream receiver gone, dropping event");
        }
    }

    fn terminal(&self, event: TerminalEvent) {
        self.send(JobProgressEvent::terminal(event));
    }
}

/// Encodes sink calls onto a job stream. Clones share the channel and the
/// step ID sequence.
#[derive(Debug, Clone)]
pub struct ForwardingSink {
    shared: Arc<Shared>,
}

impl ForwardingSink {
    pub fn new(tx: mpsc::UnboundedSender<JobProgressEvent>) -> Self {
        Self {
            shared: Arc::new(Shared {
                tx,
                next_step: AtomicU32::new(0),
            }),
        }
    }

    /// A sink plus the stream of the events it produces.
    pub fn channel() -> (Self, JobEventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), channel_stream(rx))
    }

    pub fn open(&self) {
        self.shared.send(JobProgressEvent::Open);
    }

    pub fn transition(&self, state: JobState) {
        self.shared
            .send(JobProgressEvent::StateTransition { current: state });
    }

    /// Terminate the stream with the job's outcome.
    pub fn complete<T>(&self, result: &DeckhandResult<T>) {
        let error = result.as_ref().err().map(JobStatus::from);
        self.shared.send(JobProgressEvent::Complete { error });
    }
}

impl ProgressSink for ForwardingSink {
    fn output(&self, line: &str, style: Style) {
        self.shared.terminal(TerminalEvent::Line {
            msg: line.to_string(),
            style,
        });
    }

    fn named_values(&self, values: &[NamedValue]) {
        self.shared.terminal(TerminalEvent::NamedValues {
            values: values.to_vec(),
        });
    }

    fn table(&self, table: &Table) {
        self.shared.terminal(TerminalEvent::Table {
            headers: table.headers().to_vec(),
            rows: table.rows().to_vec(),
        });
    }

    fn status(&self) -> Box<dyn StatusLine> {
        Box::new(ForwardedStatus {
            shared: self.shared.clone(),
        })
    }

    fn step_group(&self) -> Box<dyn StepGroup> {
        self.shared.terminal(TerminalEvent::StepGroup { close: false });
        Box::new(ForwardedGroup {
            shared: self.shared.clone(),
        })
    }

    fn output_writers(&self) -> std::io::Result<(Box<dyn Write + Send>, Box<dyn Write + Send>)> {
        Ok((
            Box::new(RawWriter {
                stderr: false,
                shared: self.shared.clone(),
            }),
            Box::new(RawWriter {
                stderr: true,
                shared: self.shared.clone(),
            }),
        ))
    }
}

struct ForwardedStatus {
    shared: Arc<Shared>,
}

impl StatusLine for ForwardedStatus {
    fn update(&mut self, msg: &str) {
        self.shared.terminal(TerminalEvent::Status {
            msg: msg.to_string(),
            step: false,
            status: None,
        });
    }

    fn step(&mut self, status: StepStatus, msg: &str) {
        self.shared.terminal(TerminalEvent::Status {
            msg: msg.to_string(),
            step: true,
            status: Some(status),
        });
    }

    fn close(&mut self) {
        self.shared.terminal(TerminalEvent::Status {
            msg: String::new(),
            step: false,
            status: None,
        });
    }
}

struct ForwardedGroup {
    shared: Arc<Shared>,
}

impl StepGroup for ForwardedGroup {
    fn add(&mut self, msg: &str) -> Box<dyn Step> {
        let id = self.shared.next_step.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.terminal(TerminalEvent::step_message(id, msg));
        Box::new(ForwardedStep {
            writer: StepWriter {
                id,
                shared: self.shared.clone(),
            },
        })
    }

    fn wait(&mut self) {
        self.shared.terminal(TerminalEvent::StepGroup { close: true });
    }
}

struct StepWriter {
    id: u32,
    shared: Arc<Shared>,
}

impl StepWriter {
    fn send(&self, status: Option<StepStatus>, output: Option<Vec<u8>>, close: bool) {
        self.shared.terminal(TerminalEvent::Step {
            id: self.id,
            msg: None,
            status,
            output,
            close,
        });
    }
}

impl Write for StepWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.send(None, Some(buf.to_vec()), false);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct ForwardedStep {
    writer: StepWriter,
}

impl Step for ForwardedStep {
    fn update(&mut self, msg: &str) {
        self.writer
            .shared
            .terminal(TerminalEvent::step_message(self.writer.id, msg));
    }

    fn status(&mut self, status: StepStatus) {
        self.writer.send(Some(status), None, false);
    }

    fn term_output(&mut self) -> &mut dyn Write {
        &mut self.writer
    }

    fn done(&mut self) {
        self.writer.send(None, None, true);
    }

    fn abort(&mut self) {
        self.writer.send(Some(StepStatus::Abort), None, true);
    }
}

struct RawWriter {
    stderr: bool,
    shared: Arc<Shared>,
}

impl Write for RawWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.shared.terminal(TerminalEvent::Raw {
            data: buf.to_vec(),
            stderr: self.stderr,
        });
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn encodes_steps_with_sequential_ids() {
        let (sink, stream) = ForwardingSink::channel();
        sink.open();
        let mut group = sink.step_group();
        let mut first = group.add("one");
        let mut second = group.add("two");
        second.status(StepStatus::Timeout);
        second.abort();
        first.done();
        group.wait();
        drop(sink);
        drop((group, first, second));

        let events: Vec<_> = stream.map(|e| e.unwrap()).collect().await;
        let terminal: Vec<TerminalEvent> = events
            .into_iter()
            .skip(1)
            .flat_map(|e| match e {
                JobProgressEvent::Terminal { events } => events,
                other => panic!("unexpected {other:?}"),
            })
            .collect();

        assert_eq!(
            terminal,
            vec![
                TerminalEvent::StepGroup { close: false },
                TerminalEvent::step_message(1, "one"),
                TerminalEvent::step_message(2, "two"),
                TerminalEvent::Step {
                    id: 2,
                    msg: None,
                    status: Some(StepStatus::Timeout),
                    output: None,
                    close: false
                },
                TerminalEvent::Step {
                    id: 2,
                    msg: None,
                    status: Some(StepStatus::Abort),
                    output: None,
                    close: true
                },
                TerminalEvent::step_close(1),
                TerminalEvent::StepGroup { close: true },
            ]
        );
    }

    #[test]
    fn complete_carries_the_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ForwardingSink::new(tx);
        sink.complete::<()>(&Err(deckhand_core::DeckhandError::Failed("boom".into())));

        let Ok(JobProgressEvent::Complete { error: Some(status) }) = rx.try_recv() else {
            panic!("expected a failed completion");
        };
        assert!(status.message.contains("boom"));
    }
}
