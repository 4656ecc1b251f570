//! A sink that records every call, for assertions in tests and replays.

use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{NamedValue, ProgressSink, StatusLine, Step, StepGroup, StepStatus, Style, Table};

/// One recorded sink call.
///
/// Status lines, groups, and steps are numbered in creation order,
/// starting at 1, independently of each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Output { line: String, style: Style },
    NamedValues(Vec<NamedValue>),
    Table(Table),
    StatusOpened { status: u32 },
    StatusUpdate { status: u32, msg: String },
    StatusStep { status: u32, step: StepStatus, msg: String },
    StatusClosed { status: u32 },
    GroupOpened { group: u32 },
    GroupWaited { group: u32 },
    StepAdded { group: u32, step: u32, msg: String },
    StepUpdate { step: u32, msg: String },
    StepStatus { step: u32, status: StepStatus },
    StepOutput { step: u32, bytes: Vec<u8> },
    StepDone { step: u32 },
    StepAborted { step: u32 },
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

#[derive(Debug, Default)]
struct Shared {
    events: Mutex<Vec<SinkEvent>>,
    next_status: AtomicU32,
    next_group: AtomicU32,
    next_step: AtomicU32,
}

impl Shared {
    fn push(&self, event: SinkEvent) {
        lock(&self.events).push(event);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Records sink calls in order. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    shared: Arc<Shared>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every call recorded so far.
    pub fn events(&self) -> Vec<SinkEvent> {
        lock(&self.shared.events).clone()
    }

    /// Text of every `output` call, in order.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.shared.events)
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Output { line, .. } => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of output lines containing `needle`.
    pub fn count_lines_containing(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }

    /// Messages of every step added, in order.
    pub fn step_messages(&self) -> Vec<String> {
        lock(&self.shared.events)
            .iter()
            .filter_map(|e| match e {
                SinkEvent::StepAdded { msg, .. } | SinkEvent::StepUpdate { msg, .. } => {
                    Some(msg.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.shared.events).clear();
    }
}

impl ProgressSink for RecordingSink {
    fn output(&self, line: &str, style: Style) {
        self.shared.push(SinkEvent::Output {
            line: line.to_string(),
            style,
        });
    }

    fn named_values(&self, values: &[NamedValue]) {
        self.shared.push(SinkEvent::NamedValues(values.to_vec()));
    }

    fn table(&self, table: &Table) {
        self.shared.push(SinkEvent::Table(table.clone()));
    }

    fn status(&self) -> Box<dyn StatusLine> {
        let id = self.shared.next_status.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.push(SinkEvent::StatusOpened { status: id });
        Box::new(RecordedStatus {
            id,
            shared: self.shared.clone(),
        })
    }

    fn step_group(&self) -> Box<dyn StepGroup> {
        let id = self.shared.next_group.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.push(SinkEvent::GroupOpened { group: id });
        Box::new(RecordedGroup {
            id,
            shared: self.shared.clone(),
        })
    }

    fn output_writers(&self) -> std::io::Result<(Box<dyn Write + Send>, Box<dyn Write + Send>)> {
        Ok((
            Box::new(RecordedWriter {
                stderr: false,
                shared: self.shared.clone(),
            }),
            Box::new(RecordedWriter {
                stderr: true,
                shared: self.shared.clone(),
            }),
        ))
    }
}

struct RecordedStatus {
    id: u32,
    shared: Arc<Shared>,
}

impl StatusLine for RecordedStatus {
    fn update(&mut self, msg: &str) {
        self.shared.push(SinkEvent::StatusUpdate {
            status: self.id,
            msg: msg.to_string(),
        });
    }

    fn step(&mut self, step: StepStatus, msg: &str) {
        self.shared.push(SinkEvent::StatusStep {
            status: self.id,
            step,
            msg: msg.to_string(),
        });
    }

    fn close(&mut self) {
        self.shared.push(SinkEvent::StatusClosed { status: self.id });
    }
}

struct RecordedGroup {
    id: u32,
    shared: Arc<Shared>,
}

impl StepGroup for RecordedGroup {
    fn add(&mut self, msg: &str) -> Box<dyn Step> {
        let step = self.shared.next_step.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.push(SinkEvent::StepAdded {
            group: self.id,
            step,
            msg: msg.to_string(),
        });
        Box::new(RecordedStep {
            writer: StepWriter {
                step,
                shared: self.shared.clone(),
            },
        })
    }

    fn wait(&mut self) {
        self.shared.push(SinkEvent::GroupWaited { group: self.id });
    }
}

struct RecordedStep {
    writer: StepWriter,
}

struct StepWriter {
    step: u32,
    shared: Arc<Shared>,
}

impl Write for StepWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.shared.push(SinkEvent::StepOutput {
            step: self.step,
            bytes: buf.to_vec(),
        });
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Step for RecordedStep {
    fn update(&mut self, msg: &str) {
        self.writer.shared.push(SinkEvent::StepUpdate {
            step: self.writer.step,
            msg: msg.to_string(),
        });
    }

    fn status(&mut self, status: StepStatus) {
        self.writer.shared.push(SinkEvent::StepStatus {
            step: self.writer.step,
            status,
        });
    }

    fn term_output(&mut self) -> &mut dyn Write {
        &mut self.writer
    }

    fn done(&mut self) {
        self.writer.shared.push(SinkEvent::StepDone {
            step: self.writer.step,
        });
    }

    fn abort(&mut self) {
        self.writer.shared.push(SinkEvent::StepAborted {
            step: self.writer.step,
        });
    }
}

struct RecordedWriter {
    stderr: bool,
    shared: Arc<Shared>,
}

impl Write for RecordedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let bytes = buf.to_vec();
        self.shared.push(if self.stderr {
            SinkEvent::Stderr(bytes)
        } else {
            SinkEvent::Stdout(bytes)
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

    #[test]
    fn records_calls_in_order() {
        let sink = RecordingSink::new();
        sink.output("hello", Style::Header);
        let mut group = sink.step_group();
        let mut step = group.add("deploying");
        step.term_output().write_all(b"log line").unwrap();
        step.done();
        group.wait();

        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::Output {
                    line: "hello".into(),
                    style: Style::Header
                },
                SinkEvent::GroupOpened { group: 1 },
                SinkEvent::StepAdded {
                    group: 1,
                    step: 1,
                    msg: "deploying".into()
                },
                SinkEvent::StepOutput {
                    step: 1,
                    bytes: b"log line".to_vec()
                },
                SinkEvent::StepDone { step: 1 },
                SinkEvent::GroupWaited { group: 1 },
            ]
        );
    }

    #[test]
    fn clones_share_the_log() {
        let sink = RecordingSink::new();
        let other = sink.clone();
        other.output("from clone", Style::Info);
        assert_eq!(sink.lines(), vec!["from clone".to_string()]);
        assert_eq!(sink.count_lines_containing("clone"), 1);
    }

    #[test]
    fn writers_split_streams() {
        let sink = RecordingSink::new();
        let (mut out, mut err) = sink.output_writers().unwrap();
        out.write_all(b"o").unwrap();
        err.write_all(b"e").unwrap();
        assert_eq!(
            sink.events(),
            vec![SinkEvent::Stdout(b"o".to_vec()), SinkEvent::Stderr(b"e".to_vec())]
        );
    }
}
