//! Replays `Terminal` events onto a [`ProgressSink`].
//!
//! Owns the client-side handles a stream refers to: the status line, the
//! open step group, live steps keyed by wire ID, and the raw writers. All
//! of them are created on first use.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use tracing::{debug, warn};

use deckhand_core::{ProgressSink, StatusLine, Step, StepGroup, StepStatus, Style, Table};

use crate::event::TerminalEvent;

type Writers = (Box<dyn Write + Send>, Box<dyn Write + Send>);

pub struct TerminalRenderer {
    sink: Arc<dyn ProgressSink>,
    status: Option<Box<dyn StatusLine>>,
    group: Option<Box<dyn StepGroup>>,
    steps: BTreeMap<u32, Box<dyn Step>>,
    writers: Option<Writers>,
}

impl TerminalRenderer {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            status: None,
            group: None,
            steps: BTreeMap::new(),
            writers: None,
        }
    }

    /// Number of steps currently open.
    pub fn live_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn apply(&mut self, event: TerminalEvent) {
        match event {
            TerminalEvent::Line { msg, style } => self.sink.output(&msg, style),
            TerminalEvent::NamedValues { values } => self.sink.named_values(&values),
            TerminalEvent::Status { msg, step, status } => self.status(&msg, step, status),
            TerminalEvent::Raw { data, stderr } => self.raw(&data, stderr),
            TerminalEvent::Table { headers, rows } => match Table::new(headers, rows) {
                Ok(table) => self.sink.table(&table),
                Err(err) => {
                    warn!(error = %err, "dropping malformed table");
                    self.sink
                        .output(&format!("Unable to render table: {err}"), Style::Error);
                }
            },
            TerminalEvent::StepGroup { close } => {
                self.close_group();
                if !close {
                    self.group = Some(self.sink.step_group());
                }
            }
            TerminalEvent::Step {
                id,
                msg,
                status,
                output,
                close,
            } => self.step(id, msg, status, output, close),
            TerminalEvent::Unknown => warn!("skipping unknown terminal event"),
        }
    }

    fn status(&mut self, msg: &str, step: bool, status: Option<StepStatus>) {
        if msg.is_empty() && !step {
            if let Some(mut line) = self.status.take() {
                line.close();
            }
            return;
        }
        let sink = &self.sink;
        let line = self.status.get_or_insert_with(|| sink.status());
        if step {
            line.step(status.unwrap_or(StepStatus::Success), msg);
        } else {
            line.update(msg);
        }
    }

    fn raw(&mut self, data: &[u8], stderr: bool) {
        if self.writers.is_none() {
            match self.sink.output_writers() {
                Ok(writers) => self.writers = Some(writers),
                Err(err) => {
                    warn!(error = %err, "output writers unavailable, dropping raw output");
                    return;
                }
            }
        }
        let Some((stdout, stderr_w)) = self.writers.as_mut() else {
            return;
        };
        let writer = if stderr { stderr_w } else { stdout };
        if let Err(err) = writer.write_all(data) {
            warn!(error = %err, stderr, "raw output write failed");
        }
    }

    fn step(
        &mut self,
        id: u32,
        msg: Option<String>,
        status: Option<StepStatus>,
        output: Option<Vec<u8>>,
        close: bool,
    ) {
        let Some(group) = self.group.as_mut() else {
            warn!(step = id, "step event outside any step group, ignoring");
            return;
        };

        let created = !self.steps.contains_key(&id);
        if created {
            if close && msg.is_none() && status.is_none() && output.is_none() {
                debug!(step = id, "close for a step never opened");
                return;
            }
            let handle = group.add(msg.as_deref().unwrap_or_default());
            self.steps.insert(id, handle);
        }
        let Some(step) = self.steps.get_mut(&id) else {
            return;
        };

        if let Some(msg) = msg.as_deref().filter(|_| !created) {
            step.update(msg);
        }
        let aborting = close && status == Some(StepStatus::Abort);
        if let Some(status) = status.filter(|_| !aborting) {
            step.status(status);
        }
        if let Some(bytes) = output {
            if let Err(err) = step.term_output().write_all(&bytes) {
                warn!(step = id, error = %err, "step output write failed");
            }
        }
        if close {
            if aborting {
                step.abort();
            } else {
                step.done();
            }
            self.steps.remove(&id);
        }
    }

    /// Wait for the open group, if any. Steps the stream left open are
    /// aborted first.
    fn close_group(&mut self) {
        for (id, mut step) in std::mem::take(&mut self.steps) {
            debug!(step = id, "aborting step left open by a replaced group");
            step.abort();
        }
        if let Some(mut group) = self.group.take() {
            group.wait();
        }
    }

    /// Release every handle at the end of a stream. Live steps are finished
    /// when the stream succeeded and aborted otherwise.
    pub fn finish(&mut self, succeeded: bool) {
        for (id, mut step) in std::mem::take(&mut self.steps) {
            debug!(step = id, succeeded, "finishing step left open by the stream");
            if succeeded {
                step.done();
            } else {
                step.abort();
            }
        }
        self.close_group();
        if let Some(mut line) = self.status.take() {
            line.close();
        }
        if let Some((mut stdout, mut stderr)) = self.writers.take() {
            let _ = stdout.flush();
            let _ = stderr.flush();
        }
    }
}
