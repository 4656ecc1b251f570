//! A headless sink that narrates through `tracing`.

use std::io::Write;

use tracing::{debug, error, info, warn};

use super::{NamedValue, ProgressSink, StatusLine, Step, StepGroup, StepStatus, Style, Table};

/// Renders progress as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn output(&self, line: &str, style: Style) {
        match style {
            Style::Warning => warn!(target: "deckhand::progress", "{line}"),
            Style::Error => error!(target: "deckhand::progress", "{line}"),
            _ => info!(target: "deckhand::progress", style = ?style, "{line}"),
        }
    }

    fn named_values(&self, values: &[NamedValue]) {
        for v in values {
            info!(target: "deckhand::progress", name = %v.name, value = %v.value, "value");
        }
    }

    fn table(&self, table: &Table) {
        let headers = table.headers().join(" | ");
        info!(target: "deckhand::progress", %headers, "table");
        for row in table.rows() {
            let cells: Vec<&str> = row.iter().map(|c| c.value.as_str()).collect();
            info!(target: "deckhand::progress", row = %cells.join(" | "), "table row");
        }
    }

    fn status(&self) -> Box<dyn StatusLine> {
        Box::new(LoggedStatus)
    }

    fn step_group(&self) -> Box<dyn StepGroup> {
        Box::new(LoggedGroup)
    }

    fn output_writers(&self) -> std::io::Result<(Box<dyn Write + Send>, Box<dyn Write + Send>)> {
        Ok((
            Box::new(LogWriter { stream: "stdout" }),
            Box::new(LogWriter { stream: "stderr" }),
        ))
    }
}

struct LoggedStatus;

impl StatusLine for LoggedStatus {
    fn update(&mut self, msg: &str) {
        info!(target: "deckhand::progress", "{msg}");
    }

    fn step(&mut self, status: StepStatus, msg: &str) {
        info!(target: "deckhand::progress", %status, "{msg}");
    }

    fn close(&mut self) {}
}

struct LoggedGroup;

impl StepGroup for LoggedGroup {
    fn add(&mut self, msg: &str) -> Box<dyn Step> {
        info!(target: "deckhand::progress", step = %msg, "step started");
        Box::new(LoggedStep {
            msg: msg.to_string(),
            writer: LogWriter { stream: "step" },
        })
    }

    fn wait(&mut self) {}
}

struct LoggedStep {
    msg: String,
    writer: LogWriter,
}

impl Step for LoggedStep {
    fn update(&mut self, msg: &str) {
        self.msg = msg.to_string();
        info!(target: "deckhand::progress", step = %self.msg, "step updated");
    }

    fn status(&mut self, status: StepStatus) {
        debug!(target: "deckhand::progress", step = %self.msg, %status, "step status");
    }

    fn term_output(&mut self) -> &mut dyn Write {
        &mut self.writer
    }

    fn done(&mut self) {
        info!(target: "deckhand::progress", step = %self.msg, "step done");
    }

    fn abort(&mut self) {
        warn!(target: "deckhand::progress", step = %self.msg, "step aborted");
    }
}

struct LogWriter {
    stream: &'static str,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        for line in text.lines() {
            info!(target: "deckhand::progress", stream = self.stream, "{line}");
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
