//! The progress sink contract.
//!
//! Components never render anything themselves; they narrate through a
//! [`ProgressSink`]. A terminal, a log, or a job-stream encoder can sit
//! behind it.
//!
//! # Shape
//!
//! ```text
//! ProgressSink
//!   ├── output / named_values / table      one-shot lines
//!   ├── status()      → StatusLine         single mutable line
//!   ├── step_group()  → StepGroup          concurrently running steps
//!   │                    └── add() → Step  message, status, raw output
//!   └── output_writers()                   raw stdout / stderr
//! ```
//!
//! All calls are synchronous and must not block for long: they are made
//! from async tasks.

use std::io::Write;

use serde::{Deserialize, Serialize};

pub mod recording;
pub mod tracing_sink;

pub use recording::{RecordingSink, SinkEvent};
pub use tracing_sink::TracingSink;

/// Visual style of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Header,
    Info,
    Success,
    Warning,
    Error,
    #[default]
    #[serde(other)]
    Plain,
}

/// Status of a step or a status-line step transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Success,
    Warning,
    Error,
    Timeout,
    Abort,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Abort => "abort",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a key/value block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: String,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One table cell.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableEntry {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl TableEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            color: None,
        }
    }
}

/// A table whose rows all have exactly one cell per header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<TableEntry>>,
}

/// A row whose cell count does not match the header count.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("table row {row} has {cells} cells, expected {headers}")]
pub struct TableShapeError {
    pub row: usize,
    pub cells: usize,
    pub headers: usize,
}

impl Table {
    pub fn new(
        headers: Vec<String>,
        rows: Vec<Vec<TableEntry>>,
    ) -> Result<Self, TableShapeError> {
        for (index, row) in rows.iter().enumerate() {
            if row.len() != headers.len() {
                return Err(TableShapeError {
                    row: index,
                    cells: row.len(),
                    headers: headers.len(),
                });
            }
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<TableEntry>] {
        &self.rows
    }
}

/// A sink for human-readable progress.
pub trait ProgressSink: Send + Sync {
    fn output(&self, line: &str, style: Style);

    fn named_values(&self, values: &[NamedValue]);

    fn table(&self, table: &Table);

    /// Open a new mutable status line.
    fn status(&self) -> Box<dyn StatusLine>;

    /// Open a new group of concurrently running steps.
    fn step_group(&self) -> Box<dyn StepGroup>;

    /// Writers for raw stdout and stderr bytes.
    fn output_writers(&self) -> std::io::Result<(Box<dyn Write + Send>, Box<dyn Write + Send>)>;
}

/// A single mutable status line.
pub trait StatusLine: Send {
    fn update(&mut self, msg: &str);

    /// Finish the current message with `status` and show `msg`.
    fn step(&mut self, status: StepStatus, msg: &str);

    fn close(&mut self);
}

/// A set of steps rendered together.
pub trait StepGroup: Send {
    fn add(&mut self, msg: &str) -> Box<dyn Step>;

    /// Wait until every step added to this group is done or aborted.
    fn wait(&mut self);
}

/// One step inside a [`StepGroup`].
pub trait Step: Send {
    fn update(&mut self, msg: &str);

    fn status(&mut self, status: StepStatus);

    /// Writer for terminal output attributed to this step.
    fn term_output(&mut self) -> &mut dyn Write;

    fn done(&mut self);

    fn abort(&mut self);
}
