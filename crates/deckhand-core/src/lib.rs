//! deckhand-core: the contract shared by deckhand's monitors and stream
//! consumer.
//!
//! # Components
//!
//! - **`sink`**: the [`ProgressSink`] abstraction plus recording and
//!   tracing-backed implementations
//! - **`job`**: top-level job states carried on the job stream
//! - **`error`**: the `Aborted` / `Precondition` / `Upstream` / `Failed`
//!   taxonomy
//! - **`context`**: cancellation and deadlines for blocking calls
//! - **`config`** / **`logging`**: deckhand.toml and tracing setup

pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod logging;
pub mod sink;

pub use config::{
    CanarySettings, DeckhandConfig, MonitorSettings, StreamSettings, parse_duration,
};
pub use context::{CancelHandle, Context};
pub use error::{AbortReason, DeckhandError, DeckhandResult, ErrorKind};
pub use job::JobState;
pub use logging::LogConfig;
pub use sink::{
    NamedValue, ProgressSink, RecordingSink, SinkEvent, StatusLine, Step, StepGroup, StepStatus,
    Style, Table, TableEntry, TableShapeError, TracingSink,
};
