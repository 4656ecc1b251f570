//! deckhand-monitor: narrate a scheduler evaluation until it settles.
//!
//! # Components
//!
//! - **`state`**: [`EvalState`] snapshots and the pure [`diff`] between them
//! - **`status`**: status parsing and continue/success/failure classification
//! - **`monitor`**: [`EvaluationMonitor`], the bounded polling loop
//!
//! # Narration rules
//!
//! For each allocation new since the previous poll: "modified" if it was
//! created before the evaluation, "created" if it is desired to run,
//! otherwise nothing. For each known allocation whose client status moved:
//! "status changed". The evaluation's own status change is narrated unless
//! it moves into `pending`.

pub mod monitor;
pub mod state;
pub mod status;

pub use monitor::EvaluationMonitor;
pub use state::{AllocState, EvalState, MonitorEvent, diff, short_id};
pub use status::{EvalStatus, Outcome, classify};
