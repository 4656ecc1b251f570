//! deckhand-scheduler: the scheduler as deckhand sees it.
//!
//! Defines the read-mostly [`SchedulerClient`] seam used by the evaluation
//! monitor and canary promoter, the records it returns, and an
//! [`InMemoryScheduler`] that scripts scheduler state over time.
//!
//! # Architecture
//!
//! ```text
//! SchedulerClient (Arc<dyn _>, owned by the caller)
//!   ├── reads:  evaluation, evaluation_allocations, jobs_by_prefix,
//!   │           job, latest_deployment
//!   └── writes: promote_groups, fail_deployment (never retried)
//! ```

pub mod client;
pub mod error;
pub mod memory;
pub mod types;

pub use client::{SchedulerClient, SchedulerFuture};
pub use error::{SchedulerError, SchedulerResult};
pub use memory::{InMemoryScheduler, Operation, WriteCall};
pub use types::*;
