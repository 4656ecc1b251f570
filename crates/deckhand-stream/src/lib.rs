//! deckhand-stream: job progress streams, both ends.
//!
//! # Components
//!
//! - **`event`**: the wire union [`JobProgressEvent`] / [`TerminalEvent`]
//! - **`codec`**: NDJSON framing over any `AsyncBufRead`
//! - **`client`**: the [`JobStreamClient`] seam and in-memory streams
//! - **`consumer`**: [`JobStreamConsumer`], the receive loop
//! - **`render`**: [`TerminalRenderer`], terminal events onto a sink
//! - **`hint`**: the debounced idle-job hint
//! - **`forward`**: [`ForwardingSink`], sink calls onto the wire

pub mod client;
pub mod codec;
pub mod consumer;
pub mod event;
pub mod forward;
pub mod hint;
pub mod render;

pub use client::{InMemoryJobStreams, JobEventStream, JobStreamClient, OpenFuture, channel_stream};
pub use codec::{CodecError, decode_line, encode_event, ndjson_stream};
pub use consumer::JobStreamConsumer;
pub use event::{JobProgressEvent, JobStatus, TerminalEvent};
pub use forward::ForwardingSink;
pub use hint::HintTimer;
pub use render::TerminalRenderer;
