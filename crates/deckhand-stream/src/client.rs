//! The job stream seam.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures_core::Stream;
use futures_util::stream;
use tokio::sync::mpsc;

use deckhand_core::{DeckhandError, DeckhandResult};

use crate::event::JobProgressEvent;

/// A type-erased stream of decoded job events.
pub type JobEventStream = Pin<Box<dyn Stream<Item = DeckhandResult<JobProgressEvent>> + Send>>;

/// Boxed future alias for opening a stream.
pub type OpenFuture<'a> = Pin<Box<dyn Future<Output = DeckhandResult<JobEventStream>> + Send + 'a>>;

/// Opens the progress stream of one job.
pub trait JobStreamClient: Send + Sync {
    fn open<'a>(&'a self, job_id: &'a str) -> OpenFuture<'a>;
}

/// Stream the events received on `rx` until every sender is dropped.
pub fn channel_stream(rx: mpsc::UnboundedReceiver<JobProgressEvent>) -> JobEventStream {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, DeckhandError>(event), rx))
    }))
}

/// Hands out pre-registered streams, each at most once.
#[derive(Clone, Default)]
pub struct InMemoryJobStreams {
    streams: Arc<Mutex<HashMap<String, JobEventStream>>>,
}

impl InMemoryJobStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job_id: &str, stream: JobEventStream) {
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(job_id.to_string(), stream);
    }

    /// Register a fixed sequence of events.
    pub fn insert_events(&self, job_id: &str, events: Vec<JobProgressEvent>) {
        let events = events.into_iter().map(Ok::<_, DeckhandError>);
        self.insert(job_id, Box::pin(stream::iter(events)));
    }
}

impl JobStreamClient for InMemoryJobStreams {
    fn open<'a>(&'a self, job_id: &'a str) -> OpenFuture<'a> {
        Box::pin(async move {
            self.streams
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(job_id)
                .ok_or_else(|| DeckhandError::Upstream(format!("no stream for job {job_id}")))
        })
    }
}
