//! Job stream consumer: renders one job's progress stream.
//!
//! ```text
//!   JobStreamClient::open ──► stream ──► Open? ──► loop ─┬─ StateTransition ─► HintTimer
//!                                                        ├─ Terminal ────────► TerminalRenderer ─► ProgressSink
//!                                                        └─ Complete / Error ─► result
//!   ctx.done() ─────────────────────────────────────────► Aborted
//! ```
//!
//! The receive loop, the hint timer, and cancellation are one `select!`;
//! nothing is spawned, so nothing outlives `watch`.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, info, warn};

use deckhand_core::{
    AbortReason, Context, DeckhandError, DeckhandResult, JobState, ProgressSink, StreamSettings,
    Style,
};

use crate::client::{JobEventStream, JobStreamClient};
use crate::event::JobProgressEvent;
use crate::hint::{HintTimer, hint_message};
use crate::render::TerminalRenderer;

/// What woke the receive loop.
enum Wake {
    Aborted(AbortReason),
    Hint(JobState),
    Event(Option<DeckhandResult<JobProgressEvent>>),
}

pub struct JobStreamConsumer {
    client: Arc<dyn JobStreamClient>,
    sink: Arc<dyn ProgressSink>,
    settings: StreamSettings,
}

impl JobStreamConsumer {
    pub fn new(client: Arc<dyn JobStreamClient>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            client,
            sink,
            settings: StreamSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: StreamSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Render `job_id`'s stream until it completes.
    ///
    /// `Ok(())` only for a `Complete` event without an error. A job-reported
    /// error is returned decoded; a stream that does not start with `Open`
    /// or ends without a verdict is a `Precondition` error.
    pub async fn watch(&self, ctx: &Context, job_id: &str) -> DeckhandResult<()> {
        info!(%job_id, "watching job stream");
        let mut stream = tokio::select! {
            biased;
            reason = ctx.done() => {
                return Err(DeckhandError::aborted(
                    reason,
                    format!("opening stream for job {job_id}"),
                ));
            }
            opened = self.client.open(job_id) => opened?,
        };

        let mut renderer = TerminalRenderer::new(self.sink.clone());
        let mut hint = HintTimer::new(self.settings.hint_delay);

        let result = self
            .receive(ctx, job_id, &mut stream, &mut renderer, &mut hint)
            .await;

        hint.cancel();
        renderer.finish(result.is_ok());
        match &result {
            Ok(()) => info!(%job_id, "job completed"),
            Err(err) => warn!(%job_id, error = %err, "job stream ended with error"),
        }
        result
    }

    async fn receive(
        &self,
        ctx: &Context,
        job_id: &str,
        stream: &mut JobEventStream,
        renderer: &mut TerminalRenderer,
        hint: &mut HintTimer,
    ) -> DeckhandResult<()> {
        let mut opened = false;
        loop {
            let wake = tokio::select! {
                biased;
                reason = ctx.done() => Wake::Aborted(reason),
                state = hint.fired() => Wake::Hint(state),
                next = stream.next() => Wake::Event(next),
            };

            let event = match wake {
                Wake::Aborted(reason) => {
                    return Err(DeckhandError::aborted(
                        reason,
                        format!("watching job {job_id}"),
                    ));
                }
                Wake::Hint(state) => {
                    debug!(%job_id, %state, "showing idle job hint");
                    self.sink.output(&hint_message(job_id, state), Style::Info);
                    continue;
                }
                Wake::Event(None) => {
                    return Err(DeckhandError::Precondition(if opened {
                        format!("stream for job {job_id} ended without a completion event")
                    } else {
                        format!("stream for job {job_id} ended before it was opened")
                    }));
                }
                Wake::Event(Some(event)) => event?,
            };

            if !opened {
                if event != JobProgressEvent::Open {
                    return Err(DeckhandError::Precondition(format!(
                        "stream for job {job_id} started with {:?} instead of open",
                        event.kind()
                    )));
                }
                debug!(%job_id, "job stream opened");
                opened = true;
                continue;
            }

            match event {
                JobProgressEvent::Open => {
                    warn!(%job_id, "ignoring repeated open event");
                }
                JobProgressEvent::StateTransition { current } => {
                    debug!(%job_id, state = %current, "job state changed");
                    hint.transition(current);
                }
                JobProgressEvent::Terminal { events } => {
                    for event in events {
                        renderer.apply(event);
                    }
                }
                JobProgressEvent::Complete { error: None } => return Ok(()),
                JobProgressEvent::Complete {
                    error: Some(status),
                }
                | JobProgressEvent::Error { status } => {
                    return Err(status.into_error(job_id));
                }
                JobProgressEvent::Unknown => {
                    warn!(%job_id, "skipping unknown job event");
                }
            }
        }
    }
}
