//! Debounced "still queued" hint.
//!
//! A single-slot timer owned by the consumer. Arming replaces whatever was
//! armed before, every state transition disarms it, and dropping it cancels
//! it, so a stale or duplicate hint cannot fire after the job moved on.

use std::time::Duration;

use tokio::time::Instant;

use deckhand_core::JobState;

#[derive(Debug)]
pub struct HintTimer {
    delay: Duration,
    armed: Option<(Instant, JobState)>,
    shown: bool,
}

impl HintTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            armed: None,
            shown: false,
        }
    }

    /// React to a job state transition: disarm, then re-arm if the job is
    /// now idle waiting for a runner and no hint has been shown yet.
    pub fn transition(&mut self, state: JobState) {
        self.armed = None;
        if !self.shown && state.is_awaiting_runner() {
            self.armed = Some((Instant::now() + self.delay, state));
        }
    }

    pub fn cancel(&mut self) {
        self.armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Resolves with the state the hint is about once the delay elapses.
    /// Never resolves while disarmed. Cancel-safe.
    pub async fn fired(&mut self) -> JobState {
        let Some((at, state)) = self.armed else {
            return std::future::pending().await;
        };
        tokio::time::sleep_until(at).await;
        self.armed = None;
        self.shown = true;
        state
    }
}

/// The hint shown for a job idle in `state`.
pub fn hint_message(job_id: &str, state: JobState) -> String {
    let what = match state {
        JobState::Waiting => "is waiting for a runner",
        _ => "is queued waiting for a runner",
    };
    format!(
        "Job {job_id} {what}; this may take a while. \
         If you interrupt this command, the job will still run in the background."
    )
}
