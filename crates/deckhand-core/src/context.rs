//! Caller context: a cancellation signal plus an optional deadline.
//!
//! Every blocking wait in deckhand selects on [`Context::done`], so dropping
//! the work is never the only way to stop it.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::AbortReason;

/// Cancellation scope handed to every blocking entry point.
///
/// Cheap to clone; clones observe the same cancellation signal.
#[derive(Debug, Clone)]
pub struct Context {
    cancel: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Cancels every [`Context`] derived from the one it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        Self {
            cancel: rx,
            deadline: None,
        }
    }

    /// A context plus the handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                cancel: rx,
                deadline: None,
            },
            CancelHandle { tx },
        )
    }

    /// Derive a context that also expires after `timeout`.
    ///
    /// A deadline can only be narrowed, never extended.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Reason this context is already done, if it is.
    pub fn err(&self) -> Option<AbortReason> {
        if self.is_cancelled() {
            return Some(AbortReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(AbortReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> AbortReason {
        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            loop {
                if *cancel.borrow_and_update() {
                    return;
                }
                if cancel.changed().await.is_err() {
                    // Sender gone without cancelling: never fires.
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = cancelled => AbortReason::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => AbortReason::DeadlineExceeded,
                }
            }
            None => {
                cancelled.await;
                AbortReason::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_is_never_done() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        let res = tokio::time::timeout(Duration::from_millis(20), ctx.done()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (ctx, handle) = Context::with_cancel();
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.done().await }
        });
        handle.cancel();
        assert_eq!(waiter.await.unwrap(), AbortReason::Cancelled);
        assert_eq!(ctx.err(), Some(AbortReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_expires() {
        let ctx = Context::background().with_timeout(Duration::from_secs(10));
        assert!(ctx.err().is_none());
        assert_eq!(ctx.done().await, AbortReason::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(AbortReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_only_narrows() {
        let short = Context::background().with_timeout(Duration::from_secs(5));
        let widened = short.with_timeout(Duration::from_secs(60));
        assert_eq!(widened.deadline(), short.deadline());

        let narrowed = short.with_timeout(Duration::from_secs(1));
        assert!(narrowed.deadline().unwrap() < short.deadline().unwrap());
    }
}
