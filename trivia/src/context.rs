//! Per-request deadline and cancellation.
//!
//! Every inbound request owns a [`RequestContext`]. Work that may suspend on
//! behalf of the request (the outbound call, waiting for the cache lock) is
//! driven through [`RequestContext::run`], which abandons it as soon as the
//! context is canceled or its deadline passes. Abandoning drops the inner
//! future, so any lock guard or connection it holds is released.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("request canceled")]
    Canceled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Clone, Debug)]
pub struct RequestContext {
    deadline: Option<Instant>,
    canceled: watch::Receiver<bool>,
}

/// Cancels the [`RequestContext`] it was created with, and every clone of it.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl RequestContext {
    /// A context that is never canceled and has no deadline.
    pub fn background() -> Self {
        // With the sender gone the receiver can never observe `true`.
        let (_tx, rx) = watch::channel(false);
        RequestContext {
            deadline: None,
            canceled: rx,
        }
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = RequestContext {
            deadline: None,
            canceled: rx,
        };
        (ctx, CancelHandle(tx))
    }

    /// Returns a copy whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        RequestContext {
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
            canceled: self.canceled.clone(),
        }
    }

    /// Returns the reason this context is done, if it is.
    pub fn err(&self) -> Option<ContextError> {
        if *self.canceled.borrow() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Drives `fut` to completion unless the context finishes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }

        let mut canceled = self.canceled.clone();
        let cancellation = async move {
            let sender_gone = canceled.wait_for(|c| *c).await.is_err();
            if sender_gone {
                // Sender dropped without canceling: this context can no longer be canceled.
                std::future::pending::<()>().await;
            }
        };

        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancellation => Err(ContextError::Canceled),
            _ = expiry => Err(ContextError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}
