//! Cancellation utilities
//!
//! Provides first-class cancellation handles for calls, backoff waits and
//! event-stream sessions.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::NetworkError;

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a new cancel handle.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. The in-flight transport call is dropped, a
    /// pending backoff wait returns immediately and a parked refresh waiter
    /// leaves the queue.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Guard that cancels this handle when dropped.
    pub(crate) fn drop_guard(&self) -> tokio_util::sync::DropGuard {
        self.token.clone().drop_guard()
    }

    /// Run `future` unless cancellation is requested first.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, NetworkError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(NetworkError::Cancelled),
            out = future => Ok(out),
        }
    }

    /// Sleep for `delay`, returning early with `Cancelled` on cancellation.
    pub async fn sleep(&self, delay: Duration) -> Result<(), NetworkError> {
        self.run(tokio::time::sleep(delay)).await
    }
}
