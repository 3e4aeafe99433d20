//! Per-request context and cooperative cancellation
//!
//! The boundary layer creates one `RequestContext` per inbound request and
//! cancels its token when the caller gives up. Waits observe the token
//! between polls and while a refresh call or a sleep is in flight.

use std::sync::Arc;
use tokio::sync::watch;

/// A cooperative, awaitable cancellation token.
///
/// Clones share state: cancelling any clone cancels all of them.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Context threaded through every adapter call
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Label used in log lines (request id, CLI command, ...)
    pub label: String,

    /// Cancelled when the caller abandons the request
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
