//! Bounded polling for asynchronous backend mutations
//!
//! Attach, detach and power-state changes are accepted by the backend but
//! only eventually reflected in its state. The waiter refreshes the watched
//! object until one of the terminal states is reached, the backend reports an
//! error state, the poll/time bound is exceeded, or the request is cancelled.
//!
//! ```text
//! POLLING ──terminal state──▶ validate ──▶ TERMINAL_OK
//!    │  ╰──error state──────────────────▶ TERMINAL_ERROR (Remote)
//!    ╰──bound exceeded───────────────────▶ TIMEOUT (Remote)
//! ```

use crate::context::CancellationToken;
use crate::error::{BackendError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Polling bounds and backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Maximum number of refresh attempts
    pub max_polls: u32,

    /// Delay after the first unsuccessful poll
    pub interval_ms: u64,

    /// Upper bound for the delay between polls
    pub max_interval_ms: u64,

    /// Backoff multiplier applied per poll
    pub multiplier: f64,

    /// Wall-clock bound for the whole wait
    pub timeout_secs: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_polls: 60,
            interval_ms: 1000,
            max_interval_ms: 5000,
            multiplier: 1.5,
            timeout_secs: 300,
        }
    }
}

impl WaitConfig {
    /// Delay after the given zero-based poll
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.interval_ms as f64 * self.multiplier.powi(attempt as i32);
        (delay as u64).min(self.max_interval_ms)
    }
}

/// Something the waiter can inspect after each refresh
pub trait Watched {
    /// Backend-reported error detail when the object is in a failure state
    fn failure(&self) -> Option<String>;

    /// Human readable state, for logging
    fn state_label(&self) -> String;
}

/// A terminal-state predicate; the wait ends when any of them holds
pub type TerminalState<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Polls one backend object until it settles
pub struct Waiter {
    subject: String,
    config: WaitConfig,
    cancel: CancellationToken,
}

impl Waiter {
    pub fn new(subject: impl Into<String>, config: WaitConfig, cancel: CancellationToken) -> Self {
        Self {
            subject: subject.into(),
            config,
            cancel,
        }
    }

    fn cancelled(&self) -> BackendError {
        BackendError::Cancelled(format!("wait for {} was cancelled", self.subject))
    }

    /// Waits until `refresh` yields an object matching one of `terminal`.
    ///
    /// `validate` runs once on the terminal object; its error fails the wait.
    /// Refresh errors are retried within the same poll bound.
    pub async fn wait_until<T, R, Fut, V>(
        &self,
        mut refresh: R,
        terminal: &[TerminalState<T>],
        validate: V,
    ) -> Result<T>
    where
        T: Watched,
        R: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        V: FnOnce(&T) -> Result<()>,
    {
        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut last_error: Option<BackendError> = None;

        for poll in 1..=self.config.max_polls {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            let refreshed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                result = refresh() => result,
            };

            match refreshed {
                Ok(object) => {
                    if terminal.iter().any(|is_terminal| is_terminal(&object)) {
                        tracing::debug!(
                            "{} reached {} after {} poll(s)",
                            self.subject,
                            object.state_label(),
                            poll
                        );
                        validate(&object)?;
                        return Ok(object);
                    }

                    if let Some(detail) = object.failure() {
                        tracing::error!(
                            "{} entered error state {}: {}",
                            self.subject,
                            object.state_label(),
                            detail
                        );
                        return Err(BackendError::Remote(format!(
                            "{} failed in state {}: {}",
                            self.subject,
                            object.state_label(),
                            detail
                        )));
                    }

                    tracing::debug!(
                        "{} still in {} (poll {}/{})",
                        self.subject,
                        object.state_label(),
                        poll,
                        self.config.max_polls
                    );
                    last_error = None;
                }
                Err(err @ BackendError::Cancelled(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        "Refreshing {} failed (poll {}/{}): {}",
                        self.subject,
                        poll,
                        self.config.max_polls,
                        err
                    );
                    last_error = Some(err);
                }
            }

            if started.elapsed() >= timeout {
                break;
            }

            if poll < self.config.max_polls {
                let delay = Duration::from_millis(self.config.delay_for_attempt(poll - 1));
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(self.cancelled()),
                    _ = sleep(delay) => {}
                }
            }
        }

        Err(match last_error {
            Some(err) => BackendError::Remote(format!(
                "could not refresh {}: {}",
                self.subject, err
            )),
            None => BackendError::Remote(format!(
                "timed out waiting for {} after {:?}",
                self.subject,
                started.elapsed()
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_calculation() {
        let config = WaitConfig {
            max_polls: 5,
            interval_ms: 1000,
            max_interval_ms: 10000,
            multiplier: 2.0,
            timeout_secs: 60,
        };

        assert_eq!(config.delay_for_attempt(0), 1000);
        assert_eq!(config.delay_for_attempt(1), 2000);
        assert_eq!(config.delay_for_attempt(2), 4000);
        assert_eq!(config.delay_for_attempt(3), 8000);
        assert_eq!(config.delay_for_attempt(4), 10000); // capped at max
    }
}
