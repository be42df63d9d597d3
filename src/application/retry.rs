//! Bounded retry with linear backoff, cancellable by a component lifetime.
//!
//! Reads that fail transiently are retried `max_retries` times. Retry `n`
//! waits `n * base_delay` before running. Every wait races the owning
//! component's [`Lifetime`], so a shut-down component never fires a late
//! retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::SyncError;
use crate::config::SyncConfig;
use crate::domain::foundation::DomainError;

/// How often and how patiently a read is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.max_retries, config.retry_base_delay())
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }

    /// First attempt plus every retry.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Runs `attempt` until it succeeds, retries run out, or `lifetime` ends.
    ///
    /// `attempt` receives the 1-based attempt number. Any per-failure side
    /// effect (clearing state, recording the error) belongs inside it.
    ///
    /// # Errors
    ///
    /// - `LoadFailed` with the last error once every attempt failed
    /// - `Cancelled` if the lifetime ends while waiting for a retry
    pub async fn run<T, F, Fut>(
        &self,
        lifetime: &Lifetime,
        resource: &'static str,
        mut attempt: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let mut number = 1;
        loop {
            match attempt(number).await {
                Ok(value) => {
                    if number > 1 {
                        tracing::info!(resource, attempt = number, "Read succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if number >= self.max_attempts() => {
                    tracing::error!(
                        resource,
                        attempts = number,
                        error = %error,
                        "Giving up after retries"
                    );
                    return Err(SyncError::LoadFailed {
                        resource,
                        attempts: number,
                        source: error,
                    });
                }
                Err(error) => {
                    let delay = self.delay_for(number);
                    tracing::warn!(
                        resource,
                        attempt = number,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Read failed, retrying"
                    );
                    if !lifetime.sleep(delay).await {
                        tracing::debug!(resource, "Retry cancelled by shutdown");
                        return Err(SyncError::Cancelled(resource));
                    }
                    number += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Cancellation scope of a component.
///
/// Clones share one switch: `shutdown` on any clone ends every pending
/// [`Lifetime::sleep`].
#[derive(Debug, Clone)]
pub struct Lifetime {
    cancel: Arc<watch::Sender<bool>>,
}

impl Lifetime {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            cancel: Arc::new(cancel),
        }
    }

    pub fn shutdown(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once `shutdown` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleeps for `delay`. Returns false if shut down first.
    pub async fn sleep(&self, delay: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancelled() => false,
        }
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}
