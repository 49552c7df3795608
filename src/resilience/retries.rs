//! Retry logic.
//!
//! # Responsibilities
//! - Re-invoke an operation on transient failure
//! - Wait with exponential backoff + jitter between attempts, honoring Retry-After
//! - Abort the wait when the caller cancels
//!
//! # Design Decisions
//! - Only failures flagged retryable AND listed in `retryable_kinds` are retried
//! - Conflicts are never retried here: a conflicting write must be rebuilt
//!   from the latest revision first (see `client::conflict`)
//! - When attempts run out the last failure is returned unchanged

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::client::outcome::{Failure, Outcome};
use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Retry policy for one logical call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        if self.config.enabled {
            self.config.max_retries
        } else {
            0
        }
    }

    /// Whether `failure` qualifies for another attempt.
    pub fn should_retry(&self, failure: &Failure) -> bool {
        failure.retryable
            && !failure.cancelled
            && self.config.retryable_kinds.contains(&failure.kind)
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out.
    ///
    /// `operation` receives the 0-based attempt number. It is invoked at most
    /// `max_retries() + 1` times.
    pub async fn execute<F, Fut>(&self, cancel: &CancellationToken, mut operation: F) -> Outcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let max_retries = self.max_retries();
        let mut attempt = 0;

        loop {
            let failure = match operation(attempt).await {
                Outcome::Success(success) => return Outcome::Success(success),
                Outcome::Failure(failure) => failure,
            };

            if !self.should_retry(&failure) || attempt >= max_retries {
                return Outcome::Failure(failure);
            }

            let delay = calculate_backoff(&self.config, attempt, failure.retry_after);
            tracing::info!(
                attempt,
                delay = ?delay,
                kind = %failure.kind,
                "Retrying after transient failure"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(attempt, "Retry wait cancelled");
                    return Outcome::Failure(Failure::cancelled());
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
