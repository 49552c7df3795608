//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every physical attempt with a deadline
//! - Cancel the in-flight call cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - An expired deadline is a retryable `Timeout` failure, distinct from network errors

use std::future::Future;
use std::time::Duration;

use crate::client::outcome::{Failure, FailureKind, Outcome};

/// Run one attempt under `deadline`.
pub async fn with_deadline<F>(deadline: Duration, attempt: F) -> Outcome
where
    F: Future<Output = Outcome>,
{
    match tokio::time::timeout(deadline, attempt).await {
        Ok(outcome) => outcome,
        Err(_) => Outcome::Failure(Failure::new(
            FailureKind::Timeout,
            format!("attempt exceeded {deadline:?}"),
        )),
    }
}
