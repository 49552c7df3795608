//! Uniform call outcome.
//!
//! Every attempt and every call resolves to an [`Outcome`]: either a successful
//! payload (with the revision the remote echoed, if any) or a tagged [`Failure`].
//! Nothing escapes the executor as a panic or an untyped error.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Auth,
    Validation,
    NotFound,
    Conflict,
    RateLimited,
    ServerError,
    NetworkError,
    Timeout,
    CircuitOpen,
    Unknown,
}

impl FailureKind {
    /// Kinds that are retried locally before being surfaced.
    pub const TRANSIENT: [FailureKind; 4] = [
        FailureKind::RateLimited,
        FailureKind::ServerError,
        FailureKind::NetworkError,
        FailureKind::Timeout,
    ];

    pub fn is_transient(self) -> bool {
        Self::TRANSIENT.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Auth => "auth",
            FailureKind::Validation => "validation",
            FailureKind::NotFound => "not_found",
            FailureKind::Conflict => "conflict",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ServerError => "server_error",
            FailureKind::NetworkError => "network_error",
            FailureKind::Timeout => "timeout",
            FailureKind::CircuitOpen => "circuit_open",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed attempt or call.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub retryable: bool,
    /// Server-supplied minimum wait before the next attempt.
    pub retry_after: Option<Duration>,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    pub message: String,
    /// Set when the caller's cancellation signal aborted the call.
    pub cancelled: bool,
}

impl Failure {
    /// A failure whose retryability follows its kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.is_transient(),
            retry_after: None,
            status: None,
            message: message.into(),
            cancelled: false,
        }
    }

    pub fn circuit_open(endpoint: &str) -> Self {
        Self::new(
            FailureKind::CircuitOpen,
            format!("circuit open for endpoint '{endpoint}'"),
        )
    }

    pub fn rate_limited(wait_hint: Duration) -> Self {
        Self::new(FailureKind::RateLimited, "local rate limit exceeded")
            .with_retry_after(wait_hint)
    }

    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::new(FailureKind::Unknown, "cancelled")
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// A successful attempt or call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Success {
    pub payload: Value,
    pub revision: Option<String>,
}

/// The result of an attempt or of a whole call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success(Success),
    Failure(Failure),
}

impl Outcome {
    pub fn success(payload: Value, revision: Option<String>) -> Self {
        Outcome::Success(Success { payload, revision })
    }

    pub fn failure(failure: Failure) -> Self {
        Outcome::Failure(failure)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Outcome::Failure(f) => Some(f.kind),
            Outcome::Success(_) => None,
        }
    }

    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Failure(f) if f.cancelled => "cancelled",
            Outcome::Failure(f) => f.kind.as_str(),
        }
    }

    pub fn into_result(self) -> Result<Success, Failure> {
        match self {
            Outcome::Success(s) => Ok(s),
            Outcome::Failure(f) => Err(f),
        }
    }
}

impl From<Failure> for Outcome {
    fn from(failure: Failure) -> Self {
        Outcome::Failure(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_follows_kind() {
        for kind in FailureKind::TRANSIENT {
            assert!(Failure::new(kind, "x").retryable);
        }
        for kind in [
            FailureKind::Auth,
            FailureKind::Validation,
            FailureKind::NotFound,
            FailureKind::Conflict,
            FailureKind::CircuitOpen,
            FailureKind::Unknown,
        ] {
            assert!(!Failure::new(kind, "x").retryable);
        }
    }

    #[test]
    fn test_cancelled_is_distinguishable() {
        let failure = Failure::cancelled();
        assert_eq!(failure.kind, FailureKind::Unknown);
        assert!(!failure.retryable);
        assert!(failure.cancelled);
        assert_eq!(Outcome::from(failure).label(), "cancelled");
    }

    #[test]
    fn test_error_display() {
        let failure = Failure::new(FailureKind::NotFound, "work item 42 not found");
        assert_eq!(failure.to_string(), "not_found: work item 42 not found");
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&FailureKind::CircuitOpen).unwrap();
        assert_eq!(json, "\"circuit_open\"");
        let kind: FailureKind = serde_json::from_str("\"network_error\"").unwrap();
        assert_eq!(kind, FailureKind::NetworkError);
    }
}
