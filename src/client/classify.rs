//! Map raw transport results onto [`Outcome`]s.
//!
//! | Input                         | Outcome                                   |
//! |-------------------------------|-------------------------------------------|
//! | 2xx                           | Success (body as JSON, revision = ETag)   |
//! | 401, 403                      | Auth                                      |
//! | 400, 422                      | Validation                                |
//! | 404                           | NotFound                                  |
//! | 408                           | Timeout (retryable)                       |
//! | 409, 412                      | Conflict                                  |
//! | 429                           | RateLimited (retryable, Retry-After hint) |
//! | 5xx                           | ServerError (retryable)                   |
//! | timeout / connect / I/O error | Timeout or NetworkError (retryable)       |
//! | anything else                 | Unknown                                   |

use std::time::Duration;

use serde_json::Value;

use crate::client::outcome::{Failure, FailureKind, Outcome};
use crate::client::transport::{RawResponse, TransportError};

/// Longest body excerpt kept in a failure message.
const MESSAGE_EXCERPT: usize = 200;

pub fn classify(result: Result<RawResponse, TransportError>) -> Outcome {
    match result {
        Ok(response) => classify_response(response),
        Err(error) => Outcome::Failure(classify_error(&error)),
    }
}

pub fn classify_error(error: &TransportError) -> Failure {
    let kind = match error {
        TransportError::Timeout(_) => FailureKind::Timeout,
        TransportError::Connect(_) | TransportError::Io(_) => FailureKind::NetworkError,
        TransportError::InvalidRequest(_) => FailureKind::Unknown,
    };
    Failure::new(kind, error.to_string())
}

pub fn classify_response(response: RawResponse) -> Outcome {
    let status = response.status;
    if (200..300).contains(&status) {
        let revision = response.header("etag").map(str::to_string);
        return Outcome::success(parse_body(&response.body), revision);
    }

    let kind = match status {
        401 | 403 => FailureKind::Auth,
        400 | 422 => FailureKind::Validation,
        404 => FailureKind::NotFound,
        408 => FailureKind::Timeout,
        409 | 412 => FailureKind::Conflict,
        429 => FailureKind::RateLimited,
        500..=599 => FailureKind::ServerError,
        _ => FailureKind::Unknown,
    };

    let mut failure = Failure::new(kind, failure_message(status, &response.body)).with_status(status);
    if kind == FailureKind::RateLimited {
        if let Some(hint) = response.header("retry-after").and_then(parse_retry_after) {
            failure = failure.with_retry_after(hint);
        }
    }
    Outcome::Failure(failure)
}

/// Parse a `Retry-After` value given in (possibly fractional) seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    // Rejects negative, non-finite and out-of-range values.
    Duration::try_from_secs_f64(seconds).ok()
}

fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn failure_message(status: u16, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return format!("HTTP {status}");
    }
    let excerpt: String = text.chars().take(MESSAGE_EXCERPT).collect();
    format!("HTTP {status}: {excerpt}")
}
