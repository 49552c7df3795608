//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an endpoint:
//!     → circuit_breaker.rs (fail fast while open, admit probes when half-open)
//!     → rate_limit.rs (token bucket admission, wait hint on rejection)
//!     → retries.rs (re-run transient failures with backoff.rs delays)
//!         → timeouts.rs (deadline per physical attempt)
//!         → circuit_breaker.rs (every attempt reported as success/failure)
//! ```
//!
//! # Design Decisions
//! - One limiter and one breaker per endpoint, explicitly owned by its executor
//! - Neither the limiter nor the breaker blocks; waiting happens in the caller
//! - All time is `tokio::time::Instant` so tests can run on a paused clock

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limit;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerPermit, BreakerState, CircuitBreaker};
pub use rate_limit::{Admission, RateLimiter};
pub use retries::RetryPolicy;
