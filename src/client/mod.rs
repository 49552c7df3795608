//! Remote call subsystem.
//!
//! # Data Flow
//! ```text
//! Caller builds ApiRequest (read or write, resource id, params)
//!     → EndpointRegistry picks the endpoint's ResilientExecutor
//!     → executor.rs (cache → breaker → rate limit → retries)
//!     → transport.rs (one physical call per attempt)
//!     → classify.rs (status / error → Outcome)
//!     → Outcome returned to the caller
//!
//! Above the executor:
//!     → conflict.rs (re-fetch and reapply on Conflict)
//!     → run_batch (bounded concurrent fan-out)
//! ```
//!
//! # Design Decisions
//! - Every path ends in an `Outcome`; nothing escapes as a panic
//! - One executor per endpoint; no process-wide state
//! - Transport is a trait so tests can script responses

pub mod classify;
pub mod conflict;
pub mod executor;
pub mod outcome;
pub mod registry;
pub mod request;
pub mod snapshot;
pub mod transport;

pub use conflict::update_with_refetch;
pub use executor::ResilientExecutor;
pub use outcome::{Failure, FailureKind, Outcome, Success};
pub use registry::EndpointRegistry;
pub use request::{ApiRequest, OperationKind};
pub use snapshot::MetricsSnapshot;
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};
