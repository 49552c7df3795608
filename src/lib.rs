//! Resilient client core for a remote work-item tracking service.
//!
//! Calls go through a per-endpoint [`ResilientExecutor`] that combines a
//! response cache, a circuit breaker, a token-bucket rate limiter and a retry
//! policy, and resolves every call to an [`Outcome`].

pub mod cache;
pub mod client;
pub mod config;
pub mod observability;
pub mod resilience;

pub use client::{
    update_with_refetch, ApiRequest, EndpointRegistry, Failure, FailureKind, MetricsSnapshot,
    Outcome, ResilientExecutor,
};
pub use config::ClientConfig;
