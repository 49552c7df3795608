//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tracker_calls_total` (counter): logical calls by endpoint, outcome
//! - `tracker_call_duration_seconds` (histogram): end-to-end call latency
//! - `tracker_attempts_total` (counter): physical attempts by endpoint, outcome
//! - `tracker_retries_total` (counter): retries by endpoint
//! - `tracker_cache_lookups_total` (counter): cache lookups by endpoint, result
//! - `tracker_cache_entries` (gauge): cached entries per endpoint
//! - `tracker_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `tracker_rate_limited_total` (counter): local admission rejections
//!
//! Recording is a no-op until `init_metrics` installs the Prometheus recorder.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use thiserror::Error;
use tokio::time::Instant;

use crate::resilience::BreakerState;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus exporter: {0}")]
    Installation(String),
}

/// Install the Prometheus recorder and its HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("tracker_call_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        )
        .map_err(|e| MetricsError::Installation(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    describe_counter!("tracker_calls_total", "Logical calls by endpoint and outcome");
    describe_histogram!(
        "tracker_call_duration_seconds",
        metrics::Unit::Seconds,
        "End-to-end call latency"
    );
    describe_counter!("tracker_attempts_total", "Physical attempts by endpoint and outcome");
    describe_counter!("tracker_retries_total", "Retries by endpoint");
    describe_counter!("tracker_cache_lookups_total", "Cache lookups by endpoint and result");
    describe_gauge!("tracker_cache_entries", "Cached entries per endpoint");
    describe_gauge!("tracker_breaker_state", "Circuit breaker state (0=closed, 1=half-open, 2=open)");
    describe_counter!("tracker_rate_limited_total", "Local rate limiter rejections");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_call(endpoint: &str, outcome: &'static str, started: Instant) {
    counter!("tracker_calls_total", "endpoint" => endpoint.to_string(), "outcome" => outcome)
        .increment(1);
    histogram!("tracker_call_duration_seconds", "endpoint" => endpoint.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_attempt(endpoint: &str, outcome: &'static str) {
    counter!("tracker_attempts_total", "endpoint" => endpoint.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_retry(endpoint: &str) {
    counter!("tracker_retries_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_cache_lookup(endpoint: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("tracker_cache_lookups_total", "endpoint" => endpoint.to_string(), "result" => result)
        .increment(1);
}

pub fn record_cache_size(endpoint: &str, size: usize) {
    gauge!("tracker_cache_entries", "endpoint" => endpoint.to_string()).set(size as f64);
}

pub fn record_breaker_state(endpoint: &str, state: BreakerState) {
    gauge!("tracker_breaker_state", "endpoint" => endpoint.to_string()).set(state.as_gauge());
}

pub fn record_rate_limited(endpoint: &str) {
    counter!("tracker_rate_limited_total", "endpoint" => endpoint.to_string()).increment(1);
}
