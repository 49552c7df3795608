//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::outcome::FailureKind;

/// Root configuration for the tracker client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote endpoints (one per organization). Each gets its own limiter, breaker and cache.
    pub endpoints: Vec<EndpointConfig>,

    /// Default rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker configuration.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Response cache configuration.
    pub cache: CacheConfig,

    /// Executor admission and fan-out settings.
    pub executor: ExecutorConfig,

    /// Transport timeouts.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ClientConfig {
    /// Resolve the effective settings for one endpoint.
    pub fn settings_for(&self, endpoint: &EndpointConfig) -> EndpointSettings {
        EndpointSettings {
            rate_limit: endpoint
                .rate_limit
                .clone()
                .unwrap_or_else(|| self.rate_limit.clone()),
            circuit_breaker: self.circuit_breaker.clone(),
            retries: self.retries.clone(),
            cache: self.cache.clone(),
            executor: self.executor.clone(),
            attempt_timeout: Duration::from_millis(self.transport.attempt_timeout_ms),
        }
    }

    /// Look up an endpoint by name.
    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.name == name)
    }
}

/// A remote endpoint (work-item service organization).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Unique endpoint identifier for logging/metrics.
    pub name: String,

    /// Base URL that request paths are joined onto.
    pub base_url: String,

    /// Extra headers sent with every call.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Rate limit override for this endpoint.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

/// Token bucket configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum tokens in the sustained bucket.
    pub capacity: u32,

    /// Tokens added per second.
    pub refill_per_second: f64,

    /// Optional secondary bucket drained before the sustained one.
    pub burst: Option<BurstConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            refill_per_second: 5.0,
            burst: None,
        }
    }
}

/// Burst allowance bucket.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BurstConfig {
    pub capacity: u32,
    pub refill_per_second: f64,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Time spent open before a probe is admitted, in milliseconds.
    pub recovery_timeout_ms: u64,

    /// Successful probes required to close the circuit again.
    pub recovery_success_threshold: u32,

    /// Probes allowed in flight at once while half-open.
    pub half_open_max_probes: u32,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            recovery_success_threshold: 2,
            half_open_max_probes: 1,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Retries after the initial attempt (total attempts = max_retries + 1).
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor applied per attempt.
    pub multiplier: f64,

    /// Symmetric jitter as a fraction of the delay (0.2 = ±20%).
    pub jitter_ratio: f64,

    /// Failure kinds eligible for retry.
    pub retryable_kinds: Vec<FailureKind>,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            multiplier: 2.0,
            jitter_ratio: 0.2,
            retryable_kinds: FailureKind::TRANSIENT.to_vec(),
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching of successful reads.
    pub enabled: bool,

    /// TTL applied when a request carries no override, in milliseconds.
    pub default_ttl_ms: u64,

    /// Entry count above which least-recently-used entries are evicted.
    pub max_items: usize,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_ms: 60_000,
            max_items: 1_000,
        }
    }
}

/// Executor admission and fan-out configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Wait for rate limiter admission instead of failing fast.
    pub wait_for_rate_limit: bool,

    /// Longest admission wait before giving up with `RateLimited`, in milliseconds.
    pub max_rate_limit_wait_ms: u64,

    /// Concurrent calls in a batch.
    pub max_concurrent_requests: usize,

    /// Window for recent failure counts, in seconds.
    pub failure_window_secs: u64,
}

impl ExecutorConfig {
    pub fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_millis(self.max_rate_limit_wait_ms)
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            wait_for_rate_limit: true,
            max_rate_limit_wait_ms: 10_000,
            max_concurrent_requests: 8,
            failure_window_secs: 300,
        }
    }
}

/// Transport timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Deadline for one physical attempt in milliseconds.
    pub attempt_timeout_ms: u64,

    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            attempt_timeout_ms: 30_000,
            user_agent: concat!("tracker-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Effective settings for a single endpoint's executor.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSettings {
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retries: RetryConfig,
    pub cache: CacheConfig,
    pub executor: ExecutorConfig,
    pub attempt_timeout: Duration,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retries: RetryConfig::default(),
            cache: CacheConfig::default(),
            executor: ExecutorConfig::default(),
            attempt_timeout: Duration::from_millis(TransportConfig::default().attempt_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [[endpoints]]
            name = "acme"
            base_url = "https://tracker.example.com/acme/"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.retries.retryable_kinds.len(), 4);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_endpoint_rate_limit_override() {
        let config: ClientConfig = toml::from_str(
            r#"
            [rate_limit]
            capacity = 10
            refill_per_second = 2.0

            [[endpoints]]
            name = "slow"
            base_url = "http://localhost:1/"
            rate_limit = { capacity = 2, refill_per_second = 0.5 }

            [[endpoints]]
            name = "normal"
            base_url = "http://localhost:2/"

            [retries]
            retryable_kinds = ["server_error", "timeout"]
            "#,
        )
        .unwrap();

        let slow = config.settings_for(config.endpoint("slow").unwrap());
        let normal = config.settings_for(config.endpoint("normal").unwrap());
        assert_eq!(slow.rate_limit.capacity, 2);
        assert_eq!(normal.rate_limit.capacity, 10);
        assert_eq!(
            config.retries.retryable_kinds,
            vec![FailureKind::ServerError, FailureKind::Timeout]
        );
    }
}
