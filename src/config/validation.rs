//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, refill rates positive, jitter bounded)
//! - Check endpoint names are unique, base URLs parse and headers are
//!   valid HTTP header names and values
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use reqwest::header::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::client::outcome::FailureKind;
use crate::config::schema::{ClientConfig, RateLimitConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: String },

    #[error("{field} must be within {range}, got {value}")]
    OutOfRange {
        field: String,
        range: &'static str,
        value: f64,
    },

    #[error("retries.max_delay_ms ({max}) is below retries.base_delay_ms ({base})")]
    DelayBounds { base: u64, max: u64 },

    #[error("duplicate endpoint name '{0}'")]
    DuplicateEndpoint(String),

    #[error("endpoint '{name}' has invalid base_url: {reason}")]
    InvalidBaseUrl { name: String, reason: String },

    #[error("endpoint '{endpoint}' has invalid header '{header}': {reason}")]
    InvalidHeader {
        endpoint: String,
        header: String,
        reason: String,
    },

    #[error("failure kind '{0}' can never be retried automatically")]
    NotRetryable(FailureKind),
}

fn not_positive(field: impl Into<String>) -> ValidationError {
    ValidationError::NotPositive {
        field: field.into(),
    }
}

fn check_rate_limit(prefix: &str, config: &RateLimitConfig, errors: &mut Vec<ValidationError>) {
    if config.capacity == 0 {
        errors.push(not_positive(format!("{prefix}.capacity")));
    }
    if !(config.refill_per_second > 0.0) {
        errors.push(not_positive(format!("{prefix}.refill_per_second")));
    }
    if let Some(burst) = &config.burst {
        if burst.capacity == 0 {
            errors.push(not_positive(format!("{prefix}.burst.capacity")));
        }
        if !(burst.refill_per_second > 0.0) {
            errors.push(not_positive(format!("{prefix}.burst.refill_per_second")));
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_rate_limit("rate_limit", &config.rate_limit, &mut errors);

    let breaker = &config.circuit_breaker;
    if breaker.failure_threshold == 0 {
        errors.push(not_positive("circuit_breaker.failure_threshold"));
    }
    if breaker.recovery_success_threshold == 0 {
        errors.push(not_positive("circuit_breaker.recovery_success_threshold"));
    }
    if breaker.half_open_max_probes == 0 {
        errors.push(not_positive("circuit_breaker.half_open_max_probes"));
    }

    let retries = &config.retries;
    if retries.max_delay_ms < retries.base_delay_ms {
        errors.push(ValidationError::DelayBounds {
            base: retries.base_delay_ms,
            max: retries.max_delay_ms,
        });
    }
    if !(retries.multiplier >= 1.0) {
        errors.push(ValidationError::OutOfRange {
            field: "retries.multiplier".to_string(),
            range: "[1, inf)",
            value: retries.multiplier,
        });
    }
    if !(0.0..1.0).contains(&retries.jitter_ratio) {
        errors.push(ValidationError::OutOfRange {
            field: "retries.jitter_ratio".to_string(),
            range: "[0, 1)",
            value: retries.jitter_ratio,
        });
    }
    for kind in &retries.retryable_kinds {
        if matches!(kind, FailureKind::Conflict | FailureKind::CircuitOpen) {
            errors.push(ValidationError::NotRetryable(*kind));
        }
    }

    if config.cache.max_items == 0 {
        errors.push(not_positive("cache.max_items"));
    }
    if config.executor.max_concurrent_requests == 0 {
        errors.push(not_positive("executor.max_concurrent_requests"));
    }
    if config.transport.attempt_timeout_ms == 0 {
        errors.push(not_positive("transport.attempt_timeout_ms"));
    }

    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        if !seen.insert(endpoint.name.as_str()) {
            errors.push(ValidationError::DuplicateEndpoint(endpoint.name.clone()));
        }
        if let Err(e) = url::Url::parse(&endpoint.base_url) {
            errors.push(ValidationError::InvalidBaseUrl {
                name: endpoint.name.clone(),
                reason: e.to_string(),
            });
        }
        for (name, value) in &endpoint.headers {
            let invalid = |reason: String| ValidationError::InvalidHeader {
                endpoint: endpoint.name.clone(),
                header: name.clone(),
                reason,
            };
            if let Err(e) = HeaderName::from_bytes(name.as_bytes()) {
                errors.push(invalid(e.to_string()));
            } else if let Err(e) = HeaderValue::from_str(value) {
                errors.push(invalid(e.to_string()));
            }
        }
        if let Some(rate_limit) = &endpoint.rate_limit {
            check_rate_limit(
                &format!("endpoints.{}.rate_limit", endpoint.name),
                rate_limit,
                &mut errors,
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EndpointConfig;

    fn endpoint(name: &str, base_url: &str) -> EndpointConfig {
        EndpointConfig {
            name: name.to_string(),
            base_url: base_url.to_string(),
            headers: Default::default(),
            rate_limit: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ClientConfig::default();
        config.rate_limit.refill_per_second = 0.0;
        config.circuit_breaker.failure_threshold = 0;
        config.retries.base_delay_ms = 500;
        config.retries.max_delay_ms = 100;
        config.retries.retryable_kinds.push(FailureKind::Conflict);
        config.endpoints.push(endpoint("a", "http://a.example/"));
        config.endpoints.push(endpoint("a", "not a url"));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::DuplicateEndpoint("a".into())));
        assert!(errors.contains(&ValidationError::NotRetryable(FailureKind::Conflict)));
        assert!(errors.contains(&ValidationError::DelayBounds { base: 500, max: 100 }));
    }

    #[test]
    fn test_jitter_must_stay_below_one() {
        let mut config = ClientConfig::default();
        config.retries.jitter_ratio = 1.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("retries.jitter_ratio"));
    }

    #[test]
    fn test_rejects_malformed_headers() {
        let mut config = ClientConfig::default();
        let mut acme = endpoint("acme", "https://acme.example.com/");
        acme.headers.insert("bad header".to_string(), "x".to_string());
        acme.headers.insert("X-Token".to_string(), "line\nbreak".to_string());
        acme.headers.insert("Authorization".to_string(), "Basic dGVzdA==".to_string());
        config.endpoints.push(acme);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(
            e,
            ValidationError::InvalidHeader { endpoint, .. } if endpoint == "acme"
        )));
    }
}
