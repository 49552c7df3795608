//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Un-jittered delay before retry number `attempt` (0-based):
/// `min(max_delay, base_delay * multiplier^attempt)`.
pub fn base_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay_ms = config.base_delay_ms as f64 * config.multiplier.powi(exponent);
    let capped_ms = delay_ms.min(config.max_delay_ms as f64);
    Duration::from_millis(capped_ms.max(0.0) as u64)
}

/// Calculate the delay before retry number `attempt`, with symmetric jitter.
///
/// A server-supplied `retry_after` is a floor and is not capped by `max_delay`.
pub fn calculate_backoff(
    config: &RetryConfig,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    let delay = base_backoff(config, attempt);

    let ratio = config.jitter_ratio.clamp(0.0, 0.99);
    let jittered = if ratio > 0.0 && !delay.is_zero() {
        let factor = rand::thread_rng().gen_range(1.0 - ratio..=1.0 + ratio);
        delay.mul_f64(factor).min(config.max_delay())
    } else {
        delay
    };

    match retry_after {
        Some(hint) => jittered.max(hint),
        None => jittered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            multiplier: 2.0,
            jitter_ratio: 0.2,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let config = config();
        assert_eq!(base_backoff(&config, 0), Duration::from_millis(100));
        assert_eq!(base_backoff(&config, 1), Duration::from_millis(200));
        assert_eq!(base_backoff(&config, 3), Duration::from_millis(800));
        assert_eq!(base_backoff(&config, 10), Duration::from_millis(2_000));
        assert_eq!(base_backoff(&config, u32::MAX), Duration::from_millis(2_000));
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let config = config();
        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let delay = base_backoff(&config, attempt);
            assert!(delay >= previous);
            assert!(delay <= config.max_delay());
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_twenty_percent() {
        let config = config();
        for _ in 0..500 {
            let delay = calculate_backoff(&config, 2, None);
            assert!(delay >= Duration::from_millis(320));
            assert!(delay <= Duration::from_millis(480));
        }
    }

    #[test]
    fn test_retry_after_is_a_floor() {
        let config = config();
        let delay = calculate_backoff(&config, 0, Some(Duration::from_secs(30)));
        assert_eq!(delay, Duration::from_secs(30));

        let delay = calculate_backoff(&config, 3, Some(Duration::from_millis(1)));
        assert!(delay >= Duration::from_millis(640));
    }
}
