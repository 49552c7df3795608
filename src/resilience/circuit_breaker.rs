//! Circuit breaker for endpoint protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: endpoint assumed down, calls fail fast
//! - Half-Open: probing whether the endpoint recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: recovery_timeout elapsed since last failure (on allow())
//! Half-Open → Closed: half_open_successes >= recovery_success_threshold
//! Half-Open → Open: any probe fails
//! ```
//!
//! # Design Decisions
//! - Per-endpoint circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Probes in flight while half-open are capped by `half_open_max_probes`
//!   (1 by default: one probe at a time)
//! - Only outcomes of this half-open period's probes count toward recovery

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Gauge encoding: 0 = closed, 1 = half-open, 2 = open.
    pub fn as_gauge(self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::HalfOpen => 1.0,
            BreakerState::Open => 2.0,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    config: CircuitBreakerConfig,
    state: BreakerState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    half_open_successes: u32,
    probes_in_flight: u32,
    /// Bumped on every entry into half-open, so probe outcomes from an
    /// earlier half-open period are recognised as stale.
    half_open_epoch: u64,
}

/// Who is reporting an attempt outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reporter {
    /// Untracked caller of `allow()`; counts as a probe while half-open.
    Caller,
    /// Attempt admitted as a half-open probe in the given epoch.
    Probe(u64),
    /// Attempt admitted while the breaker was closed.
    Regular,
}

/// Per-endpoint circuit breaker. All transitions happen under one mutex.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(BreakerInner {
                config,
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                half_open_successes: 0,
                probes_in_flight: 0,
                half_open_epoch: 0,
            }),
        }
    }

    /// Current state, without attempting a transition.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn probes_in_flight(&self) -> u32 {
        self.inner.lock().probes_in_flight
    }

    /// Check whether a call may proceed.
    ///
    /// An open breaker whose recovery timeout has elapsed moves to half-open
    /// here and admits the caller as a probe. The caller must report through
    /// `on_success`/`on_failure` or give the slot back with `release`.
    pub fn allow(&self) -> bool {
        self.admit().is_some()
    }

    /// Like `allow`, but returns a permit that reports the attempt outcome
    /// and frees its probe slot if dropped without reporting.
    pub fn permit(&self) -> Option<BreakerPermit<'_>> {
        self.admit().map(|reporter| BreakerPermit {
            breaker: self,
            reporter: match reporter {
                Reporter::Caller => Reporter::Regular,
                probe => probe,
            },
            armed: true,
        })
    }

    fn admit(&self) -> Option<Reporter> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Some(Reporter::Caller),
            BreakerState::Open => {
                let recovered = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= inner.config.recovery_timeout());
                if !recovered {
                    return None;
                }
                inner.state = BreakerState::HalfOpen;
                inner.half_open_successes = 0;
                inner.probes_in_flight = 1;
                inner.half_open_epoch += 1;
                tracing::info!(endpoint = %self.name, "Circuit breaker transitioning to half-open");
                metrics::record_breaker_state(&self.name, BreakerState::HalfOpen);
                Some(Reporter::Probe(inner.half_open_epoch))
            }
            BreakerState::HalfOpen => {
                if inner.probes_in_flight < inner.config.half_open_max_probes {
                    inner.probes_in_flight += 1;
                    Some(Reporter::Probe(inner.half_open_epoch))
                } else {
                    None
                }
            }
        }
    }

    /// Record a successful attempt.
    pub fn on_success(&self) {
        self.record_success(Reporter::Caller);
    }

    /// Record a failed attempt.
    pub fn on_failure(&self) {
        self.record_failure();
    }

    /// Give back a probe slot taken by `allow()` when the call ended before
    /// any attempt was made.
    pub fn release(&self) {
        self.release_slot(Reporter::Caller);
    }

    fn record_success(&self, reporter: Reporter) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                let epoch = inner.half_open_epoch;
                match reporter {
                    Reporter::Caller => {}
                    Reporter::Probe(e) if e == epoch => {}
                    // Late result from an attempt that was not this period's probe.
                    _ => return,
                }
                inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= inner.config.recovery_success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.probes_in_flight = 0;
                    tracing::info!(endpoint = %self.name, "Circuit breaker closed after recovery");
                    metrics::record_breaker_state(&self.name, BreakerState::Closed);
                }
            }
            // Late result from an attempt admitted before the breaker opened.
            BreakerState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                inner.last_failure = Some(now);
                if inner.consecutive_failures >= inner.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    tracing::warn!(
                        endpoint = %self.name,
                        failures = inner.consecutive_failures,
                        "Circuit breaker opened"
                    );
                    metrics::record_breaker_state(&self.name, BreakerState::Open);
                }
            }
            // Any failure observed while half-open re-opens.
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.last_failure = Some(now);
                inner.half_open_successes = 0;
                inner.probes_in_flight = 0;
                tracing::warn!(endpoint = %self.name, "Circuit breaker re-opened from half-open");
                metrics::record_breaker_state(&self.name, BreakerState::Open);
            }
            BreakerState::Open => {}
        }
    }

    fn release_slot(&self, reporter: Reporter) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::HalfOpen {
            return;
        }
        let current = match reporter {
            Reporter::Caller => true,
            Reporter::Probe(epoch) => epoch == inner.half_open_epoch,
            Reporter::Regular => false,
        };
        if current {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
    }

    /// Apply new thresholds without resetting state.
    pub fn reconfigure(&self, config: CircuitBreakerConfig) {
        self.inner.lock().config = config;
    }
}

/// Admission to make one attempt.
///
/// Consumed by `succeeded`/`failed`. Dropping an unreported permit, for
/// example when the caller abandons the call, frees its half-open probe slot.
#[derive(Debug)]
#[must_use = "report the attempt outcome or drop the permit to release it"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    reporter: Reporter,
    armed: bool,
}

impl BreakerPermit<'_> {
    /// Whether this attempt is a half-open probe.
    pub fn is_probe(&self) -> bool {
        matches!(self.reporter, Reporter::Probe(_))
    }

    pub fn succeeded(mut self) {
        self.armed = false;
        self.breaker.record_success(self.reporter);
    }

    pub fn failed(mut self) {
        self.armed = false;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_slot(self.reporter);
        }
    }
}
