//! Token bucket rate limiter with optional burst allowance.
//!
//! Tokens are refilled lazily on every admission check from the elapsed time;
//! there is no background timer. The limiter never blocks: callers get a
//! wait hint and decide whether to sleep or fail fast.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    pub admitted: bool,
    /// Time until enough tokens are available. Zero when admitted,
    /// saturates at `Duration::MAX` when the wait is not representable.
    pub wait_hint: Duration,
    /// The cost exceeds every bucket's capacity; waiting never helps.
    pub exceeds_capacity: bool,
}

impl Admission {
    fn admitted() -> Self {
        Self {
            admitted: true,
            wait_hint: Duration::ZERO,
            exceeds_capacity: false,
        }
    }
}

/// A single token bucket.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn peek(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    fn try_take(&mut self, cost: f64) -> bool {
        if self.tokens >= cost {
            self.tokens = (self.tokens - cost).max(0.0);
            true
        } else {
            false
        }
    }

    fn wait_for(&self, cost: f64) -> Option<Duration> {
        if cost > self.capacity {
            return None;
        }
        let missing = (cost - self.tokens).max(0.0);
        Some(Duration::try_from_secs_f64(missing / self.refill_rate).unwrap_or(Duration::MAX))
    }

    fn reconfigure(&mut self, capacity: f64, refill_rate: f64) {
        self.capacity = capacity;
        self.refill_rate = refill_rate;
        self.tokens = self.tokens.min(capacity);
    }
}

#[derive(Debug)]
struct Buckets {
    primary: TokenBucket,
    burst: Option<TokenBucket>,
}

/// Per-endpoint rate limiter.
///
/// Both buckets live behind one mutex so an admission is atomic across them.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let now = Instant::now();
        Self {
            buckets: Mutex::new(Buckets {
                primary: TokenBucket::new(
                    config.capacity as f64,
                    config.refill_per_second,
                    now,
                ),
                burst: config
                    .burst
                    .as_ref()
                    .map(|b| TokenBucket::new(b.capacity as f64, b.refill_per_second, now)),
            }),
        }
    }

    /// Try to take `cost` tokens, draining the burst bucket first.
    pub fn try_acquire(&self, cost: u32) -> Admission {
        let cost = cost as f64;
        let now = Instant::now();
        let mut buckets = self.buckets.lock();

        buckets.primary.refill(now);
        if let Some(burst) = buckets.burst.as_mut() {
            burst.refill(now);
            if burst.try_take(cost) {
                return Admission::admitted();
            }
        }
        if buckets.primary.try_take(cost) {
            return Admission::admitted();
        }

        let wait_hint = std::iter::once(&buckets.primary)
            .chain(buckets.burst.as_ref())
            .filter_map(|bucket| bucket.wait_for(cost))
            .min();

        Admission {
            admitted: false,
            wait_hint: wait_hint.unwrap_or(Duration::MAX),
            exceeds_capacity: wait_hint.is_none(),
        }
    }

    /// Tokens currently available in the sustained bucket.
    pub fn available(&self) -> f64 {
        self.buckets.lock().primary.peek(Instant::now())
    }

    /// Tokens currently available in the burst bucket, if configured.
    pub fn burst_available(&self) -> Option<f64> {
        let now = Instant::now();
        self.buckets.lock().burst.as_ref().map(|b| b.peek(now))
    }

    /// Apply new parameters, keeping (and clamping) the current token counts.
    pub fn reconfigure(&self, config: &RateLimitConfig) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        buckets.primary.refill(now);
        buckets
            .primary
            .reconfigure(config.capacity as f64, config.refill_per_second);

        buckets.burst = match (buckets.burst.take(), &config.burst) {
            (Some(mut bucket), Some(burst)) => {
                bucket.refill(now);
                bucket.reconfigure(burst.capacity as f64, burst.refill_per_second);
                Some(bucket)
            }
            (None, Some(burst)) => Some(TokenBucket::new(
                burst.capacity as f64,
                burst.refill_per_second,
                now,
            )),
            (_, None) => None,
        };
    }
}
