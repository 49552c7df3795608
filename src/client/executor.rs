//! Resilient call execution for one endpoint.
//!
//! # Call Flow
//! ```text
//! run(request)
//!     → cache lookup (cacheable reads; a fresh hit returns immediately)
//!     → circuit breaker permit (open → CircuitOpen, no token consumed)
//!     → rate limiter admission (wait up to max_rate_limit_wait, or fail fast)
//!     → retry policy
//!         → per attempt: breaker permit, deadline, transport, classify,
//!           permit succeeded/failed (a dropped permit frees its slot)
//!     → post-process (read success fills cache, write success invalidates)
//!     → Outcome
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::stream::{self, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::client::classify::classify;
use crate::client::outcome::{Failure, FailureKind, Outcome};
use crate::client::request::ApiRequest;
use crate::client::snapshot::{FailureLog, MetricsSnapshot};
use crate::client::transport::Transport;
use crate::config::{EndpointSettings, ExecutorConfig};
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::resilience::{BreakerPermit, CircuitBreaker, RateLimiter, RetryPolicy};

/// Composes cache, circuit breaker, rate limiter and retries around one
/// endpoint's transport. Every call resolves to an [`Outcome`].
pub struct ResilientExecutor {
    endpoint: String,
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    cache: ResponseCache,
    failures: FailureLog,
    settings: ArcSwap<EndpointSettings>,
}

impl ResilientExecutor {
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn Transport>,
        settings: EndpointSettings,
    ) -> Self {
        let endpoint = endpoint.into();
        Self {
            limiter: RateLimiter::new(&settings.rate_limit),
            breaker: CircuitBreaker::new(endpoint.clone(), settings.circuit_breaker.clone()),
            cache: ResponseCache::new(settings.cache.max_items),
            failures: FailureLog::new(settings.executor.failure_window()),
            settings: ArcSwap::from_pointee(settings),
            endpoint,
            transport,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn settings(&self) -> Arc<EndpointSettings> {
        self.settings.load_full()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Execute a request.
    pub async fn run(&self, request: ApiRequest) -> Outcome {
        self.run_with_cancel(request, &CancellationToken::new()).await
    }

    /// Execute a request, aborting any wait when `cancel` fires.
    pub async fn run_with_cancel(&self, request: ApiRequest, cancel: &CancellationToken) -> Outcome {
        let call_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "tracker_call",
            endpoint = %self.endpoint,
            call_id = %call_id,
            resource = %request.resource,
        );

        let started = Instant::now();
        let outcome = self.execute(&request, cancel).instrument(span).await;

        if let Outcome::Failure(failure) = &outcome {
            self.failures.record(failure.kind);
        }
        metrics::record_call(&self.endpoint, outcome.label(), started);
        outcome
    }

    /// Run independent requests concurrently, at most
    /// `max_concurrent_requests` at a time. Results keep the input order.
    pub async fn run_batch(&self, requests: Vec<ApiRequest>, cancel: &CancellationToken) -> Vec<Outcome> {
        let limit = self.settings.load().executor.max_concurrent_requests.max(1);
        stream::iter(requests)
            .map(|request| self.run_with_cancel(request, cancel))
            .buffered(limit)
            .collect()
            .await
    }

    async fn execute(&self, request: &ApiRequest, cancel: &CancellationToken) -> Outcome {
        let settings = self.settings.load_full();
        let key = (settings.cache.enabled && request.cacheable && !request.is_write())
            .then(|| request.cache_key());

        if let Some(key) = &key {
            let hit = self.cache.get(key);
            metrics::record_cache_lookup(&self.endpoint, hit.is_some());
            if let Some(cached) = hit {
                tracing::debug!(key = %key, "Cache hit");
                return Outcome::success(cached.payload, cached.revision);
            }
        }

        if cancel.is_cancelled() {
            return Failure::cancelled().into();
        }

        let Some(permit) = self.breaker.permit() else {
            tracing::debug!("Circuit open, failing fast");
            return Failure::circuit_open(&self.endpoint).into();
        };

        // Rejection drops the permit, which frees a half-open probe slot.
        if let Err(failure) = self.admit(request.cost, &settings.executor, cancel).await {
            return failure.into();
        }

        let generation = key.is_some().then(|| self.cache.generation());
        let policy = RetryPolicy::new(settings.retries.clone());
        let mut first = Some(permit);
        let outcome = policy
            .execute(cancel, |attempt| {
                self.attempt(request, attempt, first.take(), settings.attempt_timeout)
            })
            .await;

        match &outcome {
            Outcome::Success(_) if request.is_write() => {
                self.cache.invalidate(&request.resource);
                metrics::record_cache_size(&self.endpoint, self.cache.len());
            }
            Outcome::Success(success) => {
                if let (Some(key), Some(generation)) = (&key, generation) {
                    let ttl = request.ttl.unwrap_or_else(|| settings.cache.default_ttl());
                    self.cache.put_if_current(
                        key,
                        generation,
                        success.payload.clone(),
                        ttl,
                        success.revision.clone(),
                    );
                    metrics::record_cache_size(&self.endpoint, self.cache.len());
                }
            }
            Outcome::Failure(failure) if request.is_write() && failure.kind == FailureKind::Conflict => {
                self.cache.invalidate(&request.resource);
            }
            Outcome::Failure(failure) => {
                tracing::debug!(kind = %failure.kind, "Call failed");
            }
        }

        outcome
    }

    /// Wait for rate limiter admission.
    async fn admit(
        &self,
        cost: u32,
        config: &ExecutorConfig,
        cancel: &CancellationToken,
    ) -> Result<(), Failure> {
        let deadline = Instant::now() + config.max_rate_limit_wait();
        loop {
            let admission = self.limiter.try_acquire(cost);
            if admission.admitted {
                return Ok(());
            }
            metrics::record_rate_limited(&self.endpoint);

            if admission.exceeds_capacity {
                return Err(Failure::new(
                    FailureKind::Validation,
                    format!("request cost {cost} exceeds rate limiter capacity"),
                ));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if !config.wait_for_rate_limit || admission.wait_hint > remaining {
                tracing::debug!(wait_hint = ?admission.wait_hint, "Rate limited locally");
                return Err(Failure::rate_limited(admission.wait_hint));
            }

            tracing::debug!(wait_hint = ?admission.wait_hint, "Waiting for rate limiter");
            tokio::select! {
                _ = cancel.cancelled() => return Err(Failure::cancelled()),
                _ = tokio::time::sleep(admission.wait_hint) => {}
            }
        }
    }

    /// One physical attempt. Reports its outcome to the breaker exactly once.
    ///
    /// The first attempt reuses the permit taken before admission; retries
    /// ask the breaker again.
    async fn attempt(
        &self,
        request: &ApiRequest,
        attempt: u32,
        permit: Option<BreakerPermit<'_>>,
        deadline: Duration,
    ) -> Outcome {
        let Some(permit) = permit.or_else(|| self.breaker.permit()) else {
            tracing::debug!(attempt, "Circuit opened during retries");
            return Failure::circuit_open(&self.endpoint).into();
        };
        if attempt > 0 {
            metrics::record_retry(&self.endpoint);
        }

        let outcome = with_deadline(deadline, async {
            classify(self.transport.perform(request).await)
        })
        .await;

        match &outcome {
            Outcome::Failure(failure) if failure.kind.is_transient() => permit.failed(),
            // The endpoint answered; client-side errors say nothing about its health.
            _ => permit.succeeded(),
        }
        metrics::record_attempt(&self.endpoint, outcome.label());
        tracing::debug!(attempt, outcome = outcome.label(), "Attempt finished");
        outcome
    }

    /// Drop cached entries for a resource written out of band.
    pub fn invalidate(&self, resource: &str) -> usize {
        let removed = self.cache.invalidate(resource);
        metrics::record_cache_size(&self.endpoint, self.cache.len());
        removed
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        metrics::record_cache_size(&self.endpoint, 0);
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            endpoint: self.endpoint.clone(),
            breaker_state: self.breaker.state(),
            current_tokens: self.limiter.available(),
            burst_tokens: self.limiter.burst_available(),
            cache_hit_rate: self.cache.hit_rate(),
            cache_entries: self.cache.len(),
            recent_failure_counts: self.failures.counts(),
        }
    }

    /// Apply new settings while keeping limiter, breaker and cache state.
    pub fn reconfigure(&self, settings: EndpointSettings) {
        self.limiter.reconfigure(&settings.rate_limit);
        self.breaker.reconfigure(settings.circuit_breaker.clone());
        self.cache.set_max_items(settings.cache.max_items);
        if !settings.cache.enabled {
            self.cache.invalidate_all();
        }
        self.failures.set_window(settings.executor.failure_window());
        self.settings.store(Arc::new(settings));
        tracing::info!(endpoint = %self.endpoint, "Endpoint reconfigured");
    }
}

impl fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("endpoint", &self.endpoint)
            .field("breaker_state", &self.breaker.state())
            .field("cache_entries", &self.cache.len())
            .finish()
    }
}
