//! Point-in-time health view of one endpoint.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::client::outcome::FailureKind;
use crate::resilience::BreakerState;

/// Snapshot returned by `ResilientExecutor::metrics_snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub endpoint: String,
    pub breaker_state: BreakerState,
    pub current_tokens: f64,
    pub burst_tokens: Option<f64>,
    pub cache_hit_rate: f64,
    pub cache_entries: usize,
    pub recent_failure_counts: BTreeMap<FailureKind, u64>,
}

/// Oldest events are dropped past this many, regardless of the window.
const MAX_EVENTS: usize = 4_096;

/// Sliding window of final call failures.
#[derive(Debug)]
pub struct FailureLog {
    window: Mutex<Duration>,
    events: Mutex<VecDeque<(Instant, FailureKind)>>,
}

impl FailureLog {
    pub fn new(window: Duration) -> Self {
        Self {
            window: Mutex::new(window),
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, kind: FailureKind) {
        let now = Instant::now();
        let window = *self.window.lock();
        let mut events = self.events.lock();
        Self::prune(&mut events, now, window);
        if events.len() == MAX_EVENTS {
            events.pop_front();
        }
        events.push_back((now, kind));
    }

    /// Failures per kind inside the window.
    pub fn counts(&self) -> BTreeMap<FailureKind, u64> {
        let now = Instant::now();
        let window = *self.window.lock();
        let mut events = self.events.lock();
        Self::prune(&mut events, now, window);

        let mut counts = BTreeMap::new();
        for (_, kind) in events.iter() {
            *counts.entry(*kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn set_window(&self, window: Duration) {
        *self.window.lock() = window;
    }

    fn prune(events: &mut VecDeque<(Instant, FailureKind)>, now: Instant, window: Duration) {
        while let Some((at, _)) = events.front() {
            if now.saturating_duration_since(*at) > window {
                events.pop_front();
            } else {
                break;
            }
        }
    }
}
