//! TTL response cache with resource invalidation and LRU eviction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::Instant;

use crate::cache::key::CacheKey;

/// A cached read result.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub payload: Value,
    pub revision: Option<String>,
}

#[derive(Debug)]
struct CacheEntry {
    resource: String,
    payload: Value,
    revision: Option<String>,
    stored_at: Instant,
    ttl: Duration,
    /// Logical access clock; higher means more recently used.
    last_access: AtomicU64,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= self.ttl
    }
}

/// Resources whose last invalidation is remembered individually. Past this,
/// the set is dropped and every older stamp is treated as stale.
const MAX_TRACKED_INVALIDATIONS: usize = 4096;

/// Invalidation stamp.
///
/// Captured before a read is attempted and checked when the result is stored,
/// so a read that raced a write cannot repopulate the cache with stale data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    seq: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Bumped by every invalidation.
    seq: u64,
    /// Sequence number of each recently invalidated resource.
    invalidated: HashMap<String, u64>,
    /// Stamps taken before this are stale for every resource.
    floor: u64,
}

impl CacheInner {
    fn generation(&self) -> Generation {
        Generation { seq: self.seq }
    }

    fn is_current(&self, resource: &str, generation: Generation) -> bool {
        generation.seq >= self.floor
            && self
                .invalidated
                .get(resource)
                .map_or(true, |&seq| seq <= generation.seq)
    }

    fn mark_invalidated(&mut self, resource: &str) {
        self.seq += 1;
        if self.invalidated.len() >= MAX_TRACKED_INVALIDATIONS
            && !self.invalidated.contains_key(resource)
        {
            self.invalidated.clear();
            self.floor = self.seq;
            return;
        }
        self.invalidated.insert(resource.to_string(), self.seq);
    }

    fn mark_all_invalidated(&mut self) {
        self.seq += 1;
        self.invalidated.clear();
        self.floor = self.seq;
    }
}

/// Thread-safe response cache.
///
/// Lookups take a shared lock and bump an atomic access clock; inserts,
/// invalidation and eviction take the exclusive lock.
#[derive(Debug)]
pub struct ResponseCache {
    inner: RwLock<CacheInner>,
    max_items: AtomicUsize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(max_items: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            max_items: AtomicUsize::new(max_items.max(1)),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Fetch a fresh entry. Absent or expired entries are a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let now = Instant::now();
        let inner = self.inner.read();
        let found = inner
            .entries
            .get(key.fingerprint())
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                CachedResponse {
                    payload: entry.payload.clone(),
                    revision: entry.revision.clone(),
                }
            });

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Store a payload, replacing any entry at the same key.
    pub fn put(&self, key: &CacheKey, payload: Value, ttl: Duration, revision: Option<String>) {
        let mut inner = self.inner.write();
        self.insert_locked(&mut inner, key, payload, ttl, revision);
    }

    /// Store a payload only if the resource was not invalidated since `generation`.
    ///
    /// Returns false when the write was skipped.
    pub fn put_if_current(
        &self,
        key: &CacheKey,
        generation: Generation,
        payload: Value,
        ttl: Duration,
        revision: Option<String>,
    ) -> bool {
        let mut inner = self.inner.write();
        if !inner.is_current(key.resource(), generation) {
            tracing::debug!(key = %key, "Skipping cache fill, resource invalidated during read");
            return false;
        }
        self.insert_locked(&mut inner, key, payload, ttl, revision);
        true
    }

    fn insert_locked(
        &self,
        inner: &mut CacheInner,
        key: &CacheKey,
        payload: Value,
        ttl: Duration,
        revision: Option<String>,
    ) {
        let entry = CacheEntry {
            resource: key.resource().to_string(),
            payload,
            revision,
            stored_at: Instant::now(),
            ttl,
            last_access: AtomicU64::new(self.tick()),
        };
        inner.entries.insert(key.fingerprint().to_string(), entry);
        self.evict_locked(inner);
    }

    fn evict_locked(&self, inner: &mut CacheInner) {
        let max_items = self.max_items.load(Ordering::Relaxed);
        if inner.entries.len() <= max_items {
            return;
        }

        let now = Instant::now();
        inner.entries.retain(|_, entry| entry.is_fresh(now));

        while inner.entries.len() > max_items {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access.load(Ordering::Relaxed))
                .map(|(fingerprint, _)| fingerprint.clone());
            match oldest {
                Some(fingerprint) => {
                    inner.entries.remove(&fingerprint);
                }
                None => break,
            }
        }
    }

    /// Current invalidation stamp, taken before a read is attempted.
    pub fn generation(&self) -> Generation {
        self.inner.read().generation()
    }

    /// Number of resources whose invalidation is tracked individually.
    pub fn tracked_invalidations(&self) -> usize {
        self.inner.read().invalidated.len()
    }

    /// Remove every entry derived from `resource`. Returns how many were removed.
    pub fn invalidate(&self, resource: &str) -> usize {
        let mut inner = self.inner.write();
        inner.mark_invalidated(resource);
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.resource != resource);
        let removed = before - inner.entries.len();
        tracing::debug!(resource = %resource, removed, "Cache invalidated");
        removed
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.write();
        inner.mark_all_invalidated();
        inner.entries.clear();
        tracing::debug!("Cache cleared");
    }

    /// Change the entry bound, evicting immediately if the cache is over it.
    pub fn set_max_items(&self, max_items: usize) {
        self.max_items.store(max_items.max(1), Ordering::Relaxed);
        let mut inner = self.inner.write();
        self.evict_locked(&mut inner);
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fraction of lookups that hit, or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(resource: &str) -> CacheKey {
        CacheKey::for_resource(resource)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = ResponseCache::new(10);
        let item = key("item:42");
        cache.put(&item, json!({"id": 42}), Duration::from_millis(5000), None);

        tokio::time::advance(Duration::from_millis(4000)).await;
        assert_eq!(cache.get(&item).unwrap().payload, json!({"id": 42}));

        tokio::time::advance(Duration::from_millis(2000)).await;
        assert!(cache.get(&item).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_overwrites() {
        let cache = ResponseCache::new(10);
        let item = key("item:1");
        cache.put(&item, json!(1), Duration::from_secs(60), Some("rev-1".into()));
        cache.put(&item, json!(2), Duration::from_secs(60), Some("rev-2".into()));

        let hit = cache.get(&item).unwrap();
        assert_eq!(hit.payload, json!(2));
        assert_eq!(hit.revision.as_deref(), Some("rev-2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_removes_every_key_for_resource() {
        let cache = ResponseCache::new(10);
        let mut params = std::collections::BTreeMap::new();
        params.insert("fields".to_string(), "title".to_string());
        let plain = CacheKey::new("GET workitems/5", "workitem:5", &Default::default());
        let filtered = CacheKey::new("GET workitems/5", "workitem:5", &params);
        let other = CacheKey::new("GET workitems/6", "workitem:6", &Default::default());
        let ttl = Duration::from_secs(60);

        cache.put(&plain, json!("a"), ttl, Some("3".into()));
        cache.put(&filtered, json!("b"), ttl, None);
        cache.put(&other, json!("c"), ttl, None);

        assert_eq!(cache.invalidate("workitem:5"), 2);
        assert!(cache.get(&plain).is_none());
        assert!(cache.get(&filtered).is_none());
        assert!(cache.get(&other).is_some());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ResponseCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.put(&key("a"), json!("a"), ttl, None);
        cache.put(&key("b"), json!("b"), ttl, None);

        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get(&key("a")).is_some());
        cache.put(&key("c"), json!("c"), ttl, None);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn test_stale_fill_is_rejected_after_invalidation() {
        let cache = ResponseCache::new(10);
        let item = key("workitem:9");
        let generation = cache.generation();

        cache.invalidate("workitem:9");

        let stored = cache.put_if_current(&item, generation, json!("old"), Duration::from_secs(60), None);
        assert!(!stored);
        assert!(cache.get(&item).is_none());

        let fresh = cache.generation();
        assert!(cache.put_if_current(&item, fresh, json!("new"), Duration::from_secs(60), None));
    }

    #[test]
    fn test_invalidate_all_and_hit_rate() {
        let cache = ResponseCache::new(10);
        assert_eq!(cache.hit_rate(), 0.0);

        let generation = cache.generation();
        cache.put(&key("x"), json!(1), Duration::from_secs(60), None);
        assert!(cache.get(&key("x")).is_some());
        assert!(cache.get(&key("y")).is_none());
        assert_eq!(cache.hit_rate(), 0.5);

        cache.invalidate_all();
        assert!(cache.is_empty());
        assert!(!cache.put_if_current(&key("x"), generation, json!(2), Duration::from_secs(60), None));
    }

    #[test]
    fn test_shrinking_bound_evicts() {
        let cache = ResponseCache::new(5);
        for name in ["a", "b", "c", "d"] {
            cache.put(&key(name), json!(name), Duration::from_secs(60), None);
        }
        cache.set_max_items(2);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("d")).is_some());
    }

    #[test]
    fn test_invalidation_tracking_is_bounded() {
        let cache = ResponseCache::new(10);
        let item = key("workitem:1");
        let before = cache.generation();
        cache.invalidate("workitem:1");

        for n in 0..(MAX_TRACKED_INVALIDATIONS * 2) {
            cache.invalidate(&format!("workitem:{}", n + 100));
            assert!(cache.tracked_invalidations() <= MAX_TRACKED_INVALIDATIONS);
        }

        // Forgetting individual resources never lets an older read through.
        assert!(!cache.put_if_current(&item, before, json!("old"), Duration::from_secs(60), None));

        let fresh = cache.generation();
        assert!(cache.put_if_current(&item, fresh, json!("new"), Duration::from_secs(60), None));

        cache.invalidate_all();
        assert_eq!(cache.tracked_invalidations(), 0);
    }

    #[test]
    fn test_unrelated_invalidation_keeps_fill() {
        let cache = ResponseCache::new(10);
        let generation = cache.generation();
        cache.invalidate("workitem:2");
        assert!(cache.put_if_current(&key("workitem:1"), generation, json!(1), Duration::from_secs(60), None));
    }
}
