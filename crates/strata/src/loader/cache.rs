// crates/strata/src/loader/cache.rs
// LRU cache for loaded layers

use super::LoadResult;
use crate::config::CacheConfig;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use strata_types::{CacheStats, Layer, LayerKey};
use tracing::warn;

/// A stored layer result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: LoadResult,
    pub inserted_at: Instant,
    pub last_access: Instant,
    pub hits: u64,
    /// False for a timed-out read that only holds some of the layer's assets
    pub complete: bool,
}

struct Inner {
    entries: LruCache<LayerKey, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded, thread-safe layer cache.
///
/// Every operation is one short critical section with no I/O.
pub struct LayerCache {
    inner: Mutex<Inner>,
    max_entries: NonZeroUsize,
    ttl: Option<Duration>,
    slow_after: Duration,
}

impl LayerCache {
    /// `slow_after` is the cache-lookup budget; slower operations are logged
    pub fn new(config: CacheConfig, slow_after: Duration) -> Self {
        let max_entries = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(max_entries),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_entries,
            ttl: config.ttl,
            slow_after,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(entry.inserted_at) >= ttl)
    }

    fn check_slow(&self, op: &str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.slow_after {
            warn!(
                op,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.slow_after.as_millis() as u64,
                "Slow cache operation"
            );
        }
    }

    /// Complete, unexpired entry for `key`. Counts a hit or a miss.
    pub fn get(&self, key: &LayerKey) -> Option<CacheEntry> {
        let started = Instant::now();
        let mut inner = self.lock();

        let usable = inner
            .entries
            .peek(key)
            .is_some_and(|e| e.complete && !self.is_expired(e, started));

        let found = if usable {
            inner.hits += 1;
            inner.entries.get_mut(key).map(|entry| {
                entry.hits += 1;
                entry.last_access = started;
                entry.clone()
            })
        } else {
            inner.misses += 1;
            None
        };
        drop(inner);

        self.check_slow("get", started);
        found
    }

    /// Complete, unexpired result for `key` without touching counters or recency
    pub fn peek_fresh(&self, key: &LayerKey) -> Option<LoadResult> {
        let now = Instant::now();
        let inner = self.lock();
        inner
            .entries
            .peek(key)
            .filter(|e| e.complete && !self.is_expired(e, now))
            .map(|e| e.result.clone())
    }

    /// Second look after a `get` miss, for an entry stored in between.
    ///
    /// A find turns the earlier miss into a hit, so one lookup counts once.
    pub fn recheck(&self, key: &LayerKey) -> Option<LoadResult> {
        let now = Instant::now();
        let mut inner = self.lock();

        let usable = inner
            .entries
            .peek(key)
            .is_some_and(|e| e.complete && !self.is_expired(e, now));
        if !usable {
            return None;
        }

        inner.hits += 1;
        inner.misses = inner.misses.saturating_sub(1);
        inner.entries.get_mut(key).map(|entry| {
            entry.hits += 1;
            entry.last_access = now;
            entry.result.clone()
        })
    }

    /// Unexpired result for `key`, complete or not. No counters.
    pub fn peek(&self, key: &LayerKey) -> Option<LoadResult> {
        let now = Instant::now();
        let inner = self.lock();
        inner
            .entries
            .peek(key)
            .filter(|e| !self.is_expired(e, now))
            .map(|e| e.result.clone())
    }

    /// Incomplete, unexpired result for `key`, used to resume a timed-out read
    pub fn get_partial(&self, key: &LayerKey) -> Option<LoadResult> {
        let now = Instant::now();
        let inner = self.lock();
        inner
            .entries
            .peek(key)
            .filter(|e| !e.complete && !self.is_expired(e, now))
            .map(|e| e.result.clone())
    }

    /// Any stored result for `key`, expired or incomplete included
    pub fn get_stale(&self, key: &LayerKey) -> Option<LoadResult> {
        let inner = self.lock();
        inner.entries.peek(key).map(|e| e.result.clone())
    }

    /// Insert or replace. Evicts the least-recently-used entry when full.
    pub fn put(&self, key: LayerKey, result: LoadResult, complete: bool) {
        let started = Instant::now();
        let entry = CacheEntry {
            result,
            inserted_at: started,
            last_access: started,
            hits: 0,
            complete,
        };

        let mut inner = self.lock();
        if let Some((old_key, _)) = inner.entries.push(key.clone(), entry) {
            // push hands back either the replaced value for `key` or the LRU victim
            if old_key != key {
                inner.evictions += 1;
            }
        }
        drop(inner);

        self.check_slow("put", started);
    }

    pub fn invalidate(&self, key: &LayerKey) -> bool {
        self.lock().entries.pop(key).is_some()
    }

    /// Remove the whole-layer key and every sub-key of `layer`
    pub fn invalidate_layer(&self, layer: Layer) -> usize {
        let mut inner = self.lock();
        let doomed: Vec<LayerKey> = inner
            .entries
            .iter()
            .filter(|(k, _)| k.layer == layer)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            inner.entries.pop(key);
        }
        doomed.len()
    }

    /// Drop every entry and reset all counters
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            max_entries: self.max_entries.get(),
        }
    }

    /// Cached keys in layer order
    pub fn keys(&self) -> Vec<LayerKey> {
        let mut keys: Vec<LayerKey> = self.lock().entries.iter().map(|(k, _)| k.clone()).collect();
        keys.sort();
        keys
    }
}
