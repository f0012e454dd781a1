// crates/strata/src/loader/mod.rs
// Progressive loader: layered content under a timeout ladder
//
// A request flows cache -> in-flight table -> circuit breaker -> source.
// Reads run in spawned tasks so a caller giving up never cancels a read other
// callers are waiting on, and every outcome is reported through LoadStatus.

pub mod cache;
pub mod circuit_breaker;
pub mod inflight;
mod result;
pub mod search;
pub mod task_aware;
pub mod timeout;

pub use cache::{CacheEntry, LayerCache};
pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot};
pub use result::{Asset, LoadResult, estimate_tokens};
pub use search::SearchHit;
pub use task_aware::TaskSelector;
pub use timeout::TimeoutPolicy;

use crate::config::StrataConfig;
use crate::error::Result;
use crate::source::ContentSource;
use futures::future::{self, BoxFuture};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use inflight::{Flight, InFlight};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strata_types::{
    CacheStats, Layer, LayerKey, LoadStatus, OperationClass, SkipReason, SkippedAsset,
};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

/// Circuit breaker key: an operation class, optionally scoped to one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CircuitKey {
    pub class: OperationClass,
    pub layer: Option<Layer>,
}

impl CircuitKey {
    pub fn layer_load(layer: Layer) -> Self {
        Self {
            class: OperationClass::LayerLoad,
            layer: Some(layer),
        }
    }

    pub fn full_load() -> Self {
        Self {
            class: OperationClass::FullLoad,
            layer: None,
        }
    }
}

impl fmt::Display for CircuitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.layer {
            Some(layer) => write!(f, "{}:{}", self.class, layer),
            None => write!(f, "{}", self.class),
        }
    }
}

/// Static description of a layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerInfo {
    pub layer: Layer,
    pub ordinal: u8,
    pub name: &'static str,
    pub dir_name: &'static str,
    pub token_budget: usize,
}

impl From<Layer> for LayerInfo {
    fn from(layer: Layer) -> Self {
        Self {
            layer,
            ordinal: layer.ordinal(),
            name: layer.name(),
            dir_name: layer.dir_name(),
            token_budget: layer.token_budget(),
        }
    }
}

/// Loads layered content without ever blocking past its budgets.
///
/// Cheap to clone; clones share the cache, circuit breaker and in-flight table.
#[derive(Clone)]
pub struct ProgressiveLoader {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn ContentSource>,
    policy: TimeoutPolicy,
    cache: LayerCache,
    breaker: CircuitBreaker<CircuitKey>,
    inflight: InFlight<LoadResult>,
    selector: TaskSelector,
    max_concurrent_layers: usize,
    /// Last good category listing and when it was taken
    categories: Mutex<Option<(Instant, Vec<String>)>>,
    categories_ttl: Option<Duration>,
}

/// What one bounded pass over a key's assets produced
#[derive(Default)]
struct ReadOutcome {
    assets: Vec<Asset>,
    skipped: Vec<SkippedAsset>,
    /// The layer deadline fired during the pass
    deadline_hit: bool,
}

impl ReadOutcome {
    fn whole_key(key: &LayerKey, reason: SkipReason) -> Self {
        Self {
            deadline_hit: reason == SkipReason::Timeout,
            skipped: vec![SkippedAsset {
                key: key.clone(),
                asset_id: None,
                reason,
            }],
            ..Default::default()
        }
    }

    fn skip(&mut self, key: &LayerKey, asset_id: String, reason: SkipReason) {
        self.skipped.push(SkippedAsset {
            key: key.clone(),
            asset_id: Some(asset_id),
            reason,
        });
    }
}

/// Removes a read from the in-flight table when its task ends, panics included
struct FlightGuard {
    loader: ProgressiveLoader,
    key: LayerKey,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.loader.inner.inflight.finish(&self.key, self.id);
    }
}

impl ProgressiveLoader {
    /// Build a loader from validated configuration
    pub fn new(source: Arc<dyn ContentSource>, config: &StrataConfig) -> Result<Self> {
        config.validate()?;
        let policy = TimeoutPolicy::new(config.timeouts)?;
        Ok(Self::build(source, config, policy))
    }

    /// Loader with the default ladder, cache and breaker settings
    pub fn with_defaults(source: Arc<dyn ContentSource>) -> Self {
        Self::build(source, &StrataConfig::default(), TimeoutPolicy::default())
    }

    fn build(source: Arc<dyn ContentSource>, config: &StrataConfig, policy: TimeoutPolicy) -> Self {
        let cache = LayerCache::new(
            config.cache,
            policy.budget_for(OperationClass::CacheLookup),
        );
        Self {
            inner: Arc::new(Inner {
                source,
                policy,
                cache,
                breaker: CircuitBreaker::new(config.circuit),
                inflight: InFlight::new(),
                selector: TaskSelector::new(&config.task),
                max_concurrent_layers: config.loader.max_concurrent_layers.max(1),
                categories: Mutex::new(None),
                categories_ttl: config.cache.ttl,
            }),
        }
    }

    // ═══════════════════════════════════════
    // SINGLE KEY
    // ═══════════════════════════════════════

    /// Load one layer, or one sub-key of it
    pub async fn load(&self, layer: Layer, subkey: Option<&str>) -> LoadResult {
        self.load_key(&LayerKey::new(layer, subkey.map(str::to_string)))
            .await
    }

    /// Layer 1 only: the smallest useful foundation
    pub async fn load_core(&self) -> LoadResult {
        self.load(Layer::Core, None).await
    }

    pub async fn load_key(&self, key: &LayerKey) -> LoadResult {
        let start = Instant::now();
        match self.cached(key, start) {
            Some(hit) => hit,
            None => self.load_uncached(key, start).await,
        }
    }

    /// Counted cache lookup; a hit never reaches the circuit or the source
    fn cached(&self, key: &LayerKey, start: Instant) -> Option<LoadResult> {
        match self.inner.cache.get(key) {
            Some(entry) => {
                debug!(key = %key, hits = entry.hits, "Cache hit");
                Some(entry.result.into_cache_hit(start.elapsed()))
            }
            None => {
                debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Everything after a cache miss: coalesce, gate, read
    async fn load_uncached(&self, key: &LayerKey, start: Instant) -> LoadResult {
        let flight = self
            .inner
            .inflight
            .join_or_start(key, |id| self.start_read(key, id, start));

        let read = match flight {
            Flight::Joined(read) => {
                debug!(key = %key, "Joining in-flight read");
                read
            }
            Flight::Started(read) => read,
            Flight::Declined(result) => return result.with_elapsed(start.elapsed()),
        };
        read.await.with_elapsed(start.elapsed())
    }

    /// Runs under the in-flight lock: re-check the cache, gate on the
    /// circuit, then spawn the read.
    fn start_read(
        &self,
        key: &LayerKey,
        id: u64,
        start: Instant,
    ) -> std::result::Result<BoxFuture<'static, LoadResult>, LoadResult> {
        if let Some(result) = self.inner.cache.recheck(key) {
            return Err(result.into_cache_hit(Duration::ZERO));
        }

        let circuit = CircuitKey::layer_load(key.layer);
        if !self.inner.breaker.try_acquire(&circuit) {
            warn!(key = %key, circuit = %circuit, "Circuit open, skipping source read");
            let skipped = vec![SkippedAsset {
                key: key.clone(),
                asset_id: None,
                reason: SkipReason::CircuitOpen,
            }];
            return Err(self.fallback(key, LoadStatus::CircuitOpen, skipped));
        }

        let loader = self.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let _done = FlightGuard {
                loader: loader.clone(),
                key: task_key.clone(),
                id,
            };
            loader.read_and_record(&task_key, start).await
        });

        let key = key.clone();
        Ok(handle
            .map(move |joined| {
                joined.unwrap_or_else(|e| {
                    warn!(key = %key, error = %e, "Layer read task failed");
                    LoadResult::skipped_all(
                        vec![key],
                        LoadStatus::Error,
                        SkipReason::Error(e.to_string()),
                    )
                })
            })
            .boxed())
    }

    /// One bounded read of `key`, then cache and breaker bookkeeping.
    /// The breaker is updated exactly once per call.
    async fn read_and_record(&self, key: &LayerKey, start: Instant) -> LoadResult {
        let circuit = CircuitKey::layer_load(key.layer);
        let deadline = self
            .inner
            .policy
            .deadline_for(OperationClass::LayerLoad, start);

        let resume = self.inner.cache.get_partial(key);
        if let Some(partial) = &resume {
            debug!(key = %key, reused = partial.assets.len(), "Resuming partial read");
        }

        let outcome = self.read_assets(key, deadline, resume).await;
        let has_assets = !outcome.assets.is_empty();

        let (status, complete, failed) = if outcome.skipped.is_empty() {
            (LoadStatus::Success, true, false)
        } else if outcome.deadline_hit {
            (LoadStatus::Timeout, false, true)
        } else if has_assets {
            // Some assets failed or timed out individually; the source still answered
            (LoadStatus::Partial, false, false)
        } else if outcome
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::Timeout)
        {
            (LoadStatus::Timeout, false, true)
        } else {
            (LoadStatus::Error, false, true)
        };

        if failed {
            self.inner.breaker.record_failure(&circuit);
        } else {
            self.inner.breaker.record_success(&circuit);
        }

        if !has_assets && failed {
            warn!(
                key = %key,
                status = %status,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Layer read produced nothing"
            );
            return self
                .fallback(key, status, outcome.skipped)
                .with_elapsed(start.elapsed());
        }

        let result = LoadResult::new(vec![key.clone()], outcome.assets, outcome.skipped, status)
            .with_elapsed(start.elapsed());
        self.inner.cache.put(key.clone(), result.clone(), complete);

        if status.is_success() {
            debug!(key = %key, summary = %result.summary(), "Layer loaded");
        } else {
            warn!(key = %key, summary = %result.summary(), "Layer loaded with gaps");
        }
        result
    }

    /// List and read the assets for `key`, stopping at `deadline`.
    ///
    /// Each read is also bounded by the file-read budget. A read cut off by a
    /// deadline is dropped whole; assets carried over from `resume` are not re-read.
    async fn read_assets(
        &self,
        key: &LayerKey,
        deadline: Instant,
        resume: Option<LoadResult>,
    ) -> ReadOutcome {
        let source = &self.inner.source;
        let file_budget = self.inner.policy.budget_for(OperationClass::FileRead);

        let ids = match timeout_at(deadline, source.list_assets(key)).await {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Failed to list assets");
                return ReadOutcome::whole_key(key, SkipReason::Error(e.to_string()));
            }
            Err(_) => {
                warn!(key = %key, "Timed out listing assets");
                return ReadOutcome::whole_key(key, SkipReason::Timeout);
            }
        };

        let mut reusable: HashMap<String, Asset> = resume
            .map(|r| r.assets.into_iter().map(|a| (a.id.clone(), a)).collect())
            .unwrap_or_default();
        let mut outcome = ReadOutcome::default();

        for id in ids {
            if let Some(asset) = reusable.remove(&id) {
                outcome.assets.push(asset);
                continue;
            }

            let now = Instant::now();
            if outcome.deadline_hit || now >= deadline {
                outcome.deadline_hit = true;
                outcome.skip(key, id, SkipReason::Timeout);
                continue;
            }

            let file_deadline = deadline.min(now + file_budget);
            match timeout_at(file_deadline, source.read_asset(key, &id)).await {
                Ok(Ok(raw)) => {
                    debug!(key = %key, asset = %id, "Read asset");
                    outcome.assets.push(Asset::new(key.clone(), id, raw));
                }
                Ok(Err(e)) => {
                    debug!(key = %key, asset = %id, error = %e, "Asset read failed");
                    outcome.skip(key, id, SkipReason::Error(e.to_string()));
                }
                Err(_) => {
                    if Instant::now() >= deadline {
                        outcome.deadline_hit = true;
                    }
                    debug!(key = %key, asset = %id, "Asset read timed out");
                    outcome.skip(key, id, SkipReason::Timeout);
                }
            }
        }

        outcome
    }

    /// Stale content with status `Cached` if any exists, else an empty result
    fn fallback(&self, key: &LayerKey, status: LoadStatus, skipped: Vec<SkippedAsset>) -> LoadResult {
        match self.inner.cache.get_stale(key) {
            Some(stale) if !stale.assets.is_empty() => {
                info!(key = %key, instead_of = %status, "Serving stale cached content");
                LoadResult {
                    status: LoadStatus::Cached,
                    skipped,
                    from_cache: true,
                    ..stale
                }
            }
            _ => LoadResult::new(vec![key.clone()], Vec::new(), skipped, status),
        }
    }

    // ═══════════════════════════════════════
    // MULTI KEY
    // ═══════════════════════════════════════

    /// Load `Index..=max_layer` under the full-load ceiling
    pub async fn load_hierarchy(&self, max_layer: Layer) -> LoadResult {
        let keys = max_layer.up_to().map(LayerKey::layer).collect();
        self.load_many(keys, Instant::now(), Some(CircuitKey::full_load()))
            .await
    }

    /// Load only the keys a task description calls for.
    ///
    /// Gated by the per-layer circuits only; the full-load circuit belongs to
    /// hierarchy loads.
    pub async fn load_by_task(&self, task: &str) -> LoadResult {
        let start = Instant::now();
        let categories = self.categories().await;
        let keys = self.inner.selector.select(task, &categories);
        debug!(
            task,
            keys = %keys.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(","),
            "Selected keys for task"
        );
        self.load_many(keys, start, None).await
    }

    /// Cache hits first, then the uncached keys under the full-load ceiling.
    ///
    /// `aggregate` only gates keys that need the source; an open aggregate
    /// circuit skips those with `CircuitOpen` and keeps the hits.
    async fn load_many(
        &self,
        keys: Vec<LayerKey>,
        start: Instant,
        aggregate: Option<CircuitKey>,
    ) -> LoadResult {
        let mut slots: Vec<Option<LoadResult>> =
            keys.iter().map(|key| self.cached(key, start)).collect();
        let mut uncached: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
            .collect();

        let mut acquired = None;
        if let Some(circuit) = aggregate.filter(|_| !uncached.is_empty()) {
            if self.inner.breaker.try_acquire(&circuit) {
                acquired = Some(circuit);
            } else {
                warn!(
                    circuit = %circuit,
                    uncached = uncached.len(),
                    "Circuit open, skipping uncached layers"
                );
                for index in uncached.drain(..) {
                    let key = &keys[index];
                    let skipped = vec![SkippedAsset {
                        key: key.clone(),
                        asset_id: None,
                        reason: SkipReason::CircuitOpen,
                    }];
                    slots[index] = Some(
                        self.fallback(key, LoadStatus::CircuitOpen, skipped)
                            .with_elapsed(start.elapsed()),
                    );
                }
            }
        }

        let ceiling = self
            .inner
            .policy
            .deadline_for(OperationClass::FullLoad, start);
        let limit = self.inner.max_concurrent_layers;

        let mut pending = FuturesUnordered::new();
        let mut next = 0;
        let mut ceiling_hit = false;

        while next < uncached.len() || !pending.is_empty() {
            while pending.len() < limit && next < uncached.len() {
                let loader = self.clone();
                let index = uncached[next];
                let key = keys[index].clone();
                pending.push(async move {
                    (index, loader.load_uncached(&key, Instant::now()).await)
                });
                next += 1;
            }

            match timeout_at(ceiling, pending.next()).await {
                Ok(Some((index, part))) => slots[index] = Some(part),
                Ok(None) => break,
                Err(_) => {
                    ceiling_hit = true;
                    break;
                }
            }
        }

        if ceiling_hit {
            warn!(
                unfinished = slots.iter().filter(|s| s.is_none()).count(),
                "Full-load ceiling reached"
            );
        }
        if let Some(circuit) = acquired {
            if ceiling_hit {
                self.inner.breaker.record_failure(&circuit);
            } else {
                self.inner.breaker.record_success(&circuit);
            }
        }

        let mut assets = Vec::new();
        let mut skipped = Vec::new();
        let mut statuses = Vec::new();
        let mut from_cache = !keys.is_empty();

        for (key, slot) in keys.iter().zip(slots) {
            match slot {
                Some(part) => {
                    from_cache &= part.from_cache;
                    statuses.push(part.status);
                    assets.extend(part.assets);
                    skipped.extend(part.skipped);
                }
                None => {
                    from_cache = false;
                    skipped.push(SkippedAsset {
                        key: key.clone(),
                        asset_id: None,
                        reason: SkipReason::AggregateTimeout,
                    });
                }
            }
        }

        let status = aggregate_status(&statuses, keys.len(), !assets.is_empty(), ceiling_hit);
        let mut result = LoadResult::new(keys, assets, skipped, status).with_elapsed(start.elapsed());
        result.from_cache = from_cache;

        info!(summary = %result.summary(), "Multi-layer load finished");
        result
    }

    // ═══════════════════════════════════════
    // SEARCH
    // ═══════════════════════════════════════

    /// Keyword search over cached content.
    ///
    /// With explicit `layers`, those layers are loaded first. Without, only
    /// what is already cached is searched. Bounded by the analysis budget.
    pub async fn search(&self, query: &str, layers: Option<&[Layer]>) -> Vec<SearchHit> {
        let start = Instant::now();
        let deadline = self
            .inner
            .policy
            .deadline_for(OperationClass::Analysis, start);

        let keywords = search::keywords(query);
        if keywords.is_empty() {
            return Vec::new();
        }

        if let Some(layers) = layers {
            let loads = layers.iter().map(|layer| {
                let key = LayerKey::layer(*layer);
                async move { self.load_key(&key).await }
            });
            if timeout_at(deadline, future::join_all(loads)).await.is_err() {
                warn!(query, "Search load phase reached the analysis budget");
            }
        }

        let wanted: Option<HashSet<Layer>> = layers.map(|l| l.iter().copied().collect());
        let mut seen = HashSet::new();
        let mut hits = Vec::new();

        'keys: for key in self.inner.cache.keys() {
            if wanted.as_ref().is_some_and(|w| !w.contains(&key.layer)) {
                continue;
            }
            let Some(result) = self.inner.cache.peek(&key) else {
                continue;
            };
            for asset in &result.assets {
                if Instant::now() >= deadline {
                    warn!(query, hits = hits.len(), "Search reached the analysis budget");
                    break 'keys;
                }
                // Whole-layer and sub-key entries can hold the same asset
                if !seen.insert((asset.key.layer, asset.id.clone())) {
                    continue;
                }
                if let Some(hit) = search::search_asset(asset, &keywords) {
                    hits.push(hit);
                }
            }
        }

        search::rank(&mut hits);
        debug!(
            query,
            hits = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search finished"
        );
        hits
    }

    // ═══════════════════════════════════════
    // MAINTENANCE + INTROSPECTION
    // ═══════════════════════════════════════

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        *self.categories_memo() = None;
        info!("Layer cache cleared");
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Drop one cached key
    pub fn invalidate(&self, key: &LayerKey) -> bool {
        self.inner.cache.invalidate(key)
    }

    /// Drop a layer and all of its sub-keys
    pub fn invalidate_layer(&self, layer: Layer) -> usize {
        if layer == Layer::Guidelines {
            *self.categories_memo() = None;
        }
        self.inner.cache.invalidate_layer(layer)
    }

    /// Invalidate then load again from the source
    pub async fn refresh(&self, key: &LayerKey) -> LoadResult {
        self.invalidate(key);
        self.load_key(key).await
    }

    pub fn circuit_status(&self) -> Vec<CircuitSnapshot<CircuitKey>> {
        let mut snapshots = self.inner.breaker.snapshots();
        snapshots.sort_by_key(|s| s.key);
        snapshots
    }

    pub fn reset_circuits(&self) {
        self.inner.breaker.reset();
    }

    pub fn layers(&self) -> Vec<LayerInfo> {
        Layer::ALL.into_iter().map(LayerInfo::from).collect()
    }

    /// Guideline categories offered by the source.
    ///
    /// A good listing is kept until it expires or the cache is cleared. A
    /// fresh listing is bounded by the layer budget and gated by the
    /// Guidelines circuit; when it fails, the last good listing is returned.
    pub async fn categories(&self) -> Vec<String> {
        let now = Instant::now();
        let fresh = {
            let memo = self.categories_memo();
            memo.as_ref()
                .filter(|(taken, _)| {
                    self.inner
                        .categories_ttl
                        .is_none_or(|ttl| now.duration_since(*taken) < ttl)
                })
                .map(|(_, known)| known.clone())
        };
        if let Some(known) = fresh {
            return known;
        }

        let circuit = CircuitKey::layer_load(Layer::Guidelines);
        if !self.inner.breaker.try_acquire(&circuit) {
            debug!(circuit = %circuit, "Circuit open, skipping category listing");
            return self.last_categories();
        }

        let budget = self.inner.policy.budget_for(OperationClass::LayerLoad);
        match tokio::time::timeout(budget, self.inner.source.categories()).await {
            Ok(Ok(categories)) => {
                self.inner.breaker.record_success(&circuit);
                *self.categories_memo() = Some((Instant::now(), categories.clone()));
                categories
            }
            Ok(Err(e)) => {
                self.inner.breaker.record_failure(&circuit);
                warn!(error = %e, "Failed to list categories");
                self.last_categories()
            }
            Err(_) => {
                self.inner.breaker.record_failure(&circuit);
                warn!("Timed out listing categories");
                self.last_categories()
            }
        }
    }

    fn categories_memo(&self) -> MutexGuard<'_, Option<(Instant, Vec<String>)>> {
        self.inner
            .categories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn last_categories(&self) -> Vec<String> {
        self.categories_memo()
            .as_ref()
            .map(|(_, known)| known.clone())
            .unwrap_or_default()
    }

    pub fn timeouts(&self) -> TimeoutPolicy {
        self.inner.policy
    }
}

/// Combine per-key statuses of a multi-key load
fn aggregate_status(
    parts: &[LoadStatus],
    expected: usize,
    has_assets: bool,
    ceiling_hit: bool,
) -> LoadStatus {
    if !ceiling_hit && parts.len() == expected && parts.iter().all(|s| s.is_success()) {
        return LoadStatus::Success;
    }
    if has_assets {
        return LoadStatus::Partial;
    }
    if !ceiling_hit && !parts.is_empty() && parts.iter().all(|s| *s == LoadStatus::CircuitOpen) {
        LoadStatus::CircuitOpen
    } else if ceiling_hit || parts.contains(&LoadStatus::Timeout) {
        LoadStatus::Timeout
    } else {
        LoadStatus::Error
    }
}
