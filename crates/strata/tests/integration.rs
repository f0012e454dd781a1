//! Integration tests for the progressive loader
//!
//! These drive `ProgressiveLoader` end to end against scripted content sources,
//! using a compressed timeout ladder so deadline behaviour is observable quickly.


use std::sync::Arc;
use std::time::Instant;
use strata::config::StrataConfig;
use strata::loader::{CircuitKey, ProgressiveLoader};
use strata::source::{FsSource, MemorySource};
use strata_types::{CircuitState, Layer, LayerKey, LoadStatus, SkipReason};
use test_utils::{Behaviour, TestSource, fast_config, ms};

fn loader_with(source: &Arc<TestSource>, config: &StrataConfig) -> ProgressiveLoader {
    ProgressiveLoader::new(source.clone(), config).unwrap()
}

fn fast_loader() -> (Arc<TestSource>, ProgressiveLoader) {
    let source = Arc::new(TestSource::sample());
    let loader = loader_with(&source, &fast_config());
    (source, loader)
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn test_second_load_is_served_from_cache() {
    let (source, loader) = fast_loader();
    source.set_behaviour(Layer::Core, Behaviour::Delay(ms(30)));

    let first = loader.load_core().await;
    let second = loader.load_core().await;

    assert_eq!(first.status, LoadStatus::Success);
    assert_eq!(second.status, LoadStatus::Success);
    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.assets, second.assets);
    assert!(
        second.elapsed * 10 <= first.elapsed,
        "cache hit took {:?}, fresh read {:?}",
        second.elapsed,
        first.elapsed
    );

    let stats = loader.get_cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(source.list_calls(Layer::Core), 1);
}

#[tokio::test]
async fn test_clear_cache_forces_a_miss() {
    let (source, loader) = fast_loader();
    loader.load_core().await;
    loader.clear_cache();

    let stats = loader.get_cache_stats();
    assert_eq!(stats.entries, 0);
    assert_eq!((stats.hits, stats.misses), (0, 0));

    let again = loader.load_core().await;
    assert!(!again.from_cache);
    assert_eq!(loader.get_cache_stats().misses, 1);
    assert_eq!(source.list_calls(Layer::Core), 2);
}

#[tokio::test]
async fn test_lru_bound_evicts_oldest_layer() {
    let source = Arc::new(TestSource::sample());
    let mut config = fast_config();
    config.cache.max_entries = 2;
    let loader = loader_with(&source, &config);

    loader.load(Layer::Index, None).await;
    loader.load(Layer::Core, None).await;
    loader.load(Layer::Guidelines, None).await;

    let stats = loader.get_cache_stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.evictions, 1);

    // Index was least recently used, so it is read again
    let index = loader.load(Layer::Index, None).await;
    assert!(!index.from_cache);
    assert_eq!(source.list_calls(Layer::Index), 2);
}

#[tokio::test]
async fn test_ttl_expiry_rereads() {
    let source = Arc::new(TestSource::sample());
    let mut config = fast_config();
    config.cache.ttl = Some(ms(50));
    let loader = loader_with(&source, &config);

    loader.load_core().await;
    tokio::time::sleep(ms(80)).await;
    let result = loader.load_core().await;

    assert_eq!(result.status, LoadStatus::Success);
    assert!(!result.from_cache);
    assert_eq!(source.list_calls(Layer::Core), 2);
}

// ============================================================================
// Deadlines
// ============================================================================

#[tokio::test]
async fn test_stalled_source_times_out_within_budget() {
    let (source, loader) = fast_loader();
    source.set_behaviour(Layer::Core, Behaviour::Stall);

    let started = Instant::now();
    let result = loader.load_core().await;
    let elapsed = started.elapsed();

    assert_eq!(result.status, LoadStatus::Timeout);
    assert!(result.is_empty());
    assert_eq!(result.skipped[0].reason, SkipReason::Timeout);
    assert!(elapsed >= ms(150), "returned before the layer budget: {:?}", elapsed);
    assert!(elapsed < ms(150 + 50), "overran the layer budget: {:?}", elapsed);
}

#[tokio::test]
async fn test_slow_asset_is_skipped_and_resumed() {
    let (source, loader) = fast_loader();
    source.insert(Layer::Core, "slow.md", "Eventually consistent");
    source.set_asset_delay("slow.md", Some(ms(100)));

    let first = loader.load_core().await;
    assert_eq!(first.status, LoadStatus::Partial);
    assert_eq!(first.asset_ids(), vec!["naming.md", "principles.md"]);
    assert_eq!(first.skipped.len(), 1);
    assert_eq!(first.skipped[0].asset_id.as_deref(), Some("slow.md"));
    assert_eq!(first.skipped[0].reason, SkipReason::Timeout);

    // A file-level timeout is not a source failure
    let circuit = loader
        .circuit_status()
        .into_iter()
        .find(|s| s.key == CircuitKey::layer_load(Layer::Core))
        .unwrap();
    assert_eq!(circuit.consecutive_failures, 0);

    source.set_asset_delay("slow.md", None);
    let second = loader.load_core().await;
    assert_eq!(second.status, LoadStatus::Success);
    assert!(!second.from_cache);
    assert_eq!(second.assets.len(), 3);

    // Completed assets were carried over, only the missing one was read again
    assert_eq!(source.reads_of("naming.md"), 1);
    assert_eq!(source.reads_of("principles.md"), 1);
    assert_eq!(source.reads_of("slow.md"), 2);
}

#[tokio::test]
async fn test_layer_deadline_keeps_completed_assets() {
    let source = Arc::new(TestSource::new(
        MemorySource::new()
            .with_asset(Layer::Core, "a.md", "alpha")
            .with_asset(Layer::Core, "b.md", "beta")
            .with_asset(Layer::Core, "c.md", "gamma")
            .with_asset(Layer::Core, "d.md", "delta")
            .with_asset(Layer::Core, "e.md", "epsilon"),
    ));
    for id in ["b.md", "c.md", "d.md", "e.md"] {
        source.set_asset_delay(id, Some(ms(40)));
    }
    let loader = loader_with(&source, &fast_config());

    let result = loader.load_core().await;
    assert_eq!(result.status, LoadStatus::Timeout);
    assert!(!result.is_empty());
    assert!(result.asset_ids().contains(&"a.md"));
    assert!(!result.asset_ids().contains(&"e.md"));
    assert!(result.skipped.iter().all(|s| s.reason == SkipReason::Timeout));

    // Abandoned asset never shows up half-read
    for asset in &result.assets {
        assert_eq!(asset.bytes, asset.text.len());
    }

    let circuit = loader
        .circuit_status()
        .into_iter()
        .find(|s| s.key == CircuitKey::layer_load(Layer::Core))
        .unwrap();
    assert_eq!(circuit.consecutive_failures, 1);
}

// ============================================================================
// Circuit breaker
// ============================================================================

#[tokio::test]
async fn test_circuit_opens_after_consecutive_failures() {
    let (source, loader) = fast_loader();
    source.set_behaviour(Layer::Core, Behaviour::Fail);

    for _ in 0..3 {
        let result = loader.load_core().await;
        assert_eq!(result.status, LoadStatus::Error);
    }
    assert_eq!(source.list_calls(Layer::Core), 3);

    let rejected = loader.load_core().await;
    assert_eq!(rejected.status, LoadStatus::CircuitOpen);
    assert_eq!(rejected.skipped[0].reason, SkipReason::CircuitOpen);
    assert_eq!(source.list_calls(Layer::Core), 3, "open circuit must not call the source");

    // Other layers are unaffected
    assert_eq!(loader.load(Layer::Index, None).await.status, LoadStatus::Success);
}

#[tokio::test]
async fn test_single_probe_after_cooldown_closes_circuit() {
    let (source, loader) = fast_loader();
    source.set_behaviour(Layer::Core, Behaviour::Fail);
    for _ in 0..3 {
        loader.load_core().await;
    }

    source.set_behaviour(Layer::Core, Behaviour::Delay(ms(40)));
    tokio::time::sleep(ms(250)).await;

    let (a, b) = tokio::join!(loader.load_core(), loader.load_core());
    assert_eq!(a.status, LoadStatus::Success);
    assert_eq!(b.status, LoadStatus::Success);
    assert_eq!(source.list_calls(Layer::Core), 4, "exactly one probe reaches the source");

    let circuit = loader
        .circuit_status()
        .into_iter()
        .find(|s| s.key == CircuitKey::layer_load(Layer::Core))
        .unwrap();
    assert_eq!(circuit.state, CircuitState::Closed);
    assert_eq!(circuit.consecutive_failures, 0);
}

#[tokio::test]
async fn test_stale_content_served_when_source_fails() {
    let source = Arc::new(TestSource::sample());
    let mut config = fast_config();
    config.cache.ttl = Some(ms(50));
    let loader = loader_with(&source, &config);

    let fresh = loader.load_core().await;
    tokio::time::sleep(ms(80)).await;
    source.set_behaviour(Layer::Core, Behaviour::Fail);

    let result = loader.load_core().await;
    assert_eq!(result.status, LoadStatus::Cached);
    assert!(result.from_cache);
    assert_eq!(result.assets, fresh.assets);
    assert!(matches!(result.skipped[0].reason, SkipReason::Error(_)));
}

// ============================================================================
// Multi-layer loads
// ============================================================================

#[tokio::test]
async fn test_hierarchy_survives_stalled_layer() {
    let (source, loader) = fast_loader();
    source.set_behaviour(Layer::Core, Behaviour::Stall);

    let started = Instant::now();
    let result = loader.load_hierarchy(Layer::Guidelines).await;
    let elapsed = started.elapsed();

    assert_eq!(result.status, LoadStatus::Partial);
    assert!(result.asset_ids().contains(&"README.md"));
    assert!(result.asset_ids().contains(&"security/auth.md"));
    assert!(result.assets.iter().all(|a| a.key.layer != Layer::Core));

    let core_skip = result
        .skipped
        .iter()
        .find(|s| s.key == LayerKey::layer(Layer::Core))
        .unwrap();
    assert_eq!(core_skip.reason, SkipReason::Timeout);
    assert!(elapsed < ms(400), "hierarchy overran the full-load budget: {:?}", elapsed);
}

#[tokio::test]
async fn test_full_load_ceiling_skips_unfinished_layers() {
    let source = Arc::new(TestSource::sample());
    for layer in Layer::ALL {
        source.set_behaviour(layer, Behaviour::Delay(ms(130)));
    }
    let mut config = fast_config();
    config.timeouts.layer_load = ms(200);
    config.timeouts.full_load = ms(450);
    config.loader.max_concurrent_layers = 1;
    let loader = loader_with(&source, &config);

    let result = loader.load_hierarchy(Layer::BestPractices).await;

    assert_eq!(result.status, LoadStatus::Partial);
    assert!(result.asset_ids().contains(&"README.md"));
    let aggregate_skips: Vec<Layer> = result
        .skipped
        .iter()
        .filter(|s| s.reason == SkipReason::AggregateTimeout)
        .map(|s| s.key.layer)
        .collect();
    assert!(aggregate_skips.contains(&Layer::Frameworks));
    assert!(aggregate_skips.contains(&Layer::BestPractices));
    // Never issued past the ceiling
    assert_eq!(source.list_calls(Layer::BestPractices), 0);
}

#[tokio::test]
async fn test_concurrent_loads_share_one_read() {
    let (source, loader) = fast_loader();
    source.set_behaviour(Layer::Core, Behaviour::Delay(ms(50)));

    let (a, b) = tokio::join!(loader.load_core(), loader.load_core());

    assert_eq!(source.list_calls(Layer::Core), 1);
    assert_eq!(source.reads_of("principles.md"), 1);
    assert_eq!(a.status, LoadStatus::Success);
    assert_eq!(b.status, LoadStatus::Success);
    assert_eq!(a.assets, b.assets);
}

#[tokio::test]
async fn test_task_load_is_economical() {
    let (source, loader) = fast_loader();

    let result = loader.load_by_task("rename the logger variable").await;
    assert_eq!(result.requested, vec![LayerKey::layer(Layer::Core)]);
    assert_eq!(result.status, LoadStatus::Success);
    assert_eq!(source.total_list_calls(), 1);

    let result = loader
        .load_by_task("review the testing setup against our architecture")
        .await;
    assert_eq!(
        result.requested,
        vec![
            LayerKey::layer(Layer::Core),
            LayerKey::with_subkey(Layer::Guidelines, "testing"),
            LayerKey::layer(Layer::Frameworks),
            LayerKey::layer(Layer::BestPractices),
        ]
    );
    assert!(result.asset_ids().contains(&"testing/unit.md"));
    assert!(!result.asset_ids().contains(&"security/auth.md"));
}

fn full_load_circuit(loader: &ProgressiveLoader) -> CircuitState {
    loader
        .circuit_status()
        .into_iter()
        .find(|s| s.key == CircuitKey::full_load())
        .map(|s| s.state)
        .unwrap_or(CircuitState::Closed)
}

#[tokio::test]
async fn test_open_full_load_circuit_still_serves_cached_layers() {
    let source = Arc::new(TestSource::sample());
    let mut config = fast_config();
    config.timeouts.layer_load = ms(300);
    config.timeouts.full_load = ms(400);
    config.loader.max_concurrent_layers = 1;
    let loader = loader_with(&source, &config);

    let warm = loader.load_hierarchy(Layer::Guidelines).await;
    assert_eq!(warm.status, LoadStatus::Success);

    source.set_behaviour(Layer::Frameworks, Behaviour::Stall);
    source.set_behaviour(Layer::BestPractices, Behaviour::Stall);
    for _ in 0..3 {
        let result = loader.load_hierarchy(Layer::BestPractices).await;
        assert_eq!(result.status, LoadStatus::Partial);
        assert!(
            result
                .skipped
                .iter()
                .any(|s| s.reason == SkipReason::AggregateTimeout)
        );
    }
    assert_eq!(full_load_circuit(&loader), CircuitState::Open);

    // Fully cached requests never consult the full-load circuit
    let core = loader.load_hierarchy(Layer::Core).await;
    assert_eq!(core.status, LoadStatus::Success);
    assert!(core.from_cache);
    assert_eq!(core.asset_ids(), vec!["README.md", "naming.md", "principles.md"]);

    let task = loader.load_by_task("rename the logger variable").await;
    assert_eq!(task.status, LoadStatus::Success);
    assert!(task.from_cache);

    // Uncached layers are skipped, cached ones are kept
    let started = Instant::now();
    let mixed = loader.load_hierarchy(Layer::BestPractices).await;
    assert!(started.elapsed() < ms(50), "open circuit waited {:?}", started.elapsed());
    assert_eq!(mixed.status, LoadStatus::Partial);
    assert!(mixed.asset_ids().contains(&"security/auth.md"));
    let open_skips: Vec<Layer> = mixed
        .skipped
        .iter()
        .filter(|s| s.reason == SkipReason::CircuitOpen)
        .map(|s| s.key.layer)
        .collect();
    assert_eq!(open_skips, vec![Layer::Frameworks, Layer::BestPractices]);

    // Outlast the abandoned reads and the cooldown, then recover
    source.set_behaviour(Layer::Frameworks, Behaviour::Normal);
    source.set_behaviour(Layer::BestPractices, Behaviour::Normal);
    tokio::time::sleep(ms(600)).await;

    let recovered = loader.load_hierarchy(Layer::BestPractices).await;
    assert_eq!(recovered.status, LoadStatus::Success);
    assert!(recovered.asset_ids().contains(&"review.md"));
    assert_eq!(full_load_circuit(&loader), CircuitState::Closed);
}

#[tokio::test]
async fn test_task_load_bounds_stalled_category_listing() {
    let (source, loader) = fast_loader();
    loader.load_core().await;
    source.set_categories_behaviour(Behaviour::Stall);

    let mut last = None;
    for _ in 0..5 {
        let started = Instant::now();
        let result = loader.load_by_task("rename the logger variable").await;
        assert_eq!(result.status, LoadStatus::Success);
        assert_eq!(result.requested, vec![LayerKey::layer(Layer::Core)]);
        last = Some(started.elapsed());
    }

    // Three timeouts trip the Guidelines circuit; later listings never reach the source
    assert_eq!(source.categories_calls(), 3);
    let last = last.unwrap();
    assert!(last < ms(50), "open circuit still waited {:?}", last);
}

#[tokio::test]
async fn test_category_listing_is_reused_until_cleared() {
    let (source, loader) = fast_loader();

    let first = loader.load_by_task("check the security setup").await;
    assert!(first.asset_ids().contains(&"security/auth.md"));
    loader.load_by_task("check the testing setup").await;
    assert_eq!(source.categories_calls(), 1);

    loader.clear_cache();
    loader.load_by_task("check the testing setup").await;
    assert_eq!(source.categories_calls(), 2);

    loader.invalidate_layer(Layer::Guidelines);
    loader.categories().await;
    assert_eq!(source.categories_calls(), 3);
}

#[tokio::test]
async fn test_expired_category_listing_falls_back_when_source_fails() {
    let source = Arc::new(TestSource::sample());
    let mut config = fast_config();
    config.cache.ttl = Some(ms(50));
    let loader = loader_with(&source, &config);

    assert_eq!(loader.categories().await, vec!["security", "testing"]);
    tokio::time::sleep(ms(80)).await;
    source.set_categories_behaviour(Behaviour::Fail);

    assert_eq!(loader.categories().await, vec!["security", "testing"]);
    assert_eq!(source.categories_calls(), 2);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_ranks_by_match_count_then_layer() {
    let (_source, loader) = fast_loader();
    let hits = loader
        .search("auth", Some(&[Layer::Guidelines, Layer::Frameworks][..]))
        .await;

    let order: Vec<&str> = hits.iter().map(|h| h.asset_id.as_str()).collect();
    assert_eq!(order, vec!["security/auth.md", "testing/unit.md", "layered.md"]);
    assert!(hits.iter().all(|h| h.match_count == 1));
    assert_eq!(hits[0].positions, vec![7]);
}

// ============================================================================
// Filesystem source
// ============================================================================

#[tokio::test]
async fn test_filesystem_hierarchy() {
    let dir = tempfile::TempDir::new().unwrap();
    let write = |rel: &str, text: &str| {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    };
    write("00-index/README.md", "Index");
    write("01-core/principles.md", "Core principles");
    write("02-guidelines/security/auth.md", "Auth guidance");

    let loader = ProgressiveLoader::new(
        Arc::new(FsSource::new(dir.path())),
        &StrataConfig::default(),
    )
    .unwrap();

    let result = loader.load_hierarchy(Layer::Guidelines).await;
    assert_eq!(result.status, LoadStatus::Success);
    assert_eq!(
        result.asset_ids(),
        vec!["README.md", "principles.md", "security/auth.md"]
    );
    assert_eq!(loader.categories().await, vec!["security"]);

    // Missing layer directory degrades, it does not fail the call
    let frameworks = loader.load(Layer::Frameworks, None).await;
    assert_eq!(frameworks.status, LoadStatus::Error);
}
