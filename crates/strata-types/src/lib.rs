// crates/strata-types/src/lib.rs
// Shared types for Strata
// No runtime dependencies allowed here (serde only)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ═══════════════════════════════════════
// LAYERS
// ═══════════════════════════════════════

/// A tier of reference content, from most essential to most detailed.
///
/// Layers are totally ordered by ordinal. The order is a recommended load
/// order only: loading one layer never requires another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Index,
    Core,
    Guidelines,
    Frameworks,
    BestPractices,
}

impl Layer {
    /// Every layer, in load order
    pub const ALL: [Layer; 5] = [
        Layer::Index,
        Layer::Core,
        Layer::Guidelines,
        Layer::Frameworks,
        Layer::BestPractices,
    ];

    pub fn ordinal(self) -> u8 {
        match self {
            Self::Index => 0,
            Self::Core => 1,
            Self::Guidelines => 2,
            Self::Frameworks => 3,
            Self::BestPractices => 4,
        }
    }

    pub fn from_ordinal(n: u8) -> Option<Self> {
        Self::ALL.get(n as usize).copied()
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Index => "Index",
            Self::Core => "Core Principles",
            Self::Guidelines => "Guidelines",
            Self::Frameworks => "Deep Frameworks",
            Self::BestPractices => "Best Practices",
        }
    }

    /// Short identifier used in keys, logs and the CLI
    pub fn slug(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Core => "core",
            Self::Guidelines => "guidelines",
            Self::Frameworks => "frameworks",
            Self::BestPractices => "best-practices",
        }
    }

    /// Directory name used by on-disk content sources
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Index => "00-index",
            Self::Core => "01-core",
            Self::Guidelines => "02-guidelines",
            Self::Frameworks => "03-frameworks",
            Self::BestPractices => "04-best-practices",
        }
    }

    /// Approximate token budget a full load of this layer is expected to cost
    pub fn token_budget(self) -> usize {
        match self {
            Self::Index => 500,
            Self::Core => 2_000,
            Self::Guidelines => 4_000,
            Self::Frameworks => 8_000,
            Self::BestPractices => 6_000,
        }
    }

    /// This layer and every layer before it, in load order
    pub fn up_to(self) -> impl Iterator<Item = Layer> {
        Self::ALL.into_iter().filter(move |l| *l <= self)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Error returned when a layer identifier is not recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLayerError(pub String);

impl fmt::Display for ParseLayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown layer '{}'", self.0)
    }
}

impl std::error::Error for ParseLayerError {}

impl FromStr for Layer {
    type Err = ParseLayerError;

    /// Accepts the slug (`core`), `lN` (`l1`), the bare ordinal (`1`) and the
    /// directory name (`01-core`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let normalized = lower.replace('_', "-");

        if let Some(layer) = Self::ALL
            .into_iter()
            .find(|l| l.slug() == normalized || l.dir_name() == normalized)
        {
            return Ok(layer);
        }

        let digits = normalized.strip_prefix('l').unwrap_or(&normalized);
        if let Ok(n) = digits.parse::<u8>() {
            if let Some(layer) = Self::from_ordinal(n) {
                return Ok(layer);
            }
        }

        match normalized.as_str() {
            "core-principles" | "principles" => Ok(Self::Core),
            "bestpractices" | "practices" => Ok(Self::BestPractices),
            _ => Err(ParseLayerError(s.to_string())),
        }
    }
}

// ═══════════════════════════════════════
// KEYS
// ═══════════════════════════════════════

/// Cache / coalescing key: a layer plus an optional sub-key (e.g. a guideline category)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerKey {
    pub layer: Layer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subkey: Option<String>,
}

impl LayerKey {
    pub fn new(layer: Layer, subkey: Option<String>) -> Self {
        // Blank subkeys collapse to the whole-layer key
        let subkey = subkey
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self { layer, subkey }
    }

    pub fn layer(layer: Layer) -> Self {
        Self {
            layer,
            subkey: None,
        }
    }

    pub fn with_subkey(layer: Layer, subkey: impl Into<String>) -> Self {
        Self::new(layer, Some(subkey.into()))
    }
}

impl From<Layer> for LayerKey {
    fn from(layer: Layer) -> Self {
        Self::layer(layer)
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subkey {
            Some(sub) => write!(f, "{}/{}", self.layer, sub),
            None => write!(f, "{}", self.layer),
        }
    }
}

// ═══════════════════════════════════════
// TIMEOUT LADDER
// ═══════════════════════════════════════

/// Operation classes, fastest budget first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    CacheLookup,
    FileRead,
    LayerLoad,
    FullLoad,
    Analysis,
}

impl OperationClass {
    pub const ALL: [OperationClass; 5] = [
        OperationClass::CacheLookup,
        OperationClass::FileRead,
        OperationClass::LayerLoad,
        OperationClass::FullLoad,
        OperationClass::Analysis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheLookup => "cache_lookup",
            Self::FileRead => "file_read",
            Self::LayerLoad => "layer_load",
            Self::FullLoad => "full_load",
            Self::Analysis => "analysis",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════
// LOAD OUTCOMES
// ═══════════════════════════════════════

/// Outcome of a load operation. Degradation is always reported here, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    /// Everything requested was loaded (fresh read or fresh cache hit)
    Success,
    /// Some assets or keys were loaded, others skipped
    Partial,
    /// A deadline fired before anything useful completed
    Timeout,
    /// The circuit for this operation was open; the source was not called
    CircuitOpen,
    /// The source failed outright
    Error,
    /// Stale cached content served in place of a read that could not run
    Cached,
}

impl LoadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Partial => "PARTIAL",
            Self::Timeout => "TIMEOUT",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::Error => "ERROR",
            Self::Cached => "CACHED",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Anything other than a complete, fresh result
    pub fn is_degraded(self) -> bool {
        !self.is_success()
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an asset (or a whole key) was left out of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum SkipReason {
    /// The layer or file deadline fired before this asset completed
    Timeout,
    /// The full-load ceiling fired
    AggregateTimeout,
    /// The circuit was open
    CircuitOpen,
    /// The source reported an error
    Error(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::AggregateTimeout => f.write_str("aggregate timeout"),
            Self::CircuitOpen => f.write_str("circuit open"),
            Self::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// An asset (or whole key, when `asset_id` is absent) left out of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedAsset {
    pub key: LayerKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    pub reason: SkipReason,
}

// ═══════════════════════════════════════
// CIRCUIT + CACHE REPORTING
// ═══════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

/// Cumulative cache counters (reset only by a full clear)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub max_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
