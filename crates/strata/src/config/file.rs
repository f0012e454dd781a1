// crates/strata/src/config/file.rs
// File-based configuration from ~/.strata/config.toml (or an explicit path)

use crate::error::{Result, StrataError};
use crate::loader::TimeoutPolicy;
use crate::source::DEFAULT_EXTENSIONS;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Top-level config structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StrataConfig {
    pub timeouts: TimeoutsConfig,
    pub cache: CacheConfig,
    pub circuit: CircuitConfig,
    pub loader: LoaderSettings,
    pub task: TaskConfig,
}

/// Timeout ladder, one budget per operation class
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutsConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub cache_lookup: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub file_read: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub layer_load: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub full_load: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub analysis: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            cache_lookup: Duration::from_millis(100),
            file_read: Duration::from_millis(500),
            layer_load: Duration::from_millis(2_000),
            full_load: Duration::from_millis(5_000),
            analysis: Duration::from_millis(10_000),
        }
    }
}

/// Layer cache section
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry bound; the least-recently-used entry is evicted beyond it
    pub max_entries: usize,
    /// Optional time-to-live; expired entries read as misses
    #[serde(deserialize_with = "deserialize_opt_duration")]
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 64,
            ttl: None,
        }
    }
}

/// Circuit breaker section
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long an open circuit rejects requests before allowing a probe
    #[serde(deserialize_with = "deserialize_duration")]
    pub cooldown: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Loader / content source section
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderSettings {
    /// Layer reads allowed in flight at once during hierarchy and task loads
    pub max_concurrent_layers: usize,
    /// Root directory of the on-disk content tree
    pub content_root: Option<PathBuf>,
    /// File extensions treated as assets by the filesystem source
    pub extensions: Vec<String>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            max_concurrent_layers: 4,
            content_root: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Keyword tables for task-driven selection
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskConfig {
    pub index_keywords: Vec<String>,
    pub framework_keywords: Vec<String>,
    pub best_practice_keywords: Vec<String>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            index_keywords: owned(&["overview", "table of contents", "what is available"]),
            framework_keywords: owned(&[
                "architecture",
                "framework",
                "design pattern",
                "system design",
                "deep dive",
            ]),
            best_practice_keywords: owned(&[
                "best practice",
                "code review",
                "review",
                "checklist",
                "anti-pattern",
            ]),
        }
    }
}

impl StrataConfig {
    /// Load config.
    ///
    /// An explicit path must exist and parse. Without one, `~/.strata/config.toml`
    /// is used when present; a broken default file is logged and ignored.
    /// Environment overrides are applied and the result validated either way.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    StrataError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                let config = Self::from_toml_str(&contents)?;
                debug!(path = %path.display(), "Loaded config from file");
                config
            }
            None => Self::load_default_file(),
        };

        super::env::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn load_default_file() -> Self {
        let path = Self::config_path();

        match std::fs::read_to_string(&path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Parse a TOML document (no env overrides, no validation)
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// ~/.strata
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".strata")
    }

    /// Startup validation; every failure is a `Config` error
    pub fn validate(&self) -> Result<()> {
        TimeoutPolicy::new(self.timeouts)?;

        if self.cache.max_entries == 0 {
            return Err(StrataError::Config(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }
        if self.cache.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(StrataError::Config(
                "cache.ttl must be positive when set".to_string(),
            ));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(StrataError::Config(
                "circuit.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.circuit.cooldown.is_zero() {
            return Err(StrataError::Config(
                "circuit.cooldown must be positive".to_string(),
            ));
        }
        if self.loader.max_concurrent_layers == 0 {
            return Err(StrataError::Config(
                "loader.max_concurrent_layers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a human-readable duration ("500ms", "5s", "1m 30s")
pub fn parse_duration(s: &str) -> Result<Duration> {
    humantime::parse_duration(s.trim())
        .map_err(|e| StrataError::Config(format!("invalid duration '{}': {}", s, e)))
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

fn deserialize_opt_duration<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s.as_deref().map(str::trim) {
        None | Some("") | Some("none") | Some("off") => Ok(None),
        Some(s) => humantime::parse_duration(s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
