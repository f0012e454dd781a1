// crates/strata/src/config/env.rs
// Environment overrides - single source of truth for STRATA_* variables

use super::file::{StrataConfig, parse_duration};
use crate::error::{Result, StrataError};
use std::path::PathBuf;
use std::time::Duration;
use strata_types::OperationClass;
use tracing::debug;

/// Raw override values read from the environment.
///
/// Unset or blank variables are `None`; values are parsed when applied so a
/// malformed variable surfaces as a `Config` error naming it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// STRATA_TIMEOUT_<CLASS>, indexed by `OperationClass::ALL`
    pub timeouts: [Option<String>; 5],
    /// STRATA_CACHE_MAX_ENTRIES
    pub cache_max_entries: Option<String>,
    /// STRATA_CACHE_TTL
    pub cache_ttl: Option<String>,
    /// STRATA_CIRCUIT_THRESHOLD
    pub circuit_threshold: Option<String>,
    /// STRATA_CIRCUIT_COOLDOWN
    pub circuit_cooldown: Option<String>,
    /// STRATA_MAX_CONCURRENT_LAYERS
    pub max_concurrent_layers: Option<String>,
    /// STRATA_CONTENT_ROOT
    pub content_root: Option<String>,
}

impl EnvOverrides {
    /// Read overrides from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through an arbitrary lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            timeouts: OperationClass::ALL.map(|class| read(&timeout_var(class))),
            cache_max_entries: read("STRATA_CACHE_MAX_ENTRIES"),
            cache_ttl: read("STRATA_CACHE_TTL"),
            circuit_threshold: read("STRATA_CIRCUIT_THRESHOLD"),
            circuit_cooldown: read("STRATA_CIRCUIT_COOLDOWN"),
            max_concurrent_layers: read("STRATA_MAX_CONCURRENT_LAYERS"),
            content_root: read("STRATA_CONTENT_ROOT"),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply every present override on top of `config`
    pub fn apply(&self, config: &mut StrataConfig) -> Result<()> {
        for (class, value) in OperationClass::ALL.into_iter().zip(&self.timeouts) {
            if let Some(value) = value {
                let duration = parse_var_duration(&timeout_var(class), value)?;
                let t = &mut config.timeouts;
                match class {
                    OperationClass::CacheLookup => t.cache_lookup = duration,
                    OperationClass::FileRead => t.file_read = duration,
                    OperationClass::LayerLoad => t.layer_load = duration,
                    OperationClass::FullLoad => t.full_load = duration,
                    OperationClass::Analysis => t.analysis = duration,
                }
            }
        }

        if let Some(v) = &self.cache_max_entries {
            config.cache.max_entries = parse_var("STRATA_CACHE_MAX_ENTRIES", v)?;
        }
        if let Some(v) = &self.cache_ttl {
            config.cache.ttl = match v.trim() {
                "off" | "none" => None,
                other => Some(parse_var_duration("STRATA_CACHE_TTL", other)?),
            };
        }
        if let Some(v) = &self.circuit_threshold {
            config.circuit.failure_threshold = parse_var("STRATA_CIRCUIT_THRESHOLD", v)?;
        }
        if let Some(v) = &self.circuit_cooldown {
            config.circuit.cooldown = parse_var_duration("STRATA_CIRCUIT_COOLDOWN", v)?;
        }
        if let Some(v) = &self.max_concurrent_layers {
            config.loader.max_concurrent_layers = parse_var("STRATA_MAX_CONCURRENT_LAYERS", v)?;
        }
        if let Some(v) = &self.content_root {
            config.loader.content_root = Some(PathBuf::from(v.trim()));
        }

        if !self.is_empty() {
            debug!(overrides = ?self, "Applied environment overrides");
        }
        Ok(())
    }
}

/// Apply overrides from the process environment
pub fn apply_env_overrides(config: &mut StrataConfig) -> Result<()> {
    EnvOverrides::from_env().apply(config)
}

/// STRATA_TIMEOUT_FILE_READ etc.
pub fn timeout_var(class: OperationClass) -> String {
    format!("STRATA_TIMEOUT_{}", class.as_str().to_ascii_uppercase())
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| StrataError::Config(format!("{} has invalid value '{}'", name, value)))
}

fn parse_var_duration(name: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| StrataError::Config(format!("{}: {}", name, e)))
}
