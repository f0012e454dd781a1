// crates/strata/src/config/mod.rs
// Configuration: TOML file first, then STRATA_* environment overrides

pub mod env;
pub mod file;

pub use env::EnvOverrides;
pub use file::{
    CacheConfig, CircuitConfig, LoaderSettings, StrataConfig, TaskConfig, TimeoutsConfig,
};
