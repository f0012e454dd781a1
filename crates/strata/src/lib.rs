// crates/strata/src/lib.rs
// Strata - progressive, timeout-bounded loader for layered reference content

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod error;
pub mod loader;
pub mod source;

pub use error::{Result, StrataError};
pub use loader::{LoadResult, ProgressiveLoader};
pub use strata_types::{Layer, LayerKey, LoadStatus};
