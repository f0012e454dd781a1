// crates/strata/src/error.rs
// Error taxonomy for Strata
//
// Only programmer and configuration errors live here. Runtime degradation
// (timeouts, open circuits, source failures) is reported through LoadStatus.

use strata_types::ParseLayerError;
use thiserror::Error;

/// Main error type for the Strata library
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid layer: {0}")]
    InvalidLayer(String),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Convenience type alias for Result using StrataError
pub type Result<T> = std::result::Result<T, StrataError>;

impl From<ParseLayerError> for StrataError {
    fn from(err: ParseLayerError) -> Self {
        StrataError::InvalidLayer(err.0)
    }
}

impl StrataError {
    /// Whether this error was caused by startup configuration
    pub fn is_config(&self) -> bool {
        matches!(self, StrataError::Config(_) | StrataError::Toml(_))
    }
}
