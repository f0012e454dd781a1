// crates/strata/src/source/mod.rs
// Content sources: where layer text comes from

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strata_types::LayerKey;
use thiserror::Error;

mod fs;
mod memory;

pub use fs::{DEFAULT_EXTENSIONS, FsSource};
pub use memory::MemorySource;

/// Failure reported by a content source.
///
/// Never surfaced to loader callers as an error: the loader turns it into
/// `LoadStatus::Error` and a circuit-breaker failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            SourceError::NotFound(err.to_string())
        } else {
            SourceError::Io(err.to_string())
        }
    }
}

/// Raw asset as returned by a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAsset {
    pub text: String,
    /// Last-modified marker, when the source has one
    pub modified: Option<DateTime<Utc>>,
}

impl From<String> for SourceAsset {
    fn from(text: String) -> Self {
        Self {
            text,
            modified: None,
        }
    }
}

impl From<&str> for SourceAsset {
    fn from(text: &str) -> Self {
        Self::from(text.to_string())
    }
}

/// Read-only provider of layer content.
///
/// Asset identifiers are paths relative to the layer root (`security/auth.md`),
/// so they stay unique across sub-keys of the same layer. Implementations may
/// stall arbitrarily; the loader bounds every call with a deadline.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List asset identifiers for a key, in a stable order
    async fn list_assets(&self, key: &LayerKey) -> Result<Vec<String>, SourceError>;

    /// Read one asset in full
    async fn read_asset(&self, key: &LayerKey, asset_id: &str)
    -> Result<SourceAsset, SourceError>;

    /// Guideline categories this source offers (sub-keys of `Layer::Guidelines`)
    async fn categories(&self) -> Result<Vec<String>, SourceError> {
        Ok(Vec::new())
    }

    /// Read every asset for a key, unbounded. Callers under a deadline should
    /// go through the loader instead.
    async fn read_layer(&self, key: &LayerKey) -> Result<Vec<(String, String)>, SourceError> {
        let ids = self.list_assets(key).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let asset = self.read_asset(key, &id).await?;
            out.push((id, asset.text));
        }
        Ok(out)
    }
}

/// Validate a relative path segment supplied by a caller (sub-key or asset id)
pub(crate) fn check_relative(path: &str) -> Result<(), SourceError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.starts_with('\\')
        || path.split(['/', '\\']).any(|seg| seg == "..");
    if bad {
        Err(SourceError::Other(format!("invalid relative path '{}'", path)))
    } else {
        Ok(())
    }
}

/// Does `asset_id` belong to `key`? Whole-layer keys own every asset in the layer.
pub(crate) fn key_owns(key: &LayerKey, asset_id: &str) -> bool {
    match &key.subkey {
        None => true,
        Some(sub) => asset_id
            .strip_prefix(sub.as_str())
            .is_some_and(|rest| rest.starts_with('/')),
    }
}
