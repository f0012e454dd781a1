// crates/strata/src/loader/result.rs
// Loaded assets and load results

use crate::source::SourceAsset;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use strata_types::{LayerKey, LoadStatus, SkipReason, SkippedAsset};

/// One unit of layer content, immutable once read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    /// Path relative to the layer root
    pub id: String,
    pub key: LayerKey,
    pub text: String,
    pub bytes: usize,
    pub chars: usize,
    pub tokens: usize,
    /// Hex SHA-256 of the text
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl Asset {
    pub fn new(key: LayerKey, id: impl Into<String>, raw: SourceAsset) -> Self {
        let text = raw.text;
        let chars = text.chars().count();
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());

        Self {
            id: id.into(),
            key,
            bytes: text.len(),
            chars,
            tokens: estimate_tokens(chars),
            checksum: format!("{:x}", hasher.finalize()),
            modified: raw.modified,
            text,
        }
    }
}

/// Rough token count: four characters per token, rounded up
pub fn estimate_tokens(chars: usize) -> usize {
    chars.div_ceil(4)
}

/// Outcome of any load operation.
///
/// Assets are kept ordered by key (layer, then sub-key) and then asset id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadResult {
    pub requested: Vec<LayerKey>,
    pub assets: Vec<Asset>,
    pub skipped: Vec<SkippedAsset>,
    pub status: LoadStatus,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub from_cache: bool,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl LoadResult {
    pub fn new(
        requested: Vec<LayerKey>,
        mut assets: Vec<Asset>,
        skipped: Vec<SkippedAsset>,
        status: LoadStatus,
    ) -> Self {
        assets.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.id.cmp(&b.id)));
        Self {
            requested,
            assets,
            skipped,
            status,
            elapsed: Duration::ZERO,
            from_cache: false,
        }
    }

    /// A result with no content, every requested key skipped for `reason`
    pub fn skipped_all(requested: Vec<LayerKey>, status: LoadStatus, reason: SkipReason) -> Self {
        let skipped = requested
            .iter()
            .map(|key| SkippedAsset {
                key: key.clone(),
                asset_id: None,
                reason: reason.clone(),
            })
            .collect();
        Self::new(requested, Vec::new(), skipped, status)
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub(crate) fn into_cache_hit(mut self, elapsed: Duration) -> Self {
        self.status = LoadStatus::Success;
        self.skipped.clear();
        self.from_cache = true;
        self.elapsed = elapsed;
        self
    }

    /// Concatenated text of every asset, separated by blank lines
    pub fn content(&self) -> String {
        self.assets
            .iter()
            .map(|a| a.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn token_estimate(&self) -> usize {
        self.assets.iter().map(|a| a.tokens).sum()
    }

    pub fn asset_ids(&self) -> Vec<&str> {
        self.assets.iter().map(|a| a.id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// One-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        format!(
            "{} in {}ms: {} assets, ~{} tokens, {} skipped{}",
            self.status,
            self.elapsed.as_millis(),
            self.assets.len(),
            self.token_estimate(),
            self.skipped.len(),
            if self.from_cache { " (cache)" } else { "" }
        )
    }
}
