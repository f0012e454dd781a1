// crates/strata/src/source/memory.rs
// In-memory content source

use super::{ContentSource, SourceAsset, SourceError, check_relative, key_owns};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;
use strata_types::{Layer, LayerKey};

/// Content source backed by a map of `layer -> relative path -> text`.
///
/// Useful for embedding callers that already hold their content and for tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    layers: RwLock<HashMap<Layer, BTreeMap<String, String>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_asset(self, layer: Layer, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(layer, path, text);
        self
    }

    /// Insert or replace an asset
    pub fn insert(&self, layer: Layer, path: impl Into<String>, text: impl Into<String>) {
        let Ok(mut layers) = self.layers.write() else {
            return;
        };
        layers
            .entry(layer)
            .or_default()
            .insert(path.into(), text.into());
    }

    /// Remove an asset, returning whether it existed
    pub fn remove(&self, layer: Layer, path: &str) -> bool {
        let Ok(mut layers) = self.layers.write() else {
            return false;
        };
        layers
            .get_mut(&layer)
            .map(|assets| assets.remove(path).is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn list_assets(&self, key: &LayerKey) -> Result<Vec<String>, SourceError> {
        if let Some(sub) = &key.subkey {
            check_relative(sub)?;
        }
        let layers = self
            .layers
            .read()
            .map_err(|_| SourceError::Other("memory source lock poisoned".to_string()))?;
        let Some(assets) = layers.get(&key.layer) else {
            return Err(SourceError::NotFound(key.to_string()));
        };

        // BTreeMap keeps ids sorted
        let ids: Vec<String> = assets
            .keys()
            .filter(|id| key_owns(key, id))
            .cloned()
            .collect();
        if ids.is_empty() && key.subkey.is_some() {
            return Err(SourceError::NotFound(key.to_string()));
        }
        Ok(ids)
    }

    async fn read_asset(
        &self,
        key: &LayerKey,
        asset_id: &str,
    ) -> Result<SourceAsset, SourceError> {
        check_relative(asset_id)?;
        let layers = self
            .layers
            .read()
            .map_err(|_| SourceError::Other("memory source lock poisoned".to_string()))?;
        layers
            .get(&key.layer)
            .and_then(|assets| assets.get(asset_id))
            .map(|text| SourceAsset::from(text.clone()))
            .ok_or_else(|| SourceError::NotFound(format!("{}:{}", key, asset_id)))
    }

    async fn categories(&self) -> Result<Vec<String>, SourceError> {
        let layers = self
            .layers
            .read()
            .map_err(|_| SourceError::Other("memory source lock poisoned".to_string()))?;
        let categories: BTreeSet<String> = layers
            .get(&Layer::Guidelines)
            .map(|assets| {
                assets
                    .keys()
                    .filter_map(|id| id.split_once('/').map(|(cat, _)| cat.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(categories.into_iter().collect())
    }
}
