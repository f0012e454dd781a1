// crates/strata/src/loader/search.rs
// Keyword search over loaded assets

use super::Asset;
use serde::Serialize;
use strata_types::LayerKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub asset_id: String,
    pub key: LayerKey,
    pub match_count: usize,
    /// Byte offsets of every keyword occurrence, ascending
    pub positions: Vec<usize>,
}

/// Lowercase, whitespace-separated, deduplicated keywords
pub fn keywords(query: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in query.split_whitespace() {
        let word = word.to_ascii_lowercase();
        if !words.contains(&word) {
            words.push(word);
        }
    }
    words
}

/// Byte offsets of every occurrence of every keyword (ASCII case-insensitive)
pub fn match_positions(text: &str, keywords: &[String]) -> Vec<usize> {
    // ASCII lowercasing keeps byte offsets aligned with the original text
    let haystack = text.to_ascii_lowercase();
    let mut positions: Vec<usize> = keywords
        .iter()
        .flat_map(|kw| haystack.match_indices(kw.as_str()).map(|(i, _)| i))
        .collect();
    positions.sort_unstable();
    positions
}

/// Hit for one asset, if any keyword occurs in it
pub fn search_asset(asset: &Asset, keywords: &[String]) -> Option<SearchHit> {
    let positions = match_positions(&asset.text, keywords);
    if positions.is_empty() {
        return None;
    }
    Some(SearchHit {
        asset_id: asset.id.clone(),
        key: asset.key.clone(),
        match_count: positions.len(),
        positions,
    })
}

/// Most matches first, then lower layer, then asset id
pub fn rank(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.match_count
            .cmp(&a.match_count)
            .then_with(|| a.key.layer.cmp(&b.key.layer))
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });
}
