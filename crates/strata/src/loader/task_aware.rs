// crates/strata/src/loader/task_aware.rs
// Task-aware layer selection: pick the smallest useful set of keys for a task

use crate::config::TaskConfig;
use std::collections::BTreeSet;
use strata_types::{Layer, LayerKey};

/// Maps a free-text task description to the layer keys worth loading for it.
///
/// Core is always selected. Everything else needs a keyword match, so an
/// unrelated task never pulls in the full hierarchy.
#[derive(Debug, Clone)]
pub struct TaskSelector {
    tables: Vec<(Layer, Vec<String>)>,
}

impl TaskSelector {
    pub fn new(config: &TaskConfig) -> Self {
        let normalize = |words: &[String]| -> Vec<String> {
            words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };
        Self {
            tables: vec![
                (Layer::Index, normalize(&config.index_keywords)),
                (Layer::Frameworks, normalize(&config.framework_keywords)),
                (Layer::BestPractices, normalize(&config.best_practice_keywords)),
            ],
        }
    }

    /// Keys for `task`, ordered by layer then sub-key, without duplicates
    pub fn select(&self, task: &str, categories: &[String]) -> Vec<LayerKey> {
        let text = task.to_lowercase();
        let mut keys = BTreeSet::new();
        keys.insert(LayerKey::layer(Layer::Core));

        for category in categories {
            if mentions_category(&text, category) {
                keys.insert(LayerKey::with_subkey(Layer::Guidelines, category.clone()));
            }
        }

        for (layer, words) in &self.tables {
            if words.iter().any(|w| text.contains(w.as_str())) {
                keys.insert(LayerKey::layer(*layer));
            }
        }

        keys.into_iter().collect()
    }
}

impl Default for TaskSelector {
    fn default() -> Self {
        Self::new(&TaskConfig::default())
    }
}

/// `api-design` matches "api-design", "api_design" and "api design"
fn mentions_category(text: &str, category: &str) -> bool {
    let name = category.trim().to_lowercase();
    if name.is_empty() {
        return false;
    }
    if text.contains(&name) {
        return true;
    }
    let spaced = name.replace(['-', '_'], " ");
    spaced != name && text.contains(&spaced)
}
