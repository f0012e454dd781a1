// crates/strata/src/source/fs.rs
// Filesystem content source: one directory per layer, sub-keys are subdirectories

use super::{ContentSource, SourceAsset, SourceError, check_relative};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use strata_types::{Layer, LayerKey};
use tracing::debug;
use walkdir::WalkDir;

/// Default file extensions treated as assets
pub const DEFAULT_EXTENSIONS: &[&str] = &["md", "txt"];

/// Reads layers from a directory tree:
///
/// ```text
/// root/
///   00-index/README.md
///   01-core/principles.md
///   02-guidelines/security/auth.md
///   03-frameworks/...
///   04-best-practices/...
/// ```
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Override which file extensions count as assets
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn layer_dir(&self, layer: Layer) -> PathBuf {
        self.root.join(layer.dir_name())
    }

    fn key_dir(&self, key: &LayerKey) -> Result<PathBuf, SourceError> {
        let dir = self.layer_dir(key.layer);
        match &key.subkey {
            Some(sub) => {
                check_relative(sub)?;
                Ok(dir.join(sub))
            }
            None => Ok(dir),
        }
    }
}

/// Walk `dir` recursively and return matching files relative to `layer_dir`, sorted
fn collect_assets(
    dir: &Path,
    layer_dir: &Path,
    extensions: &[String],
) -> Result<Vec<String>, SourceError> {
    if !dir.is_dir() {
        return Err(SourceError::NotFound(dir.display().to_string()));
    }

    let mut ids = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| SourceError::Io(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches_ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)));
        if !matches_ext {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(layer_dir) else {
            continue;
        };
        let id = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        ids.push(id);
    }
    ids.sort();
    Ok(ids)
}

#[async_trait]
impl ContentSource for FsSource {
    async fn list_assets(&self, key: &LayerKey) -> Result<Vec<String>, SourceError> {
        let dir = self.key_dir(key)?;
        let layer_dir = self.layer_dir(key.layer);
        let extensions = self.extensions.clone();

        let ids = tokio::task::spawn_blocking(move || collect_assets(&dir, &layer_dir, &extensions))
            .await
            .map_err(|e| SourceError::Other(format!("listing task failed: {}", e)))??;

        debug!(key = %key, assets = ids.len(), "Listed assets");
        Ok(ids)
    }

    async fn read_asset(
        &self,
        key: &LayerKey,
        asset_id: &str,
    ) -> Result<SourceAsset, SourceError> {
        check_relative(asset_id)?;
        let path = self.layer_dir(key.layer).join(asset_id);

        let text = tokio::fs::read_to_string(&path).await?;
        let modified = tokio::fs::metadata(&path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        Ok(SourceAsset { text, modified })
    }

    async fn categories(&self) -> Result<Vec<String>, SourceError> {
        let dir = self.layer_dir(Layer::Guidelines);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut categories = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                categories.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        categories.sort();
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "01-core/principles.md", "Keep it simple");
        write(dir.path(), "01-core/notes.bin", "ignored");
        write(dir.path(), "02-guidelines/security/auth.md", "Rotate keys");
        write(dir.path(), "02-guidelines/testing/unit.md", "Test behaviour");
        write(dir.path(), "02-guidelines/testing/unit.txt", "Plain text too");
        dir
    }

    #[tokio::test]
    async fn test_list_filters_extensions() {
        let dir = sample_tree();
        let source = FsSource::new(dir.path());
        let ids = source.list_assets(&LayerKey::layer(Layer::Core)).await.unwrap();
        assert_eq!(ids, vec!["principles.md"]);
    }

    #[tokio::test]
    async fn test_list_recursive_and_subkey() {
        let dir = sample_tree();
        let source = FsSource::new(dir.path());

        let all = source
            .list_assets(&LayerKey::layer(Layer::Guidelines))
            .await
            .unwrap();
        assert_eq!(
            all,
            vec!["security/auth.md", "testing/unit.md", "testing/unit.txt"]
        );

        let testing = source
            .list_assets(&LayerKey::with_subkey(Layer::Guidelines, "testing"))
            .await
            .unwrap();
        assert_eq!(testing, vec!["testing/unit.md", "testing/unit.txt"]);
    }

    #[tokio::test]
    async fn test_read_asset_has_modified_marker() {
        let dir = sample_tree();
        let source = FsSource::new(dir.path());
        let key = LayerKey::with_subkey(Layer::Guidelines, "security");
        let asset = source.read_asset(&key, "security/auth.md").await.unwrap();
        assert_eq!(asset.text, "Rotate keys");
        assert!(asset.modified.is_some());
    }

    #[tokio::test]
    async fn test_missing_layer_dir() {
        let dir = sample_tree();
        let source = FsSource::new(dir.path());
        let err = source
            .list_assets(&LayerKey::layer(Layer::Frameworks))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = sample_tree();
        let source = FsSource::new(dir.path());
        let key = LayerKey::layer(Layer::Core);
        assert!(source.read_asset(&key, "../secret.md").await.is_err());
        let escaping = LayerKey::with_subkey(Layer::Guidelines, "../../etc");
        assert!(source.list_assets(&escaping).await.is_err());
    }

    #[tokio::test]
    async fn test_categories() {
        let dir = sample_tree();
        let source = FsSource::new(dir.path());
        assert_eq!(source.categories().await.unwrap(), vec!["security", "testing"]);

        let empty = TempDir::new().unwrap();
        let source = FsSource::new(empty.path());
        assert!(source.categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_extensions() {
        let dir = sample_tree();
        let source = FsSource::new(dir.path()).with_extensions([".TXT"]);
        let ids = source
            .list_assets(&LayerKey::layer(Layer::Guidelines))
            .await
            .unwrap();
        assert_eq!(ids, vec!["testing/unit.txt"]);
    }
}
