//! Shared setup for the commands that touch the cache.

use crate::artifact::MemoryArtifactStore;
use crate::cache::{AssociationCache, FileCacheStore};
use crate::config::PluginConfig;
use crate::constants::ARTIFACT_INDEX_FILE;
use crate::core::RemoteImagesError;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stores opened from a configuration's cache directory.
pub(crate) struct Workspace {
    pub(crate) artifacts: Arc<MemoryArtifactStore>,
    pub(crate) cache: AssociationCache,
    pub(crate) index_path: PathBuf,
}

impl Workspace {
    pub(crate) async fn open(config: &PluginConfig) -> Result<Self> {
        let cache_dir = config.settings.cache_dir()?;
        tracing::debug!("Using cache directory {}", cache_dir.display());

        let index_path = cache_dir.join(ARTIFACT_INDEX_FILE);
        let artifacts = Arc::new(MemoryArtifactStore::load(&index_path).await?);
        let cache = AssociationCache::new(Arc::new(FileCacheStore::new(cache_dir)));

        Ok(Self {
            artifacts,
            cache,
            index_path,
        })
    }
}

/// Read a JSON array of record objects.
pub(crate) async fn load_records(path: &Path) -> Result<Vec<Value>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read records file: {}", path.display()))?;

    let invalid = |reason: String| RemoteImagesError::InvalidRecords {
        file: path.display().to_string(),
        reason,
    };

    let parsed: Value = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
    let Value::Array(records) = parsed else {
        return Err(invalid("expected a JSON array".to_string()).into());
    };
    if let Some(index) = records.iter().position(|record| !record.is_object()) {
        return Err(invalid(format!("element {index} is not an object")).into());
    }

    Ok(records)
}
