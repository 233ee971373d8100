//! Registered file artifacts and the store that owns them.
//!
//! An [`Artifact`] is the file node a fetch produces: the downloaded image on
//! disk plus the metadata needed to find it again. Artifacts live in an
//! [`ArtifactStore`], the node model shared by the fetch side
//! (`create_node`) and the lazy field resolvers (`get_node_by_id`).
//!
//! Identifiers come from a [`NodeIdFactory`], which derives stable UUID v5
//! ids from a seed, and content digests are SHA-256 hex strings.

use crate::cache::lock::CacheLock;
use crate::constants::{
    ARTIFACT_INDEX_LOCK, FILE_NODE_TYPE, NODE_ID_NAMESPACE, PLACEHOLDER_MEDIA_TYPE,
    default_lock_timeout,
};
use crate::utils::fs::atomic_write;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Internal bookkeeping of an artifact, mirroring the host's node metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInternal {
    /// Node type, `File` for everything this crate registers
    #[serde(rename = "type")]
    pub kind: String,
    /// Media type of the downloaded content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// SHA-256 hex digest of the content (or of the placeholder seed)
    pub content_digest: String,
}

/// A downloaded, registered file resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Opaque artifact identifier
    pub id: String,
    /// Identifier of the record the artifact was fetched for
    pub parent: String,
    /// Source URL; absent for placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// File stem on disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// File extension including the leading dot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    /// Location of the downloaded file; absent for placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_path: Option<PathBuf>,
    /// Size of the downloaded file in bytes
    #[serde(default)]
    pub size: u64,
    /// When the artifact was registered
    pub fetched_at: DateTime<Utc>,
    /// Node metadata
    pub internal: ArtifactInternal,
}

impl Artifact {
    /// Stand-in artifact registered after a failed fetch so the record still
    /// references something downstream.
    #[must_use]
    pub fn placeholder(id: String, parent: &str, content_digest: String) -> Self {
        Self {
            id,
            parent: parent.to_string(),
            url: None,
            name: None,
            ext: None,
            absolute_path: None,
            size: 0,
            fetched_at: Utc::now(),
            internal: ArtifactInternal {
                kind: FILE_NODE_TYPE.to_string(),
                media_type: Some(PLACEHOLDER_MEDIA_TYPE.to_string()),
                content_digest,
            },
        }
    }

    /// Whether this artifact stands in for a failed fetch.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.url.is_none()
            && self.internal.media_type.as_deref() == Some(PLACEHOLDER_MEDIA_TYPE)
    }
}

/// Node model holding registered artifacts.
///
/// `create_node` is called by fetch collaborators and the placeholder
/// fallback; `get_node_by_id` is the lookup capability handed to lazy field
/// resolvers. Artifacts removed externally simply stop resolving.
pub trait ArtifactStore: Send + Sync {
    /// Register (or replace) an artifact.
    fn create_node(&self, artifact: Artifact);

    /// Look an artifact up by id.
    fn get_node_by_id(&self, id: &str) -> Option<Artifact>;

    /// Remove an artifact, returning it if present.
    fn delete_node(&self, id: &str) -> Option<Artifact>;
}

/// In-memory artifact store, optionally persisted as a JSON index.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    nodes: Arc<DashMap<String, Artifact>>,
}

impl MemoryArtifactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from an index written by [`Self::persist`].
    ///
    /// A missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self> {
        let store = Self::new();
        for artifact in read_index(path).await? {
            store.create_node(artifact);
        }
        tracing::debug!("Loaded {} artifacts from {}", store.len(), path.display());
        Ok(store)
    }

    /// Merge this store into the index at `path`, sorted by id.
    ///
    /// Several processes may share one index, so the write is a
    /// read-merge-write under the index lock: artifacts another writer added
    /// since [`Self::load`] are kept and folded into this store, and this
    /// store's version wins for ids present in both.
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let lock_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let _lock = CacheLock::acquire(lock_dir, ARTIFACT_INDEX_LOCK, default_lock_timeout()).await?;

        let mut merged = 0usize;
        for artifact in read_index(path).await? {
            if let Entry::Vacant(slot) = self.nodes.entry(artifact.id.clone()) {
                slot.insert(artifact);
                merged += 1;
            }
        }
        if merged > 0 {
            tracing::debug!("Kept {} artifacts written by other runs", merged);
        }

        let mut artifacts: Vec<Artifact> =
            self.nodes.iter().map(|entry| entry.value().clone()).collect();
        artifacts.sort_by(|a, b| a.id.cmp(&b.id));

        let content = serde_json::to_vec_pretty(&artifacts)?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || atomic_write(&path, &content))
            .await
            .context("Failed to spawn blocking task for artifact index write")??;
        Ok(())
    }

    /// Number of registered artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn create_node(&self, artifact: Artifact) {
        self.nodes.insert(artifact.id.clone(), artifact);
    }

    fn get_node_by_id(&self, id: &str) -> Option<Artifact> {
        self.nodes.get(id).map(|entry| entry.value().clone())
    }

    fn delete_node(&self, id: &str) -> Option<Artifact> {
        self.nodes.remove(id).map(|(_, artifact)| artifact)
    }
}

async fn read_index(path: &Path) -> Result<Vec<Artifact>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read artifact index: {}", path.display()));
        }
    };
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse artifact index: {}", path.display()))
}

/// Derives deterministic, namespaced node identifiers.
#[derive(Debug, Clone, Copy)]
pub struct NodeIdFactory {
    namespace: Uuid,
}

impl NodeIdFactory {
    /// Factory scoped to `namespace`.
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: Uuid::new_v5(&Uuid::NAMESPACE_URL, namespace.as_bytes()),
        }
    }

    /// Stable id for `seed`; equal seeds give equal ids.
    #[must_use]
    pub fn create_node_id(&self, seed: &str) -> String {
        Uuid::new_v5(&self.namespace, seed.as_bytes()).to_string()
    }
}

impl Default for NodeIdFactory {
    fn default() -> Self {
        Self::new(NODE_ID_NAMESPACE)
    }
}

/// SHA-256 hex digest of `content`.
#[must_use]
pub fn content_digest(content: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(content.as_ref()))
}
