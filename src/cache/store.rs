//! Durable key/value stores backing the association cache.
//!
//! The association cache only needs `get` and `set` of JSON values by string
//! key, plus an optional guard that keeps other processes out of a key while
//! it is being rewritten. Two stores ship with the crate:
//!
//! - [`MemoryCacheStore`] keeps values in a `DashMap`; used by tests and by
//!   callers that manage persistence themselves.
//! - [`FileCacheStore`] writes one JSON file per key under a directory and
//!   takes a [`CacheLock`] per key for cross-process exclusion.

use crate::cache::lock::CacheLock;
use crate::constants::default_lock_timeout;
use crate::utils::fs::atomic_write;
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Guard returned by [`CacheStore::lock_key`]; the key stays locked until it is dropped.
pub type KeyGuard = Box<dyn Send + Sync>;

/// A durable string-keyed store of JSON values.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Exclude other processes from `key` until the guard is dropped.
    ///
    /// Stores that are never shared between processes return `None`.
    async fn lock_key(&self, _key: &str) -> Result<Option<KeyGuard>> {
        Ok(None)
    }
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<String, Value>>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    value: Value,
}

/// Store keeping one JSON file per key.
///
/// ```text
/// {dir}/
/// ├── entries/
/// │   └── {sha256(key)}.json   # {"key": "...", "value": {...}}
/// └── .locks/
///     └── {sha256(key)}.lock
/// ```
///
/// File names are derived from the key's SHA-256 so arbitrary record ids are
/// safe on every file system; the key itself is stored inside the file.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Store rooted at `dir`; the directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
        }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_stem(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join("entries").join(format!("{}.json", Self::file_stem(key)))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.entry_path(key);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read cache entry: {}", path.display()));
            }
        };

        let stored: StoredEntry = serde_json::from_slice(&content)
            .with_context(|| format!("Failed to parse cache entry: {}", path.display()))?;
        if stored.key != key {
            anyhow::bail!(
                "Cache entry {} belongs to key '{}', expected '{}'",
                path.display(),
                stored.key,
                key
            );
        }
        Ok(Some(stored.value))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.entry_path(key);
        let content = serde_json::to_vec_pretty(&StoredEntry {
            key: key.to_string(),
            value,
        })?;

        tokio::task::spawn_blocking(move || atomic_write(&path, &content))
            .await
            .context("Failed to spawn blocking task for cache write")??;
        Ok(())
    }

    async fn lock_key(&self, key: &str) -> Result<Option<KeyGuard>> {
        let lock =
            CacheLock::acquire(&self.dir, &Self::file_stem(key), default_lock_timeout()).await?;
        Ok(Some(Box::new(lock)))
    }
}
