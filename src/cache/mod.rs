//! Association cache: record id → field name → artifact id(s).
//!
//! Entries live in a [`CacheStore`] under keys of the form
//! `remote-images-<ownerId>`; each value is a JSON object mapping output field
//! names to either one artifact id or an ordered list of them:
//!
//! ```json
//! { "localImage": "5f0c...", "gallery": ["a1b2...", "c3d4..."] }
//! ```
//!
//! Writes are read-merge-write: only the named field is replaced, every other
//! field already stored for the owner is preserved. Within one process the
//! sequence is serialized per key with an async mutex; stores shared between
//! processes additionally hand out a key guard (see [`FileCacheStore`]) that
//! is held for the whole sequence.
//!
//! Reads never mutate, and may happen any number of times after the fetch
//! phase finished.

pub mod lock;
pub mod store;

pub use store::{CacheStore, FileCacheStore, KeyGuard, MemoryCacheStore};

use crate::constants::CACHE_KEY_PREFIX;
use crate::core::RemoteImagesError;
use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cache key for the record identified by `owner_id`.
#[must_use]
pub fn cache_key(owner_id: &str) -> String {
    format!("{CACHE_KEY_PREFIX}-{owner_id}")
}

/// Stored value of one output field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Scalar (object) mode
    One(String),
    /// Array mode, in source URL order
    Many(Vec<String>),
}

impl FieldValue {
    /// All stored ids in order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::One(id) => vec![id.as_str()],
            Self::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }

    /// The first stored id, if any.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(id) => Some(id),
            Self::Many(ids) => ids.first().map(String::as_str),
        }
    }
}

/// Everything stored for one owner.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Read-merge-write view over a [`CacheStore`].
#[derive(Clone)]
pub struct AssociationCache {
    store: Arc<dyn CacheStore>,
    key_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for AssociationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationCache").field("locked_keys", &self.key_locks.len()).finish()
    }
}

impl AssociationCache {
    /// Cache backed by `store`.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            key_locks: Arc::new(DashMap::new()),
        }
    }

    /// Cache backed by a fresh [`MemoryCacheStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    /// Set `field` to `value` for `owner_id`, keeping all other fields.
    ///
    /// Returns the merged mapping that was written.
    ///
    /// # Errors
    ///
    /// Fails if the key guard cannot be taken, the stored entry is not a
    /// field mapping, or the store cannot read or write.
    pub async fn record_artifacts(
        &self,
        owner_id: &str,
        field: &str,
        value: FieldValue,
    ) -> Result<FieldMap> {
        let key = cache_key(owner_id);

        let key_lock = {
            let entry = self.key_locks.entry(key.clone()).or_default();
            Arc::clone(entry.value())
        };
        let merged = {
            let _key_guard = key_lock.lock().await;
            self.merge_field(&key, field, value).await
        };

        // Drop the per-key mutex once no other writer holds or awaits it.
        self.key_locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 2);
        merged
    }

    async fn merge_field(&self, key: &str, field: &str, value: FieldValue) -> Result<FieldMap> {
        let _store_guard =
            self.store.lock_key(key).await.map_err(|e| RemoteImagesError::CacheLockFailed {
                key: key.to_string(),
                reason: format!("{e:#}"),
            })?;

        let mut fields = match self.store.get(key).await? {
            Some(stored) => decode_entry(key, stored)?,
            None => FieldMap::new(),
        };
        fields.insert(field.to_string(), value);

        self.store.set(key, serde_json::to_value(&fields)?).await?;
        tracing::debug!("Cached field '{}' for {}", field, key);
        Ok(fields)
    }

    /// Everything stored for `owner_id`, or `None` when nothing was cached.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read or the entry is malformed.
    pub async fn lookup_artifacts(&self, owner_id: &str) -> Result<Option<FieldMap>> {
        let key = cache_key(owner_id);
        match self.store.get(&key).await? {
            Some(Value::Null) | None => Ok(None),
            Some(stored) => Ok(Some(decode_entry(&key, stored)?)),
        }
    }
}

fn decode_entry(key: &str, stored: Value) -> Result<FieldMap> {
    if stored.is_null() {
        return Ok(FieldMap::new());
    }
    serde_json::from_value(stored).map_err(|e| {
        RemoteImagesError::CacheCorrupted {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
