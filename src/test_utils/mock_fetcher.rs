//! Scripted fetch collaborator.

use crate::artifact::{Artifact, ArtifactInternal, ArtifactStore, NodeIdFactory, content_digest};
use crate::constants::FILE_NODE_TYPE;
use crate::fetch::{FetchAndRegister, FetchRequest};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ALWAYS: u32 = u32::MAX;

/// In-memory [`FetchAndRegister`] for tests.
///
/// Every call is logged. Unless scripted otherwise a call succeeds, and each
/// success registers a fresh artifact, so fetching the same URL twice gives
/// two different ids.
#[derive(Clone, Default)]
pub struct MockFetcher {
    failures: Arc<DashMap<String, u32>>,
    delays: Arc<DashMap<String, Duration>>,
    calls: Arc<Mutex<Vec<String>>>,
    latest: Arc<DashMap<String, Artifact>>,
    store: Option<Arc<dyn ArtifactStore>>,
    sequence: Arc<AtomicU64>,
    ids: NodeIdFactory,
}

impl MockFetcher {
    /// A fetcher where every URL succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register successful artifacts in `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Fail the first `times` calls for `url`.
    #[must_use]
    pub fn fail_times(self, url: &str, times: u32) -> Self {
        self.failures.insert(url.to_string(), times);
        self
    }

    /// Fail every call for `url`.
    #[must_use]
    pub fn fail_always(self, url: &str) -> Self {
        self.fail_times(url, ALWAYS)
    }

    /// Delay every call for `url` by `delay`.
    #[must_use]
    pub fn delay(self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// URLs in the order calls started.
    ///
    /// # Panics
    ///
    /// Panics if the call log mutex was poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made for `url`.
    #[must_use]
    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|called| *called == url).count()
    }

    /// The artifact produced by the latest successful call for `url`.
    #[must_use]
    pub fn artifact_for(&self, url: &str) -> Option<Artifact> {
        self.latest.get(url).map(|entry| entry.value().clone())
    }

    fn should_fail(&self, url: &str) -> bool {
        let Some(mut remaining) = self.failures.get_mut(url) else {
            return false;
        };
        match *remaining {
            0 => false,
            ALWAYS => true,
            _ => {
                *remaining -= 1;
                true
            }
        }
    }
}

#[async_trait]
impl FetchAndRegister for MockFetcher {
    async fn fetch_and_register(&self, request: FetchRequest<'_>) -> Result<Artifact> {
        self.calls.lock().unwrap().push(request.url.to_string());

        let delay = self.delays.get(request.url).map(|entry| *entry.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail(request.url) {
            anyhow::bail!("mock failure for {}", request.url);
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let digest = content_digest(request.url);
        let artifact = Artifact {
            id: self.ids.create_node_id(&format!(
                "{} >>> {} >>> {}",
                request.parent_node_id, request.url, sequence
            )),
            parent: request.parent_node_id.to_string(),
            url: Some(request.url.to_string()),
            name: Some(digest.clone()),
            ext: request.ext.map(str::to_string),
            absolute_path: None,
            size: request.url.len() as u64,
            fetched_at: Utc::now(),
            internal: ArtifactInternal {
                kind: FILE_NODE_TYPE.to_string(),
                media_type: Some("image/png".to_string()),
                content_digest: digest,
            },
        };

        if let Some(store) = &self.store {
            store.create_node(artifact.clone());
        }
        self.latest.insert(request.url.to_string(), artifact.clone());
        Ok(artifact)
    }
}
