//! Fetch orchestration.
//!
//! The orchestrator receives the `(url, owner)` targets produced by path
//! evaluation and hands each URL to a [`FetchAndRegister`] collaborator. All
//! URLs of a record are fetched concurrently; the result keeps the input order
//! no matter which fetch completes first.
//!
//! Per URL the orchestrator applies, in order:
//!
//! 1. the optional URL transform (`prepareUrl` / `urlTemplate`);
//! 2. up to `retries` awaited re-attempts with exponential backoff, each
//!    attempt bounded by the per-attempt timeout;
//! 3. on final failure, an `error!` log unless the mapping is silent, and
//!    optionally a placeholder artifact.
//!
//! A failure never leaves this module: the position simply yields `None`.

pub mod http;

pub use http::HttpFetcher;

use crate::artifact::{Artifact, ArtifactStore, NodeIdFactory, content_digest};
use crate::constants::{MAX_RETRIES, MAX_RETRY_DELAY, RETRY_BASE_DELAY_MS};
use crate::core::{RemoteImagesError, record_id};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;

/// Credentials forwarded verbatim to the fetch collaborator.
///
/// `htaccessUser`/`htaccessPass` are understood by [`HttpFetcher`] as HTTP
/// basic auth; any other keys are kept for custom collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auth {
    /// Basic auth user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub htaccess_user: Option<String>,
    /// Basic auth password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub htaccess_pass: Option<String>,
    /// Everything else
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One call to the fetch collaborator.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'r> {
    /// URL after the transform was applied
    pub url: &'r str,
    /// Identifier of the owning record
    pub parent_node_id: &'r str,
    /// Forwarded credentials
    pub auth: &'r Auth,
    /// Configured file extension, if any
    pub ext: Option<&'r str>,
}

/// Downloads a URL and registers the result as an [`Artifact`].
///
/// Implementations register the artifact in their node model before
/// returning it. Any error counts as a fetch failure.
#[async_trait]
pub trait FetchAndRegister: Send + Sync {
    /// Fetch `request.url` and return the registered artifact.
    async fn fetch_and_register(&self, request: FetchRequest<'_>) -> Result<Artifact>;
}

/// URL transform applied before fetching.
pub type UrlTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Per-mapping fetch policy.
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// Re-attempts after the first failure (capped at [`MAX_RETRIES`])
    pub retries: u32,
    /// Per-attempt timeout; `None` leaves it to the collaborator
    pub timeout: Option<Duration>,
    /// Suppress failure logging
    pub silent: bool,
    /// Register a placeholder artifact when a fetch finally fails
    pub placeholder_on_failure: bool,
    /// Transform applied to every URL before fetching
    pub prepare_url: Option<UrlTransform>,
    /// Forwarded credentials
    pub auth: Auth,
    /// File extension forwarded to the collaborator
    pub ext: Option<String>,
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("retries", &self.retries)
            .field("timeout", &self.timeout)
            .field("silent", &self.silent)
            .field("placeholder_on_failure", &self.placeholder_on_failure)
            .field("prepare_url", &self.prepare_url.is_some())
            .field("auth", &self.auth)
            .field("ext", &self.ext)
            .finish()
    }
}

/// A produced artifact and the record it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Registered artifact (a placeholder if `placeholder` is set)
    pub artifact: Artifact,
    /// Identifier of the owning record
    pub owner_id: String,
    /// Whether this stands in for a failed fetch
    pub placeholder: bool,
}

/// Runs fetches for one record pass.
pub struct FetchOrchestrator<'a> {
    fetcher: &'a dyn FetchAndRegister,
    artifacts: &'a dyn ArtifactStore,
    ids: &'a NodeIdFactory,
}

impl<'a> FetchOrchestrator<'a> {
    /// Orchestrator delegating to `fetcher`; placeholders go to `artifacts`.
    pub fn new(
        fetcher: &'a dyn FetchAndRegister,
        artifacts: &'a dyn ArtifactStore,
        ids: &'a NodeIdFactory,
    ) -> Self {
        Self {
            fetcher,
            artifacts,
            ids,
        }
    }

    /// Fetch every target concurrently.
    ///
    /// The result has one entry per target, in target order. Targets without
    /// a URL and failed fetches (without a placeholder) yield `None`.
    pub async fn fetch_all(
        &self,
        targets: &[(Option<&str>, &Value)],
        options: &FetchOptions,
    ) -> Vec<Option<Fetched>> {
        let fetches = targets.iter().map(|&(url, owner)| async move {
            match url {
                Some(url) => self.fetch_one(url, owner, options).await,
                None => None,
            }
        });
        join_all(fetches).await
    }

    async fn fetch_one(&self, url: &str, owner: &Value, options: &FetchOptions) -> Option<Fetched> {
        let url = match &options.prepare_url {
            Some(transform) => transform(url),
            None => url.to_string(),
        };

        let Some(owner_id) = record_id(owner) else {
            report_failure(&anyhow::Error::from(RemoteImagesError::OwnerWithoutId { url }), options);
            return None;
        };

        let request = FetchRequest {
            url: &url,
            parent_node_id: owner_id,
            auth: &options.auth,
            ext: options.ext.as_deref(),
        };

        match self.fetch_with_retry(request, options).await {
            Ok(artifact) => {
                tracing::info!("Created image from {}", url);
                Some(Fetched {
                    artifact,
                    owner_id: owner_id.to_string(),
                    placeholder: false,
                })
            }
            Err(e) => {
                report_failure(&e, options);
                if !options.placeholder_on_failure {
                    return None;
                }
                let artifact = self.placeholder(owner_id, &url);
                tracing::debug!("Registered placeholder {} for {}", artifact.id, url);
                Some(Fetched {
                    artifact,
                    owner_id: owner_id.to_string(),
                    placeholder: true,
                })
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        request: FetchRequest<'_>,
        options: &FetchOptions,
    ) -> Result<Artifact> {
        let retries = options.retries.min(MAX_RETRIES);
        // Delays double from RETRY_BASE_DELAY_MS.
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(RETRY_BASE_DELAY_MS / 2)
            .max_delay(MAX_RETRY_DELAY)
            .take(retries as usize);

        let mut attempt = 0u32;
        Retry::spawn(strategy, || {
            attempt += 1;
            let current = attempt;
            async move {
                let result = self.attempt(request, options.timeout).await;
                match &result {
                    Err(e) if current <= retries => {
                        tracing::warn!(
                            "Fetch attempt {}/{} for {} failed, retrying: {:#}",
                            current,
                            retries + 1,
                            request.url,
                            e
                        );
                    }
                    _ => {}
                }
                result
            }
        })
        .await
    }

    async fn attempt(&self, request: FetchRequest<'_>, timeout: Option<Duration>) -> Result<Artifact> {
        let fetch = self.fetcher.fetch_and_register(request);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
                RemoteImagesError::FetchTimeout {
                    url: request.url.to_string(),
                    seconds: limit.as_secs(),
                }
            })?,
            None => fetch.await,
        }
    }

    fn placeholder(&self, owner_id: &str, url: &str) -> Artifact {
        let id = self.ids.create_node_id(&format!("{owner_id} >>> {url} >>> placeholder"));
        let digest = content_digest(&id);
        let artifact = Artifact::placeholder(id, owner_id, digest);
        self.artifacts.create_node(artifact.clone());
        artifact
    }
}

fn report_failure(error: &anyhow::Error, options: &FetchOptions) {
    if !options.silent {
        tracing::error!("remote-images ERROR: {:#}", error);
    }
}

/// Build a [`UrlTransform`] from a template in which `{url}` is replaced.
#[must_use]
pub fn url_template(template: &str) -> UrlTransform {
    let template = template.to_string();
    Arc::new(move |url: &str| template.replace("{url}", url))
}
