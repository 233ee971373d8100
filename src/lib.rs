//! remote-images - link remote images to the content records that reference them
//!
//! Content records ("nodes") often carry image URLs somewhere deep inside
//! nested objects and arrays. This crate finds those URLs with a path
//! expression, downloads each one, and remembers which downloaded artifact
//! belongs to which record. The link is kept in a durable association cache
//! and exposed through lazy field resolvers, so the records themselves are
//! never mutated and never traversed again on read.
//!
//! # Architecture Overview
//!
//! ```text
//! record ──► path ──► fetch ──► cache ──► resolver
//!            (urls,    (artifacts,  (owner → field    (field query →
//!             owners)   retries)     → artifact ids)   artifacts)
//! ```
//!
//! - [`path`] - Path expressions (`nodes[].image.url`) and their evaluation
//! - [`fetch`] - Concurrent fetch orchestration with retries, timeouts and placeholders
//! - [`cache`] - Read-merge-write association cache over pluggable stores
//! - [`resolver`] - Lazy field resolvers and an in-memory schema registry
//! - [`artifact`] - Registered file artifacts and the node model holding them
//! - [`plugin`] - The per-record driver tying the pieces together
//! - [`config`] - TOML configuration and mapping validation
//! - [`cli`] - `validate`, `process` and `resolve` commands
//! - [`core`] - Error types and record accessors
//!
//! # Example
//!
//! ```rust,no_run
//! use remote_images::artifact::MemoryArtifactStore;
//! use remote_images::cache::AssociationCache;
//! use remote_images::config::ImageFieldOptions;
//! use remote_images::fetch::HttpFetcher;
//! use remote_images::plugin::{NodeContext, RemoteImages};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let artifacts = Arc::new(MemoryArtifactStore::new());
//! let fetcher = HttpFetcher::new("/tmp/images", artifacts.clone(), "remote-images")?;
//! let ctx = NodeContext::new(Arc::new(fetcher), artifacts, AssociationCache::in_memory());
//!
//! let mut options = ImageFieldOptions::new("Article", "imageUrl");
//! options.ext = Some(".png".to_string());
//! let plugin = RemoteImages::new(options)?;
//!
//! let record = json!({"id": "n1", "internal": {"type": "Article"}, "imageUrl": "https://x/y"});
//! let report = plugin.on_create_node(&record, &ctx).await?;
//! println!("fetched {} of {}", report.fetched, report.urls);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod fetch;
pub mod path;
pub mod plugin;
pub mod resolver;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
