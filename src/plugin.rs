//! Node-observation driver.
//!
//! [`RemoteImages`] wires one validated field mapping to the engine. For every
//! observed record of the mapped type it:
//!
//! 1. evaluates the path expression, getting `(url, owner)` targets;
//! 2. fetches all URLs of the record concurrently;
//! 3. groups the produced artifact ids by owner, in URL order;
//! 4. writes one association cache entry per owner that received at least
//!    one artifact.
//!
//! [`RemoteImages::create_resolvers`] registers the matching lazy field
//! resolver. [`process_records`] drives many records at once; records are
//! independent of each other.

use crate::artifact::{ArtifactStore, NodeIdFactory};
use crate::cache::{AssociationCache, FieldValue};
use crate::config::ImageFieldOptions;
use crate::core::{FieldArity, RemoteImagesError, record_id, record_type};
use crate::fetch::{FetchAndRegister, FetchOptions, FetchOrchestrator};
use crate::path::ImagePath;
use crate::resolver::{FieldResolver, ResolverMap, ResolverRegistry};
use anyhow::Result;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Collaborators handed to every record pass.
#[derive(Clone)]
pub struct NodeContext {
    /// Fetch-and-register collaborator
    pub fetcher: Arc<dyn FetchAndRegister>,
    /// Node model receiving placeholder artifacts
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Association cache handle
    pub cache: AssociationCache,
    /// Identifier factory for placeholders
    pub ids: NodeIdFactory,
}

impl NodeContext {
    /// Context with the default id namespace.
    pub fn new(
        fetcher: Arc<dyn FetchAndRegister>,
        artifacts: Arc<dyn ArtifactStore>,
        cache: AssociationCache,
    ) -> Self {
        Self {
            fetcher,
            artifacts,
            cache,
            ids: NodeIdFactory::default(),
        }
    }
}

/// Outcome of processing one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    /// Identifier of the processed record
    pub record_id: Option<String>,
    /// Whether any mapping matched the record type
    pub matched: bool,
    /// URLs resolved from the record
    pub urls: usize,
    /// URLs fetched successfully
    pub fetched: usize,
    /// URLs that produced no real artifact
    pub failed: usize,
    /// Placeholders registered for failed URLs
    pub placeholders: usize,
    /// Cache entries written
    pub owners_written: usize,
}

impl ProcessReport {
    fn for_record(record: &Value) -> Self {
        Self {
            record_id: record_id(record).map(str::to_string),
            ..Self::default()
        }
    }

    /// Fold another report for the same record into this one.
    pub fn absorb(&mut self, other: &Self) {
        self.matched |= other.matched;
        self.urls += other.urls;
        self.fetched += other.fetched;
        self.failed += other.failed;
        self.placeholders += other.placeholders;
        self.owners_written += other.owners_written;
    }
}

/// One configured field mapping, ready to process records.
#[derive(Debug)]
pub struct RemoteImages {
    options: ImageFieldOptions,
    path: ImagePath,
    fetch: FetchOptions,
    field_arity: FieldArity,
}

impl RemoteImages {
    /// Validate `options` and build the driver.
    ///
    /// # Errors
    ///
    /// Returns the configuration error of an invalid mapping.
    pub fn new(options: ImageFieldOptions) -> Result<Self, RemoteImagesError> {
        Self::with_label(options, "images")
    }

    /// Build one driver per mapping, failing on the first invalid one.
    ///
    /// # Errors
    ///
    /// Returns the configuration error of the first invalid mapping.
    pub fn from_mappings(mappings: &[ImageFieldOptions]) -> Result<Vec<Self>, RemoteImagesError> {
        mappings
            .iter()
            .enumerate()
            .map(|(index, options)| Self::with_label(options.clone(), &format!("images[{index}]")))
            .collect()
    }

    fn with_label(options: ImageFieldOptions, label: &str) -> Result<Self, RemoteImagesError> {
        let path = options.validate(label)?;
        let field_arity = options.field_arity(&path);
        let fetch = options.fetch_options();
        Ok(Self {
            options,
            path,
            fetch,
            field_arity,
        })
    }

    /// The mapping's options.
    #[must_use]
    pub fn options(&self) -> &ImageFieldOptions {
        &self.options
    }

    /// Arity of the output field.
    #[must_use]
    pub const fn field_arity(&self) -> FieldArity {
        self.field_arity
    }

    /// Process one observed record.
    ///
    /// Records of another type are ignored. Failed fetches only reduce the
    /// number of linked artifacts.
    ///
    /// # Errors
    ///
    /// Fails only when the association cache cannot be written.
    pub async fn on_create_node(&self, node: &Value, ctx: &NodeContext) -> Result<ProcessReport> {
        let mut report = ProcessReport::for_record(node);
        if record_type(node) != Some(self.options.node_type.as_str()) {
            return Ok(report);
        }
        report.matched = true;

        let resolution = self.path.resolve(node, self.options.ext.as_deref(), self.options.arity);
        report.urls = resolution.url_count();
        if report.urls == 0 {
            tracing::debug!(
                "No URLs at '{}' in {}",
                self.path,
                report.record_id.as_deref().unwrap_or("<no id>")
            );
            return Ok(report);
        }

        let targets = resolution.targets();
        let orchestrator =
            FetchOrchestrator::new(ctx.fetcher.as_ref(), ctx.artifacts.as_ref(), &ctx.ids);
        let results = orchestrator.fetch_all(&targets, &self.fetch).await;

        // Owners in first-seen order, each with its artifact ids in URL order.
        let mut by_owner: Vec<(String, Vec<String>)> = Vec::new();
        for fetched in results.into_iter().flatten() {
            if fetched.placeholder {
                report.placeholders += 1;
            } else {
                report.fetched += 1;
            }
            match by_owner.iter_mut().find(|(owner, _)| *owner == fetched.owner_id) {
                Some((_, ids)) => ids.push(fetched.artifact.id),
                None => by_owner.push((fetched.owner_id, vec![fetched.artifact.id])),
            }
        }
        report.failed = report.urls - report.fetched;

        for (owner_id, mut ids) in by_owner {
            let value = match self.field_arity {
                FieldArity::Array => FieldValue::Many(ids),
                // Without an array indicator a record yields a single URL.
                FieldArity::Object => match ids.pop() {
                    Some(id) => FieldValue::One(id),
                    None => continue,
                },
            };
            ctx.cache.record_artifacts(&owner_id, &self.options.name, value).await?;
            report.owners_written += 1;
        }

        Ok(report)
    }

    /// Resolvers this mapping contributes: one field on its record type.
    #[must_use]
    pub fn resolvers(&self, cache: &AssociationCache) -> ResolverMap {
        let mut map = ResolverMap::new();
        map.entry(self.options.node_type.clone()).or_default().insert(
            self.options.name.clone(),
            FieldResolver::new(self.options.name.clone(), self.field_arity, cache.clone()),
        );
        map
    }

    /// Register this mapping's resolver with `registry`.
    ///
    /// # Errors
    ///
    /// Propagates the registry's rejection, e.g. a field registered twice.
    pub fn create_resolvers(
        &self,
        cache: &AssociationCache,
        registry: &mut dyn ResolverRegistry,
    ) -> Result<()> {
        registry.create_resolvers(self.resolvers(cache))
    }
}

/// Process `records` with every mapping, `max_parallel` records at a time.
///
/// Reports come back in record order. All mappings of a record run
/// concurrently, so writes for different fields of one owner race only at the
/// cache, which serializes them.
///
/// # Errors
///
/// Fails if any cache write failed; all records are still attempted.
pub async fn process_records(
    plugins: &[RemoteImages],
    records: &[Value],
    ctx: &NodeContext,
    max_parallel: usize,
) -> Result<Vec<ProcessReport>> {
    let passes = records.iter().enumerate().map(|(index, record)| async move {
        let mut report = ProcessReport::for_record(record);
        let outcomes = futures::future::join_all(
            plugins.iter().map(|plugin| plugin.on_create_node(record, ctx)),
        )
        .await;
        for outcome in outcomes {
            report.absorb(&outcome?);
        }
        Ok::<_, anyhow::Error>((index, report))
    });

    let mut results: Vec<(usize, ProcessReport)> = futures::stream::iter(passes)
        .buffer_unordered(max_parallel.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_>>()?;

    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, report)| report).collect())
}
