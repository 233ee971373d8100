//! Lazy field resolvers.
//!
//! A [`FieldResolver`] is registered per `(record type, field name)`. When
//! the field is queried it reads the association cache entry of the source
//! record and maps the stored artifact id(s) through the node model handed in
//! via [`ResolverContext`]. The record itself is never traversed again.
//!
//! Arity decides the empty result: object fields resolve to `null`, array
//! fields to `[]`, so a field that is declared as a list never becomes
//! `null`.

use crate::artifact::{Artifact, ArtifactStore};
use crate::cache::AssociationCache;
use crate::constants::FILE_NODE_TYPE;
use crate::core::{FieldArity, RemoteImagesError, record_id, record_type};
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Value of a resolved field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResolvedField {
    /// Object field: the artifact or `null`
    Single(Option<Artifact>),
    /// Array field, in stored order; artifacts removed since are `null`
    Many(Vec<Option<Artifact>>),
}

impl ResolvedField {
    /// The empty result for `arity`.
    #[must_use]
    pub fn empty(arity: FieldArity) -> Self {
        match arity {
            FieldArity::Object => Self::Single(None),
            FieldArity::Array => Self::Many(Vec::new()),
        }
    }
}

/// Capabilities available to resolvers at query time.
#[derive(Clone)]
pub struct ResolverContext {
    node_model: Arc<dyn ArtifactStore>,
}

impl ResolverContext {
    /// Context resolving artifact ids through `node_model`.
    pub fn new(node_model: Arc<dyn ArtifactStore>) -> Self {
        Self {
            node_model,
        }
    }

    /// Look up a registered artifact.
    #[must_use]
    pub fn get_node_by_id(&self, id: &str) -> Option<Artifact> {
        self.node_model.get_node_by_id(id)
    }
}

/// Resolver for one output field.
#[derive(Debug, Clone)]
pub struct FieldResolver {
    field: String,
    arity: FieldArity,
    cache: AssociationCache,
}

impl FieldResolver {
    /// Resolver reading `field` from `cache`.
    pub fn new(field: impl Into<String>, arity: FieldArity, cache: AssociationCache) -> Self {
        Self {
            field: field.into(),
            arity,
            cache,
        }
    }

    /// Name of the output field.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Field arity.
    #[must_use]
    pub const fn arity(&self) -> FieldArity {
        self.arity
    }

    /// Declared type: `File` or `[File]`.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self.arity {
            FieldArity::Object => FILE_NODE_TYPE.to_string(),
            FieldArity::Array => format!("[{FILE_NODE_TYPE}]"),
        }
    }

    /// Resolve the field for `source`.
    ///
    /// # Errors
    ///
    /// Fails only if the cache cannot be read; a missing entry is an empty
    /// result.
    pub async fn resolve(&self, source: &Value, ctx: &ResolverContext) -> Result<ResolvedField> {
        let Some(id) = record_id(source) else {
            return Ok(ResolvedField::empty(self.arity));
        };
        let stored = self
            .cache
            .lookup_artifacts(id)
            .await?
            .and_then(|mut fields| fields.remove(&self.field));
        let Some(stored) = stored else {
            return Ok(ResolvedField::empty(self.arity));
        };

        Ok(match self.arity {
            FieldArity::Object => {
                ResolvedField::Single(stored.first().and_then(|id| ctx.get_node_by_id(id)))
            }
            FieldArity::Array => ResolvedField::Many(
                stored.ids().into_iter().map(|id| ctx.get_node_by_id(id)).collect(),
            ),
        })
    }
}

/// `record type → field name → resolver`.
pub type ResolverMap = BTreeMap<String, BTreeMap<String, FieldResolver>>;

/// Registration surface for field resolvers.
pub trait ResolverRegistry {
    /// Register every resolver in `resolvers`.
    ///
    /// # Errors
    ///
    /// Implementations may reject a field that is already registered.
    fn create_resolvers(&mut self, resolvers: ResolverMap) -> Result<()>;
}

/// In-memory resolver registry that can execute what it holds.
#[derive(Debug, Default)]
pub struct Schema {
    types: ResolverMap,
}

impl Schema {
    /// Empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered resolver for `(type_name, field)`.
    #[must_use]
    pub fn resolver(&self, type_name: &str, field: &str) -> Option<&FieldResolver> {
        self.types.get(type_name).and_then(|fields| fields.get(field))
    }

    /// Number of registered fields across all types.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.types.values().map(BTreeMap::len).sum()
    }

    /// Resolve one field; `None` when nothing is registered for it.
    ///
    /// # Errors
    ///
    /// Propagates cache read errors.
    pub async fn resolve_field(
        &self,
        type_name: &str,
        field: &str,
        source: &Value,
        ctx: &ResolverContext,
    ) -> Result<Option<ResolvedField>> {
        match self.resolver(type_name, field) {
            Some(resolver) => Ok(Some(resolver.resolve(source, ctx).await?)),
            None => Ok(None),
        }
    }

    /// Resolve every field registered for the type of `source`.
    ///
    /// # Errors
    ///
    /// Propagates cache read errors.
    pub async fn resolve_record(
        &self,
        source: &Value,
        ctx: &ResolverContext,
    ) -> Result<BTreeMap<String, ResolvedField>> {
        let mut resolved = BTreeMap::new();
        let Some(fields) = record_type(source).and_then(|kind| self.types.get(kind)) else {
            return Ok(resolved);
        };
        for (name, resolver) in fields {
            resolved.insert(name.clone(), resolver.resolve(source, ctx).await?);
        }
        Ok(resolved)
    }
}

impl ResolverRegistry for Schema {
    fn create_resolvers(&mut self, resolvers: ResolverMap) -> Result<()> {
        for (type_name, fields) in resolvers {
            let registered = self.types.entry(type_name.clone()).or_default();
            for (field, resolver) in fields {
                if registered.contains_key(&field) {
                    return Err(RemoteImagesError::ConfigError {
                        message: format!("Field '{field}' is already registered on '{type_name}'"),
                    }
                    .into());
                }
                tracing::debug!(
                    "Registered {}.{}: {}",
                    type_name,
                    field,
                    resolver.type_name()
                );
                registered.insert(field, resolver);
            }
        }
        Ok(())
    }
}
