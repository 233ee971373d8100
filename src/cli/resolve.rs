//! Resolve linked images for a records file.
//!
//! Registers the configured fields in a schema and prints, for every record
//! whose type has fields, what each field resolves to:
//!
//! ```json
//! [
//!   { "id": "n1", "type": "Article", "fields": { "localImage": { "id": "..." } } }
//! ]
//! ```
//!
//! Records are not traversed; only the association cache and the artifact
//! index are read.

use super::common::{Workspace, load_records};
use crate::config::PluginConfig;
use crate::constants::DEFAULT_CONFIG_FILE;
use crate::core::{record_id, record_type};
use crate::plugin::RemoteImages;
use crate::resolver::{ResolverContext, Schema};
use anyhow::Result;
use clap::Args;
use serde_json::{Value, json};
use std::path::PathBuf;

/// Arguments of `remote-images resolve`.
#[derive(Args)]
pub struct ResolveCommand {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// JSON array of records
    #[arg(short, long, value_name = "FILE")]
    pub records: PathBuf,

    /// Only print this field
    #[arg(long)]
    pub field: Option<String>,
}

impl ResolveCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or records, or an unreadable cache.
    pub async fn execute(self) -> Result<()> {
        let config = PluginConfig::load(&self.config)?;
        let plugins = RemoteImages::from_mappings(&config.images)?;
        let records = load_records(&self.records).await?;
        let workspace = Workspace::open(&config).await?;

        let mut schema = Schema::new();
        for plugin in &plugins {
            plugin.create_resolvers(&workspace.cache, &mut schema)?;
        }
        tracing::debug!("Registered {} fields", schema.field_count());

        let ctx = ResolverContext::new(workspace.artifacts.clone());
        let mut output = Vec::new();
        for record in &records {
            let mut fields = schema.resolve_record(record, &ctx).await?;
            if let Some(only) = &self.field {
                fields.retain(|name, _| name == only);
            }
            if fields.is_empty() {
                continue;
            }
            output.push(json!({
                "id": record_id(record),
                "type": record_type(record),
                "fields": fields,
            }));
        }

        println!("{}", serde_json::to_string_pretty(&Value::Array(output))?);
        Ok(())
    }
}
