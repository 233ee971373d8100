//! Validate a configuration file.
//!
//! Checks TOML syntax, option names, required options, path expressions and
//! duplicate fields, then lists the fields each mapping will register.
//!
//! ```bash
//! remote-images validate --config remote-images.toml
//! remote-images validate --format json
//! ```

use crate::cache::AssociationCache;
use crate::config::PluginConfig;
use crate::constants::DEFAULT_CONFIG_FILE;
use crate::plugin::RemoteImages;
use crate::resolver::FieldResolver;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;

/// Output format of the `validate` command.
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON object
    Json,
}

/// Arguments of `remote-images validate`.
#[derive(Args)]
pub struct ValidateCommand {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl ValidateCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Returns the configuration error when the file is invalid.
    pub async fn execute(self) -> Result<()> {
        let loaded = PluginConfig::load(&self.config)
            .and_then(|config| Ok(RemoteImages::from_mappings(&config.images)?));

        let plugins = match loaded {
            Ok(plugins) => plugins,
            Err(e) => {
                if self.format == OutputFormat::Json {
                    let report = json!({"valid": false, "errors": [format!("{e:#}")]});
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                return Err(e);
            }
        };

        let cache = AssociationCache::in_memory();
        let fields: Vec<(&RemoteImages, FieldResolver)> = plugins
            .iter()
            .map(|plugin| {
                let options = plugin.options();
                let resolver =
                    FieldResolver::new(options.name.clone(), plugin.field_arity(), cache.clone());
                (plugin, resolver)
            })
            .collect();

        match self.format {
            OutputFormat::Text => {
                println!("{} Valid {}", "✓".green(), self.config.display());
                for (plugin, resolver) in &fields {
                    let options = plugin.options();
                    println!(
                        "  {}.{}: {} <- {}",
                        options.node_type,
                        resolver.field(),
                        resolver.type_name(),
                        options.image_path
                    );
                }
            }
            OutputFormat::Json => {
                let mappings: Vec<_> = fields
                    .iter()
                    .map(|(plugin, resolver)| {
                        let options = plugin.options();
                        json!({
                            "nodeType": options.node_type,
                            "name": resolver.field(),
                            "imagePath": options.image_path,
                            "type": resolver.type_name(),
                        })
                    })
                    .collect();
                let report = json!({"valid": true, "mappings": mappings});
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }

        Ok(())
    }
}
