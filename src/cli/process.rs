//! Fetch images for a records file.
//!
//! Every record is matched against every mapping; matching records have their
//! URLs downloaded into the download directory and linked in the association
//! cache. The artifact index is saved next to the cache so `resolve` can find
//! the files later.
//!
//! ```bash
//! remote-images process --records nodes.json
//! remote-images process --records nodes.json --max-parallel 4 --format json
//! ```

use super::common::{Workspace, load_records};
use super::validate::OutputFormat;
use crate::config::PluginConfig;
use crate::constants::DEFAULT_CONFIG_FILE;
use crate::fetch::HttpFetcher;
use crate::plugin::{NodeContext, ProcessReport, RemoteImages, process_records};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments of `remote-images process`.
#[derive(Args)]
pub struct ProcessCommand {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// JSON array of records
    #[arg(short, long, value_name = "FILE")]
    pub records: PathBuf,

    /// Records processed concurrently (overrides `maxParallel`)
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl ProcessCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or records, or when the cache or the
    /// artifact index cannot be written. Individual fetch failures do not fail
    /// the command.
    pub async fn execute(self) -> Result<()> {
        let config = PluginConfig::load(&self.config)?;
        let plugins = RemoteImages::from_mappings(&config.images)?;
        let records = load_records(&self.records).await?;
        let workspace = Workspace::open(&config).await?;

        let fetcher = HttpFetcher::new(
            config.settings.download_dir()?,
            workspace.artifacts.clone(),
            &config.settings.user_agent(),
        )?;
        let ctx = NodeContext::new(
            Arc::new(fetcher),
            workspace.artifacts.clone(),
            workspace.cache.clone(),
        );

        let max_parallel = self.max_parallel.unwrap_or_else(|| config.settings.max_parallel());
        tracing::info!("Processing {} records ({} at a time)", records.len(), max_parallel);

        // Cache entries written before a failure still need their artifacts indexed.
        let outcome = process_records(&plugins, &records, &ctx, max_parallel).await;
        let persisted = workspace.artifacts.persist(&workspace.index_path).await;
        let reports = outcome?;
        persisted?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
            OutputFormat::Text => print_summary(&reports),
        }
        Ok(())
    }
}

fn print_summary(reports: &[ProcessReport]) {
    let mut total = ProcessReport::default();
    for report in reports.iter().filter(|report| report.matched) {
        let id = report.record_id.as_deref().unwrap_or("<no id>");
        let status = if report.failed == 0 {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "{} {}: {}/{} fetched, {} placeholders, {} entries written",
            status, id, report.fetched, report.urls, report.placeholders, report.owners_written
        );
        total.absorb(report);
    }

    println!(
        "{} URLs, {} fetched, {} failed, {} cache entries written",
        total.urls, total.fetched, total.failed, total.owners_written
    );
}
