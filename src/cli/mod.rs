//! Command-line interface for remote-images.
//!
//! # Available Commands
//!
//! - `validate` - Check a configuration file without touching the network
//! - `process` - Fetch the images of a records file and write the association cache
//! - `resolve` - Print the linked artifacts of each record as JSON
//!
//! # Typical Workflow
//!
//! ```bash
//! # 1. Check the mappings
//! remote-images validate --config remote-images.toml
//!
//! # 2. Download images and link them to their records
//! remote-images process --config remote-images.toml --records nodes.json
//!
//! # 3. Read the links back, as a field query would
//! remote-images resolve --config remote-images.toml --records nodes.json
//! ```
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: errors only
//!
//! `RUST_LOG`, when set, takes precedence over both. Logs go to stderr so
//! command output on stdout stays machine-readable.

mod common;
pub mod process;
pub mod resolve;
pub mod validate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Runtime configuration derived from global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log level used when `RUST_LOG` is not set; `None` means `info`.
    pub log_level: Option<String>,
}

impl CliConfig {
    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Install the global `tracing` subscriber.
    ///
    /// Only the first call has an effect.
    pub fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.log_level.as_deref().unwrap_or("info"))
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

/// Main CLI structure.
#[derive(Parser)]
#[command(
    name = "remote-images",
    about = "Fetch remote images referenced by content records and link them back",
    version,
    author,
    long_about = "remote-images finds image URLs inside content records using path expressions, \
                  downloads them, and records which artifacts belong to which record so they \
                  can be resolved later without re-reading the records."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate(validate::ValidateCommand),

    /// Fetch images for a records file
    Process(process::ProcessCommand),

    /// Resolve linked images for a records file
    Resolve(resolve::ResolveCommand),
}

impl Cli {
    /// Run the selected command.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
        }
    }

    /// Run the selected command with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        match self.command {
            Commands::Validate(cmd) => cmd.execute().await,
            Commands::Process(cmd) => cmd.execute().await,
            Commands::Resolve(cmd) => cmd.execute().await,
        }
    }
}
