//! Configuration for remote-images.
//!
//! A configuration file holds global `[settings]` and one `[[images]]` table
//! per field mapping:
//!
//! ```toml
//! [settings]
//! cacheDir = "~/.cache/remote-images"
//! downloadDir = "$PROJECT/public/images"
//! maxParallel = 16
//!
//! [[images]]
//! nodeType = "Article"
//! imagePath = "imageUrl"
//! ext = ".png"
//!
//! [[images]]
//! nodeType = "Gallery"
//! imagePath = "photos[].source.url"
//! name = "localPhotos"
//! retries = 2
//! silent = true
//! ```
//!
//! Every mapping is validated before any record is processed; a bad mapping
//! stops the run up front instead of failing on the first matching record.
//! Paths in `[settings]` go through `shellexpand`, so `~` and `$VAR` work.
//!
//! When `cacheDir` is not set, [`default_cache_dir`] is used:
//!
//! 1. `REMOTE_IMAGES_CACHE_DIR` environment variable (if set)
//! 2. the platform cache directory joined with `remote-images`

mod options;
mod parser;

pub use options::ImageFieldOptions;
pub use parser::{parse_config, parse_config_str};

use crate::constants::default_max_parallel;
use crate::core::RemoteImagesError;
use crate::utils::fs::expand_path;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Environment variable overriding the default cache directory.
pub const CACHE_DIR_ENV: &str = "REMOTE_IMAGES_CACHE_DIR";

/// Default cache directory.
///
/// # Errors
///
/// Fails if no platform cache directory can be determined.
pub fn default_cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
        .ok_or_else(|| anyhow::anyhow!("Unable to determine cache directory"))?;
    Ok(base.join("remote-images"))
}

/// Global settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
    /// Where cache entries and the artifact index are kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    /// Where downloaded files go; defaults to `<cacheDir>/downloads`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,
    /// Records processed concurrently
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,
    /// User agent sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Settings {
    /// Resolved cache directory.
    ///
    /// # Errors
    ///
    /// Fails if the configured path cannot be expanded or no default exists.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(raw) => expand_path(raw),
            None => default_cache_dir(),
        }
    }

    /// Resolved download directory.
    ///
    /// # Errors
    ///
    /// Fails like [`Self::cache_dir`].
    pub fn download_dir(&self) -> Result<PathBuf> {
        match &self.download_dir {
            Some(raw) => expand_path(raw),
            None => Ok(self.cache_dir()?.join("downloads")),
        }
    }

    /// Record parallelism, at least one.
    #[must_use]
    pub fn max_parallel(&self) -> usize {
        self.max_parallel.unwrap_or_else(default_max_parallel).max(1)
    }

    /// User agent for HTTP requests.
    #[must_use]
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("remote-images/{}", env!("CARGO_PKG_VERSION")))
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    /// Global settings
    #[serde(default)]
    pub settings: Settings,
    /// Field mappings
    #[serde(default)]
    pub images: Vec<ImageFieldOptions>,
}

impl PluginConfig {
    /// Read, parse and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or any mapping is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = parse_config(path)?;
        config.validate()?;
        tracing::debug!("Loaded {} image mappings from {}", config.images.len(), path.display());
        Ok(config)
    }

    /// Validate every mapping.
    ///
    /// # Errors
    ///
    /// Returns the first invalid mapping's error, a duplicate
    /// `(nodeType, name)` pair, or an error when no mapping is configured.
    pub fn validate(&self) -> Result<(), RemoteImagesError> {
        if self.images.is_empty() {
            return Err(RemoteImagesError::ConfigError {
                message: "no [[images]] mappings configured".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (index, mapping) in self.images.iter().enumerate() {
            mapping.validate(&format!("images[{index}]"))?;
            if !seen.insert((mapping.node_type.as_str(), mapping.name.as_str())) {
                return Err(RemoteImagesError::ConfigError {
                    message: format!(
                        "images[{index}]: field '{}' is already mapped for '{}'",
                        mapping.name, mapping.node_type
                    ),
                });
            }
        }
        Ok(())
    }
}
