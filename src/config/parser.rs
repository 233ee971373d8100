//! Generic TOML configuration parsing.
//!
//! ```rust,no_run
//! use remote_images::config::parse_config;
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Deserialize)]
//! struct MyConfig {
//!     name: String,
//! }
//!
//! # fn example() -> anyhow::Result<()> {
//! let config: MyConfig = parse_config(Path::new("remote-images.toml"))?;
//! println!("Config: {}", config.name);
//! # Ok(())
//! # }
//! ```
//!
//! Both read and parse failures name the file; the underlying I/O or TOML
//! error is kept as the cause so [`crate::core::user_friendly_error`] can
//! still recognise it.

use anyhow::{Context, Result};
use std::path::Path;

/// Parse a TOML file into `T`.
///
/// # Errors
///
/// Fails if the file cannot be read, is not valid TOML, or does not match
/// the shape of `T` (including unknown keys when `T` denies them).
pub fn parse_config<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML text into `T`.
///
/// # Errors
///
/// Fails if `content` is not valid TOML for `T`.
pub fn parse_config_str<T>(content: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    Ok(toml::from_str(content)?)
}
