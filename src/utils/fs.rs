//! File system helpers: directory creation and atomic writes.
//!
//! Cache entries, the artifact index, and downloaded images are all written
//! through [`atomic_write`] so a crash never leaves a half-written file where
//! a reader could pick it up.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Create `path` and its parents if they do not exist.
///
/// # Errors
///
/// Fails if the directory cannot be created or `path` exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Write `content` to `path` atomically.
///
/// The bytes go to a temporary file in the same directory, are synced to
/// disk, and the file is then renamed over `path`.
///
/// # Errors
///
/// Fails if the parent directory cannot be created or any write/rename fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in: {}", parent.display()))?;
    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for: {}", path.display()))?;
    temp.as_file().sync_all().context("Failed to sync file to disk")?;
    temp.persist(path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Expand `~` and environment variables in a configured path.
///
/// # Errors
///
/// Fails when a referenced environment variable is not set.
pub fn expand_path(raw: &str) -> Result<std::path::PathBuf> {
    let expanded = shellexpand::full(raw)
        .with_context(|| format!("Failed to expand path: {raw}"))?;
    Ok(std::path::PathBuf::from(expanded.as_ref()))
}
