//! Cross-process file locks for cache entries.
//!
//! In-process writers are already serialized per key by the association
//! cache. These locks extend that to several processes sharing one cache
//! directory: a [`CacheLock`] is held across the whole read-merge-write of a
//! key and released when dropped.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An exclusive lock on `{cache_dir}/.locks/{name}.lock`.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Acquire the lock named `name`, waiting at most `timeout`.
    ///
    /// The blocking OS lock call runs on the blocking pool so the async
    /// runtime keeps making progress while another process holds the lock.
    ///
    /// # Errors
    ///
    /// Fails if the `.locks` directory or lock file cannot be created, the OS
    /// refuses the lock, or `timeout` elapses first.
    pub async fn acquire(cache_dir: &Path, name: &str, timeout: Duration) -> Result<Self> {
        let locks_dir = cache_dir.join(".locks");
        tokio::fs::create_dir_all(&locks_dir).await.with_context(|| {
            format!("Failed to create locks directory: {}", locks_dir.display())
        })?;

        let lock_path = locks_dir.join(format!("{name}.lock"));
        let blocking_path = lock_path.clone();

        let task = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&blocking_path)
                .with_context(|| format!("Failed to open lock file: {}", blocking_path.display()))?;

            file.lock_exclusive()
                .with_context(|| format!("Failed to lock: {}", blocking_path.display()))?;
            Ok(file)
        });

        let file = tokio::time::timeout(timeout, task)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Timed out after {:?} waiting for lock: {}",
                    timeout,
                    lock_path.display()
                )
            })?
            .context("Failed to spawn blocking task for lock acquisition")??;

        Ok(Self {
            file,
            path: lock_path,
        })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        #[allow(unstable_name_collisions)]
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
