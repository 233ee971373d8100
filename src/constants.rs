//! Global constants used throughout the remote-images codebase.
//!
//! Defaults for configuration options, retry parameters, and the naming
//! scheme of persisted cache keys live here so the numbers are discoverable
//! in one place.

use std::time::Duration;

/// Marker in a path expression meaning "for each element of the sequence at
/// this point, continue with the rest of the path".
pub const ARRAY_INDICATOR: &str = "[].";

/// Prefix of every association cache key (`<prefix>-<ownerId>`).
pub const CACHE_KEY_PREFIX: &str = "remote-images";

/// Field name used when a mapping does not set `name`.
pub const DEFAULT_FIELD_NAME: &str = "localImage";

/// Type name of registered file artifacts.
pub const FILE_NODE_TYPE: &str = "File";

/// Media type given to placeholder artifacts created after a failed fetch.
pub const PLACEHOLDER_MEDIA_TYPE: &str = "application/octet-stream";

/// Namespace used to derive deterministic artifact identifiers (UUID v5).
pub const NODE_ID_NAMESPACE: &str = "remote-images";

/// Default per-attempt fetch timeout in seconds.
///
/// A value of zero in configuration disables the timeout entirely, which
/// leaves the fetch collaborator in charge of giving up.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Starting delay for exponential backoff between fetch attempts (100ms).
pub const RETRY_BASE_DELAY_MS: u64 = 100;

/// Maximum backoff delay between fetch attempts (5 seconds).
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound accepted for the `retries` option.
pub const MAX_RETRIES: u32 = 10;

/// Timeout for acquiring a cross-process cache key lock (30 seconds).
pub fn default_lock_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Minimum number of records processed concurrently regardless of CPU count.
pub const MIN_PARALLELISM: usize = 10;

/// Multiplier applied to CPU core count for default record parallelism.
pub const PARALLELISM_CORE_MULTIPLIER: usize = 2;

/// Default CPU core count when detection fails.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Default record parallelism: max(10, 2 × CPU cores).
#[must_use]
pub fn default_max_parallel() -> usize {
    let cores = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(FALLBACK_CORE_COUNT);
    std::cmp::max(MIN_PARALLELISM, cores * PARALLELISM_CORE_MULTIPLIER)
}

/// File name of the persisted artifact index inside the cache directory.
pub const ARTIFACT_INDEX_FILE: &str = "artifacts.json";

/// Lock name guarding read-merge-write of the artifact index.
pub const ARTIFACT_INDEX_LOCK: &str = "artifact-index";

/// Default name of the configuration file looked up by the CLI.
pub const DEFAULT_CONFIG_FILE: &str = "remote-images.toml";
