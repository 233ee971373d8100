//! Test utilities for remote-images
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration suite:
//!
//! - [`init_test_logging`] sets up `tracing` output once per test binary
//! - [`MockFetcher`] is a scripted [`crate::fetch::FetchAndRegister`] with
//!   per-URL failures, artificial delays and a call log
//! - [`fixtures`] builds records and configuration files
//!
//! ```rust,no_run
//! use remote_images::test_utils::{MockFetcher, init_test_logging};
//! use std::time::Duration;
//!
//! init_test_logging(None);
//! let fetcher = MockFetcher::new()
//!     .fail_times("https://x/flaky.png", 1)
//!     .delay("https://x/slow.png", Duration::from_millis(50));
//! ```

pub mod fixtures;
pub mod mock_fetcher;

pub use mock_fetcher::MockFetcher;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; without either, tests run
/// without log output.
///
/// ```bash
/// RUST_LOG=remote_images=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
