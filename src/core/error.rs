//! Error handling for remote-images
//!
//! Errors are split the same way failures are treated at runtime:
//!
//! - **Configuration errors** ([`RemoteImagesError::ConfigError`],
//!   [`RemoteImagesError::MissingOption`], [`RemoteImagesError::InvalidImagePath`])
//!   are fatal and surface before any record is processed.
//! - **Fetch errors** ([`RemoteImagesError::FetchFailed`],
//!   [`RemoteImagesError::FetchTimeout`], [`RemoteImagesError::OwnerWithoutId`])
//!   are local to a single URL. The fetch orchestrator logs them and degrades
//!   to fewer artifacts; they never reach the caller of a record pass.
//! - **Cache errors** ([`RemoteImagesError::CacheCorrupted`],
//!   [`RemoteImagesError::CacheLockFailed`]) come from the durable store and do
//!   propagate, since a silently dropped association would be invisible later.
//!
//! Use [`user_friendly_error`] to turn any `anyhow::Error` into an
//! [`ErrorContext`] with a suggestion for CLI users.
//!
//! # Examples
//!
//! ```rust,no_run
//! use remote_images::core::{ErrorContext, RemoteImagesError, user_friendly_error};
//!
//! let error = RemoteImagesError::MissingOption {
//!     option: "imagePath".to_string(),
//!     mapping: "images[0]".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for remote-images operations.
#[derive(Error, Debug, Clone)]
pub enum RemoteImagesError {
    /// A path expression could not be parsed.
    ///
    /// Raised while validating configuration, for example for an empty path
    /// or one containing an empty segment such as `items[].[].url`.
    #[error("Invalid image path '{path}': {reason}")]
    InvalidImagePath {
        /// The offending path expression
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// A required mapping option is missing or empty.
    #[error("Missing required option '{option}' in {mapping}")]
    MissingOption {
        /// Option name as written in configuration (e.g. `nodeType`)
        option: String,
        /// Which mapping the option belongs to
        mapping: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration file {file}: {reason}")]
    ConfigParseError {
        /// Path of the file
        file: String,
        /// Parser message
        reason: String,
    },

    /// The fetch collaborator rejected a URL.
    #[error("Failed to fetch {url}: {reason}")]
    FetchFailed {
        /// URL after `prepareUrl` was applied
        url: String,
        /// Reason reported by the collaborator
        reason: String,
    },

    /// A single fetch attempt exceeded the configured timeout.
    #[error("Fetching {url} timed out after {seconds}s")]
    FetchTimeout {
        /// URL after `prepareUrl` was applied
        url: String,
        /// Configured per-attempt timeout
        seconds: u64,
    },

    /// Neither the owning sub-record nor any enclosing record has an `id`.
    #[error("Record owning {url} has no identifier")]
    OwnerWithoutId {
        /// URL whose owner could not be keyed
        url: String,
    },

    /// A persisted cache entry did not have the expected shape.
    #[error("Cache entry '{key}' is corrupted: {reason}")]
    CacheCorrupted {
        /// Cache key
        key: String,
        /// Deserialization message
        reason: String,
    },

    /// A cross-process cache lock could not be taken.
    #[error("Failed to lock cache entry '{key}': {reason}")]
    CacheLockFailed {
        /// Cache key
        key: String,
        /// Underlying reason
        reason: String,
    },

    /// Records input was not what the CLI expects.
    #[error("Invalid records input {file}: {reason}")]
    InvalidRecords {
        /// Path of the records file
        file: String,
        /// Why it was rejected
        reason: String,
    },

    /// File system operation failed
    #[error("File system error: {operation} on {path}")]
    FileSystemError {
        /// The operation that failed
        operation: String,
        /// The path involved
        path: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Other error
    #[error("{message}")]
    Other {
        /// Free-form message
        message: String,
    },
}

impl RemoteImagesError {
    /// Whether this error is a configuration problem that should halt the run.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidImagePath { .. }
                | Self::MissingOption { .. }
                | Self::ConfigError { .. }
                | Self::ConfigParseError { .. }
        )
    }
}

impl From<std::io::Error> for RemoteImagesError {
    fn from(error: std::io::Error) -> Self {
        Self::IoError(error.to_string())
    }
}

/// An error bundled with optional details and a suggestion for the user.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: RemoteImagesError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap an error without suggestion or details.
    #[must_use]
    pub const fn new(error: RemoteImagesError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Convert any error into an [`ErrorContext`] with a suggestion where one is known.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(known) = error.downcast_ref::<RemoteImagesError>() {
        return create_error_context(known.clone());
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(RemoteImagesError::ConfigParseError {
            file: crate::constants::DEFAULT_CONFIG_FILE.to_string(),
            reason: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax and option names in your configuration file");
    }

    if let Some(json_error) = error.downcast_ref::<serde_json::Error>() {
        return ErrorContext::new(RemoteImagesError::Other {
            message: format!("Invalid JSON: {json_error}"),
        })
        .with_suggestion("Records must be a JSON array of objects");
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(RemoteImagesError::IoError(io_error.to_string()))
                    .with_suggestion("Check permissions on the cache and download directories");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(RemoteImagesError::IoError(io_error.to_string()))
                    .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    // Keep the whole chain so context added with `.context()` is not lost.
    let mut message = error.to_string();
    let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !causes.is_empty() {
        message = format!("{message}: {}", causes.join(": "));
    }
    ErrorContext::new(RemoteImagesError::Other {
        message,
    })
}

fn create_error_context(error: RemoteImagesError) -> ErrorContext {
    match &error {
        RemoteImagesError::InvalidImagePath { .. } => ErrorContext::new(error)
            .with_suggestion(
                "Use dotted property names and '[].' after each array, e.g. 'items[].image.url'",
            ),
        RemoteImagesError::MissingOption { option, .. } => {
            let suggestion = format!("Add '{option}' to the [[images]] table");
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        RemoteImagesError::ConfigParseError { .. } | RemoteImagesError::ConfigError { .. } => {
            ErrorContext::new(error)
                .with_suggestion("Run 'remote-images validate' to check the configuration")
        }
        RemoteImagesError::CacheCorrupted { .. } => ErrorContext::new(error)
            .with_suggestion("Delete the cache directory and process the records again")
            .with_details("Cache entries map each record id to its linked artifact ids"),
        RemoteImagesError::CacheLockFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Another process may be writing the same cache; retry when it finishes"),
        RemoteImagesError::InvalidRecords { .. } => ErrorContext::new(error)
            .with_suggestion("Records must be a JSON array of objects with 'id' and 'internal.type'"),
        _ => ErrorContext::new(error),
    }
}
