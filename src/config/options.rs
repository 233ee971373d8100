//! Options of one field mapping (`[[images]]` table).

use crate::constants::{DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_FIELD_NAME, MAX_RETRIES};
use crate::core::{FieldArity, RemoteImagesError};
use crate::fetch::{Auth, FetchOptions, UrlTransform, url_template};
use crate::path::ImagePath;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

fn default_name() -> String {
    DEFAULT_FIELD_NAME.to_string()
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

/// One mapping from a record type and path expression to an output field.
///
/// ```toml
/// [[images]]
/// nodeType = "Article"
/// imagePath = "sections[].cover.url"
/// name = "coverImage"
/// ext = ".jpg"
/// retries = 2
/// ```
///
/// `nodeType` and `imagePath` are required; they default to empty here so a
/// missing value is reported by [`ImageFieldOptions::validate`] with the
/// mapping it belongs to rather than as a parse error.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImageFieldOptions {
    /// Record type to match (`internal.type`)
    #[serde(default)]
    pub node_type: String,

    /// Path expression locating the URL(s)
    #[serde(default)]
    pub image_path: String,

    /// Output field name
    #[serde(default = "default_name")]
    pub name: String,

    /// Appended to every resolved URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,

    /// Credentials forwarded to the fetcher
    #[serde(default)]
    pub auth: Auth,

    /// Leaf arity hint
    #[serde(default, rename = "type")]
    pub arity: FieldArity,

    /// Suppress failure logging
    #[serde(default)]
    pub silent: bool,

    /// Re-attempts after a failed fetch
    #[serde(default)]
    pub retries: u32,

    /// Per-attempt timeout in seconds; `0` disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Register a placeholder artifact when a fetch finally fails
    #[serde(default)]
    pub placeholder_on_failure: bool,

    /// Declarative URL transform; `{url}` is replaced by the resolved URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_template: Option<String>,

    /// Programmatic URL transform
    #[serde(skip)]
    pub prepare_url: Option<UrlTransform>,
}

impl Default for ImageFieldOptions {
    fn default() -> Self {
        Self {
            node_type: String::new(),
            image_path: String::new(),
            name: default_name(),
            ext: None,
            auth: Auth::default(),
            arity: FieldArity::default(),
            silent: false,
            retries: 0,
            timeout_secs: default_timeout_secs(),
            placeholder_on_failure: false,
            url_template: None,
            prepare_url: None,
        }
    }
}

impl fmt::Debug for ImageFieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFieldOptions")
            .field("node_type", &self.node_type)
            .field("image_path", &self.image_path)
            .field("name", &self.name)
            .field("ext", &self.ext)
            .field("arity", &self.arity)
            .field("silent", &self.silent)
            .field("retries", &self.retries)
            .field("timeout_secs", &self.timeout_secs)
            .field("placeholder_on_failure", &self.placeholder_on_failure)
            .field("url_template", &self.url_template)
            .field("prepare_url", &self.prepare_url.is_some())
            .finish_non_exhaustive()
    }
}

impl ImageFieldOptions {
    /// Mapping with the two required options and defaults for the rest.
    #[must_use]
    pub fn new(node_type: impl Into<String>, image_path: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            image_path: image_path.into(),
            ..Self::default()
        }
    }

    /// Set the programmatic URL transform.
    #[must_use]
    pub fn with_prepare_url(
        mut self,
        transform: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.prepare_url = Some(std::sync::Arc::new(transform));
        self
    }

    /// Check the mapping and return its parsed path expression.
    ///
    /// `mapping` names the mapping in error messages (e.g. `images[0]`).
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a missing `nodeType`, `imagePath`
    /// or `name`, an unparseable path, too many retries, or an unusable URL
    /// transform.
    pub fn validate(&self, mapping: &str) -> Result<ImagePath, RemoteImagesError> {
        let missing = |option: &str| RemoteImagesError::MissingOption {
            option: option.to_string(),
            mapping: mapping.to_string(),
        };

        if self.node_type.trim().is_empty() {
            return Err(missing("nodeType"));
        }
        if self.image_path.trim().is_empty() {
            return Err(missing("imagePath"));
        }
        if self.name.trim().is_empty() {
            return Err(missing("name"));
        }

        let path = ImagePath::parse(&self.image_path)?;

        if self.retries > MAX_RETRIES {
            return Err(RemoteImagesError::ConfigError {
                message: format!(
                    "{mapping}: retries must be at most {MAX_RETRIES}, got {}",
                    self.retries
                ),
            });
        }
        if let Some(template) = &self.url_template {
            if !template.contains("{url}") {
                return Err(RemoteImagesError::ConfigError {
                    message: format!("{mapping}: urlTemplate must contain '{{url}}'"),
                });
            }
            if self.prepare_url.is_some() {
                return Err(RemoteImagesError::ConfigError {
                    message: format!("{mapping}: set either urlTemplate or prepareUrl, not both"),
                });
            }
        }

        Ok(path)
    }

    /// Arity of the output field.
    ///
    /// A field is a list when the `type` hint says so or when the path
    /// traverses an array; leaf arrays are never detected from the data.
    #[must_use]
    pub fn field_arity(&self, path: &ImagePath) -> FieldArity {
        if self.arity == FieldArity::Array || path.has_array_indicator() {
            FieldArity::Array
        } else {
            FieldArity::Object
        }
    }

    /// Fetch policy derived from this mapping.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            retries: self.retries,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            silent: self.silent,
            placeholder_on_failure: self.placeholder_on_failure,
            prepare_url: self
                .prepare_url
                .clone()
                .or_else(|| self.url_template.as_deref().map(url_template)),
            auth: self.auth.clone(),
            ext: self.ext.clone(),
        }
    }
}
