//! Path expressions into nested records.
//!
//! A path expression is a dotted property path in which `[].` marks "for each
//! element of the sequence here, continue with the rest of the path":
//!
//! ```text
//! imageUrl                  -> record.imageUrl
//! cover.image.url           -> record.cover.image.url
//! nodes[].imageUrl          -> record.nodes[*].imageUrl
//! sections[].cards[].img    -> record.sections[*].cards[*].img
//! ```
//!
//! Parsing turns the expression into an ordered list of [`Step`]s: every
//! step except the last is an [`Step::Expand`] over a sequence, the last one
//! is the [`Step::Leaf`] whose value(s) are URLs. Evaluation is an explicit
//! recursion over `(step index, current value, current anchor)`; it never
//! infers array-ness from the shape of a leaf. Leaf sequences are expanded
//! only when the mapping declares [`FieldArity::Array`].
//!
//! Each resolved URL is paired with the record it should be attached to
//! (its *owner*):
//!
//! - without an array indicator, the root record;
//! - under an array indicator, the array element, or for a compound leaf
//!   such as `image.url`, the object holding the leaf (`element.image`);
//! - when that candidate has no `id`, the nearest enclosing record that does.
//!
//! Missing properties are not errors; they resolve to "no URL" for that branch.

use crate::constants::ARRAY_INDICATOR;
use crate::core::{FieldArity, RemoteImagesError, record_id};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;


/// One step of a parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Dotted path whose value must be a sequence; every element continues
    /// with the next step.
    Expand(String),
    /// Final dotted path whose value (or values, in array mode) are URLs.
    Leaf(String),
}

impl Step {
    /// The dotted property path of this step.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Expand(path) | Self::Leaf(path) => path,
        }
    }
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePath {
    raw: String,
    steps: Vec<Step>,
}

/// URLs produced by evaluating an [`ImagePath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedUrls {
    /// Plain path in object mode: at most one URL.
    Single(Option<String>),
    /// Array indicator traversed or leaf sequence expanded. Entries that did
    /// not resolve to a string are kept as `None` so positions line up with
    /// the owner list.
    Many(Vec<Option<String>>),
}

/// Result of [`ImagePath::resolve`]: URLs plus their owners, positionally.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    /// Resolved URL(s)
    pub urls: ResolvedUrls,
    /// Owner of each URL; same length as the URL list (one for `Single`)
    pub owners: Vec<&'a Value>,
}

impl<'a> Resolution<'a> {
    /// `(url, owner)` pairs in source order.
    #[must_use]
    pub fn targets(&self) -> Vec<(Option<&str>, &'a Value)> {
        match &self.urls {
            ResolvedUrls::Single(url) => {
                self.owners.iter().map(|owner| (url.as_deref(), *owner)).take(1).collect()
            }
            ResolvedUrls::Many(urls) => urls
                .iter()
                .zip(self.owners.iter())
                .map(|(url, owner)| (url.as_deref(), *owner))
                .collect(),
        }
    }

    /// Number of positions that resolved to a URL.
    #[must_use]
    pub fn url_count(&self) -> usize {
        match &self.urls {
            ResolvedUrls::Single(url) => usize::from(url.is_some()),
            ResolvedUrls::Many(urls) => urls.iter().filter(|url| url.is_some()).count(),
        }
    }
}

impl ImagePath {
    /// Parse a path expression.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteImagesError::InvalidImagePath`] for an empty expression,
    /// an empty segment (`a[].[].b`, trailing `[].`), an empty property name
    /// (`a..b`), or a bare `[]` not followed by `.`.
    pub fn parse(raw: &str) -> Result<Self, RemoteImagesError> {
        let invalid = |reason: String| RemoteImagesError::InvalidImagePath {
            path: raw.to_string(),
            reason,
        };

        if raw.trim().is_empty() {
            return Err(invalid("path is empty".to_string()));
        }

        let parts: Vec<&str> = raw.split(ARRAY_INDICATOR).collect();
        let last = parts.len() - 1;
        let mut steps = Vec::with_capacity(parts.len());

        for (index, part) in parts.into_iter().enumerate() {
            if part.is_empty() {
                return Err(invalid(format!("segment {index} is empty")));
            }
            if part.contains("[]") {
                return Err(invalid(format!("'[]' in '{part}' must be followed by '.'")));
            }
            if part.split('.').any(str::is_empty) {
                return Err(invalid(format!("'{part}' contains an empty property name")));
            }

            let path = part.to_string();
            steps.push(if index == last {
                Step::Leaf(path)
            } else {
                Step::Expand(path)
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            steps,
        })
    }

    /// The expression as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed steps, the last one always a [`Step::Leaf`].
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Whether the expression traverses at least one sequence.
    #[must_use]
    pub fn has_array_indicator(&self) -> bool {
        self.steps.len() > 1
    }

    /// Evaluate the expression against `record`.
    ///
    /// `ext` is appended once to each string leaf, never to intermediate
    /// values. `arity` decides whether a leaf sequence is expanded
    /// ([`FieldArity::Array`]) or treated as a non-URL value.
    #[must_use]
    pub fn resolve<'a>(
        &self,
        record: &'a Value,
        ext: Option<&str>,
        arity: FieldArity,
    ) -> Resolution<'a> {
        if let [Step::Leaf(path)] = self.steps.as_slice() {
            let leaf = lookup(record, path);
            return match arity {
                FieldArity::Object => Resolution {
                    urls: ResolvedUrls::Single(leaf.and_then(|value| leaf_url(value, ext))),
                    owners: vec![record],
                },
                FieldArity::Array => {
                    let urls = expand_leaf(leaf, ext);
                    let owners = vec![record; urls.len()];
                    Resolution {
                        urls: ResolvedUrls::Many(urls),
                        owners,
                    }
                }
            };
        }

        let mut found = Vec::new();
        self.collect(0, record, record, ext, arity, &mut found);
        let (urls, owners): (Vec<_>, Vec<_>) = found.into_iter().unzip();
        Resolution {
            urls: ResolvedUrls::Many(urls),
            owners,
        }
    }

    fn collect<'a>(
        &self,
        index: usize,
        value: &'a Value,
        anchor: &'a Value,
        ext: Option<&str>,
        arity: FieldArity,
        found: &mut Vec<(Option<String>, &'a Value)>,
    ) {
        match &self.steps[index] {
            Step::Expand(path) => {
                let Some(Value::Array(items)) = lookup(value, path) else {
                    tracing::debug!("No sequence at '{}' while resolving '{}'", path, self.raw);
                    return;
                };
                for item in items {
                    let anchor = if record_id(item).is_some() {
                        item
                    } else {
                        anchor
                    };
                    self.collect(index + 1, item, anchor, ext, arity, found);
                }
            }
            Step::Leaf(path) => {
                let owner = owner_for(value, path, anchor);
                let leaf = lookup(value, path);
                match arity {
                    FieldArity::Object => {
                        found.push((leaf.and_then(|value| leaf_url(value, ext)), owner));
                    }
                    FieldArity::Array => {
                        found.extend(expand_leaf(leaf, ext).into_iter().map(|url| (url, owner)));
                    }
                }
            }
        }
    }
}

impl FromStr for ImagePath {
    type Err = RemoteImagesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Dotted property lookup. Numeric components index into sequences.
///
/// Returns `None` as soon as a component is missing.
#[must_use]
pub fn lookup<'a>(value: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted.split('.').try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

/// A string leaf with the extension appended; anything else is not a URL.
fn leaf_url(value: &Value, ext: Option<&str>) -> Option<String> {
    let url = value.as_str().filter(|url| !url.is_empty())?;
    Some(match ext {
        Some(ext) => format!("{url}{ext}"),
        None => url.to_string(),
    })
}

/// Array-mode leaf: each element of a sequence, or nothing for a non-sequence.
fn expand_leaf(leaf: Option<&Value>, ext: Option<&str>) -> Vec<Option<String>> {
    match leaf {
        Some(Value::Array(items)) => items.iter().map(|item| leaf_url(item, ext)).collect(),
        _ => Vec::new(),
    }
}

fn owner_for<'a>(element: &'a Value, leaf: &str, anchor: &'a Value) -> &'a Value {
    let candidate = match leaf.rsplit_once('.') {
        Some((parent, _)) => lookup(element, parent),
        None => Some(element),
    };
    match candidate {
        Some(candidate) if record_id(candidate).is_some() => candidate,
        _ => anchor,
    }
}
