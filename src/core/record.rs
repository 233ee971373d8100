//! Accessors for the externally owned records this crate reads.
//!
//! Records are plain `serde_json::Value` trees. The host gives every
//! top-level record a string `id` and a type tag under `internal.type`;
//! nested sub-records may or may not carry an `id` of their own.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Leaf arity of a field mapping (the `type` option).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldArity {
    /// One URL per owner, one artifact per field.
    #[default]
    Object,
    /// The leaf value is itself a sequence of URLs.
    Array,
}

impl fmt::Display for FieldArity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => write!(f, "object"),
            Self::Array => write!(f, "array"),
        }
    }
}

/// Returns the record's `id` when it is a non-empty string.
#[must_use]
pub fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())
}

/// Returns the record's type tag (`internal.type`).
#[must_use]
pub fn record_type(record: &Value) -> Option<&str> {
    record.get("internal").and_then(|internal| internal.get("type")).and_then(Value::as_str)
}
