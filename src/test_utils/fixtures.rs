//! Record and configuration fixtures.

use serde_json::{Value, json};
use std::path::{Path, PathBuf};

/// A record with `id`, `internal.type`, and the fields of `body`.
///
/// # Panics
///
/// Panics if `body` is not a JSON object.
#[must_use]
pub fn record(id: &str, node_type: &str, body: Value) -> Value {
    let Value::Object(mut fields) = body else {
        panic!("record body must be a JSON object");
    };
    fields.insert("id".to_string(), json!(id));
    fields.insert("internal".to_string(), json!({"type": node_type}));
    Value::Object(fields)
}

/// `{id, internal: {type: "Article"}, imageUrl}`.
#[must_use]
pub fn article(id: &str, image_url: &str) -> Value {
    record(id, "Article", json!({"imageUrl": image_url}))
}

/// An `Article` whose `nodes` children each carry an `id` and `imageUrl`.
#[must_use]
pub fn article_with_children(id: &str, children: &[(&str, &str)]) -> Value {
    let nodes: Vec<Value> = children
        .iter()
        .map(|(child_id, url)| json!({"id": child_id, "imageUrl": url}))
        .collect();
    record(id, "Article", json!({"nodes": nodes}))
}

/// A `Gallery` with a list of URLs under `imageUrls`.
#[must_use]
pub fn gallery(id: &str, urls: &[&str]) -> Value {
    record(id, "Gallery", json!({"imageUrls": urls}))
}

/// Configuration with one `Article.imageUrl` mapping and the cache under `cache_dir`.
#[must_use]
pub fn sample_config(cache_dir: &Path) -> String {
    format!(
        r#"[settings]
cacheDir = '{}'
maxParallel = 2

[[images]]
nodeType = "Article"
imagePath = "imageUrl"
ext = ".png"
silent = true
"#,
        cache_dir.display()
    )
}

/// Write `content` to `dir/name` and return the path.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
