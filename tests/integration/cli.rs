use assert_cmd::Command;
use predicates::prelude::*;
use remote_images::artifact::{Artifact, ArtifactStore, MemoryArtifactStore};
use remote_images::cache::{AssociationCache, FieldValue, FileCacheStore};
use remote_images::constants::ARTIFACT_INDEX_FILE;
use remote_images::test_utils::fixtures;
use serde_json::{Value, json};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const PROXY_VARS: &[&str] =
    &["HTTP_PROXY", "http_proxy", "HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"];

struct Project {
    temp: TempDir,
}

impl Project {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn cache_dir(&self) -> PathBuf {
        self.path().join("cache")
    }

    fn write_config(&self, content: &str) -> PathBuf {
        fixtures::write_file(self.path(), "remote-images.toml", content)
    }

    fn write_sample_config(&self) -> PathBuf {
        self.write_config(&fixtures::sample_config(&self.cache_dir()))
    }

    fn write_records(&self, records: &Value) -> PathBuf {
        fixtures::write_file(self.path(), "records.json", &records.to_string())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("remote-images").unwrap();
        cmd.current_dir(self.path()).env_remove("RUST_LOG");
        for var in PROXY_VARS {
            cmd.env_remove(var);
        }
        cmd
    }
}

/// Answer `requests` HTTP requests with `body`, one connection each.
fn serve(body: &'static [u8], requests: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in listener.incoming().take(requests) {
            let mut stream = stream.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
        }
    });
    format!("http://{addr}")
}

#[test]
fn test_validate_valid_config() {
    let project = Project::new();
    project.write_sample_config();

    project
        .command()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Valid"))
        .stdout(predicate::str::contains("Article.localImage: File <- imageUrl"));
}

#[test]
fn test_validate_reports_array_fields() {
    let project = Project::new();
    let config = project.write_config(
        r#"[[images]]
nodeType = "Article"
imagePath = "sections[].cover.url"
name = "coverImages"
"#,
    );

    project
        .command()
        .args(["validate", "--format", "json", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""valid": true"#))
        .stdout(predicate::str::contains(r#""type": "[File]""#));
}

#[test]
fn test_validate_missing_image_path() {
    let project = Project::new();
    project.write_config(
        r#"[[images]]
nodeType = "Article"
"#,
    );

    project
        .command()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("imagePath"));
}

#[test]
fn test_validate_unknown_option() {
    let project = Project::new();
    project.write_config(
        r#"[[images]]
nodeType = "Article"
imagePath = "imageUrl"
imageUrl = "typo"
"#,
    );

    project
        .command()
        .args(["validate", "--format", "json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""valid": false"#));
}

#[test]
fn test_validate_missing_file() {
    let project = Project::new();

    project.command().arg("validate").assert().failure().stderr(predicate::str::contains("error"));
}

#[tokio::test]
async fn test_resolve_reads_existing_cache() {
    let project = Project::new();
    let config = project.write_sample_config();
    let records = project.write_records(&json!([
        {"id": "n1", "internal": {"type": "Article"}},
        {"id": "p1", "internal": {"type": "Page"}}
    ]));

    let cache_dir = project.cache_dir();
    let cache = AssociationCache::new(Arc::new(FileCacheStore::new(&cache_dir)));
    cache.record_artifacts("n1", "localImage", FieldValue::One("art-1".to_string())).await.unwrap();

    let store = MemoryArtifactStore::new();
    let mut artifact = Artifact::placeholder("art-1".to_string(), "n1", "digest".to_string());
    artifact.url = Some("https://x/y.png".to_string());
    store.create_node(artifact);
    store.persist(&cache_dir.join(ARTIFACT_INDEX_FILE)).await.unwrap();

    let output = project
        .command()
        .arg("resolve")
        .arg("--config")
        .arg(&config)
        .arg("--records")
        .arg(&records)
        .output()
        .unwrap();
    assert!(output.status.success());

    let resolved: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(resolved.as_array().unwrap().len(), 1);
    assert_eq!(resolved[0]["id"], "n1");
    assert_eq!(resolved[0]["fields"]["localImage"]["id"], "art-1");
    assert_eq!(resolved[0]["fields"]["localImage"]["url"], "https://x/y.png");
}

#[test]
fn test_resolve_without_cache_entries() {
    let project = Project::new();
    project.write_sample_config();
    let records = project.write_records(&json!([{"id": "n1", "internal": {"type": "Article"}}]));

    let output = project.command().arg("resolve").arg("-r").arg(&records).output().unwrap();
    assert!(output.status.success());

    let resolved: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(resolved[0]["fields"]["localImage"], Value::Null);
}

#[test]
fn test_process_rejects_non_array_records() {
    let project = Project::new();
    project.write_sample_config();
    let records = project.write_records(&json!({"id": "n1"}));

    project
        .command()
        .arg("process")
        .arg("-r")
        .arg(&records)
        .assert()
        .failure()
        .stderr(predicate::str::contains("records.json"));
}

#[test]
fn test_process_then_resolve() {
    let project = Project::new();
    let base = serve(b"\x89PNG\r\n\x1a\nfake", 1);
    project.write_sample_config();
    let records = project.write_records(&json!([
        {"id": "n1", "internal": {"type": "Article"}, "imageUrl": format!("{base}/cover")},
        {"id": "n2", "internal": {"type": "Article"}}
    ]));

    let output = project
        .command()
        .args(["process", "--format", "json", "-r"])
        .arg(&records)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let reports: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reports[0]["recordId"], "n1");
    assert_eq!(reports[0]["fetched"], 1);
    assert_eq!(reports[0]["ownersWritten"], 1);
    assert_eq!(reports[1]["urls"], 0);

    let downloads: Vec<_> = std::fs::read_dir(project.cache_dir().join("downloads"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(downloads.len(), 1);
    assert!(downloads[0].ends_with(".png"));

    let output = project.command().arg("resolve").arg("-r").arg(&records).output().unwrap();
    assert!(output.status.success());
    let resolved: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(resolved[0]["fields"]["localImage"]["url"], format!("{base}/cover.png"));
    assert_eq!(resolved[1]["fields"]["localImage"], Value::Null);
}
