//! HTTP implementation of [`FetchAndRegister`] on top of `reqwest`.

use super::{FetchAndRegister, FetchRequest};
use crate::artifact::{Artifact, ArtifactInternal, ArtifactStore, NodeIdFactory, content_digest};
use crate::constants::FILE_NODE_TYPE;
use crate::core::RemoteImagesError;
use crate::utils::fs::atomic_write;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use std::path::PathBuf;
use std::sync::Arc;

/// Downloads images over HTTP into a directory and registers them.
///
/// Files are named `<sha256><ext>`, so identical content is stored once.
/// Artifact ids are derived from the owner id and URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    download_dir: PathBuf,
    artifacts: Arc<dyn ArtifactStore>,
    ids: NodeIdFactory,
}

impl HttpFetcher {
    /// Create a fetcher writing into `download_dir`.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(
        download_dir: impl Into<PathBuf>,
        artifacts: Arc<dyn ArtifactStore>,
        user_agent: &str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(client, download_dir, artifacts))
    }

    /// Create a fetcher around an already configured client.
    pub fn with_client(
        client: reqwest::Client,
        download_dir: impl Into<PathBuf>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            client,
            download_dir: download_dir.into(),
            artifacts,
            ids: NodeIdFactory::default(),
        }
    }

    fn failed(url: &str, reason: impl Into<String>) -> RemoteImagesError {
        RemoteImagesError::FetchFailed {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl FetchAndRegister for HttpFetcher {
    async fn fetch_and_register(&self, request: FetchRequest<'_>) -> Result<Artifact> {
        tracing::debug!("GET {}", request.url);

        let mut builder = self.client.get(request.url);
        if let Some(user) = &request.auth.htaccess_user {
            builder = builder.basic_auth(user, request.auth.htaccess_pass.as_deref());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::failed(request.url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::failed(request.url, format!("HTTP {status}")).into());
        }

        let header_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::failed(request.url, e.to_string()))?;

        let digest = content_digest(&body);
        let ext = request.ext.map(str::to_string).or_else(|| extension_from_url(request.url));
        let path = self.download_dir.join(format!("{digest}{}", ext.as_deref().unwrap_or_default()));

        let size = body.len() as u64;
        let target = path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&target, &body))
            .await
            .context("Failed to spawn blocking task for download write")??;

        let media_type =
            header_type.or_else(|| ext.as_deref().and_then(guess_media_type).map(str::to_string));

        let artifact = Artifact {
            id: self.ids.create_node_id(&format!("{} >>> {}", request.parent_node_id, request.url)),
            parent: request.parent_node_id.to_string(),
            url: Some(request.url.to_string()),
            name: Some(digest.clone()),
            ext,
            absolute_path: Some(path),
            size,
            fetched_at: Utc::now(),
            internal: ArtifactInternal {
                kind: FILE_NODE_TYPE.to_string(),
                media_type,
                content_digest: digest,
            },
        };

        self.artifacts.create_node(artifact.clone());
        Ok(artifact)
    }
}

/// Extension (with leading dot) of the last URL path segment, if it looks like one.
fn extension_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    let plausible = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    plausible.then(|| format!(".{}", ext.to_ascii_lowercase()))
}

fn guess_media_type(ext: &str) -> Option<&'static str> {
    let media_type = match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        _ => return None,
    };
    Some(media_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemoryArtifactStore;
    use crate::fetch::Auth;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn local_fetcher(dir: &std::path::Path, store: Arc<MemoryArtifactStore>) -> HttpFetcher {
        let client = reqwest::Client::builder()
            .user_agent("remote-images-test")
            .no_proxy()
            .build()
            .unwrap();
        HttpFetcher::with_client(client, dir, store)
    }

    /// Serve a single canned response and hand back the raw request.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request: Vec<u8> = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn test_downloads_and_registers_artifact() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 4\r\nConnection: close\r\n\r\nabcd",
        )
        .await;
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryArtifactStore::new());
        let fetcher = local_fetcher(temp.path(), store.clone());

        let url = format!("{base}/images/cat.png");
        let auth = Auth {
            htaccess_user: Some("user".to_string()),
            htaccess_pass: Some("secret".to_string()),
            ..Auth::default()
        };
        let artifact = fetcher
            .fetch_and_register(FetchRequest {
                url: &url,
                parent_node_id: "n1",
                auth: &auth,
                ext: None,
            })
            .await
            .unwrap();

        assert_eq!(artifact.parent, "n1");
        assert_eq!(artifact.size, 4);
        assert_eq!(artifact.ext.as_deref(), Some(".png"));
        assert_eq!(artifact.internal.media_type.as_deref(), Some("image/png"));
        assert_eq!(artifact.internal.content_digest, content_digest("abcd"));
        let path = artifact.absolute_path.clone().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"abcd");
        assert_eq!(store.get_node_by_id(&artifact.id), Some(artifact));

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.contains("authorization: basic "));
        assert!(request.contains("user-agent: remote-images-test"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_failure() {
        let (base, server) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryArtifactStore::new());
        let fetcher = local_fetcher(temp.path(), store.clone());

        let url = format!("{base}/missing.jpg");
        let err = fetcher
            .fetch_and_register(FetchRequest {
                url: &url,
                parent_node_id: "n1",
                auth: &Auth::default(),
                ext: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RemoteImagesError>(),
            Some(RemoteImagesError::FetchFailed { .. })
        ));
        assert!(store.is_empty());
        server.await.unwrap();
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(extension_from_url("https://x/a/b.JPG?w=1"), Some(".jpg".to_string()));
        assert_eq!(extension_from_url("https://x/a/b"), None);
        assert_eq!(extension_from_url("https://x/a/b.tar-gz"), None);
        assert_eq!(extension_from_url("not a url"), None);
    }

    #[test]
    fn test_guess_media_type() {
        assert_eq!(guess_media_type(".jpeg"), Some("image/jpeg"));
        assert_eq!(guess_media_type("webp"), Some("image/webp"));
        assert_eq!(guess_media_type(".bin"), None);
    }
}

