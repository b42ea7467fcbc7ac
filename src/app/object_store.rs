use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()>;
    async fn public_url(&self, path: &str) -> anyhow::Result<String>;
}

/// Objects on local disk, served by the app under `public_base_url`.
#[derive(Debug, Clone)]
pub struct LocalFsObjectStore {
    base_dir: PathBuf,
    public_base_url: String,
}

impl LocalFsObjectStore {
    pub fn new(base_dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.base_dir.join("objects")
    }

    fn object_path(&self, path: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            anyhow::bail!("object path must be relative without '..': {path}");
        }
        Ok(self.objects_dir().join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalFsObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> anyhow::Result<()> {
        let target = self.object_path(path)?;
        let parent = target
            .parent()
            .ok_or_else(|| anyhow::anyhow!("object path has no parent: {}", target.display()))?;
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create object dir: {}", parent.display()))?;

        let tmp_path = target.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp_path, &bytes)
            .await
            .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &target)
            .await
            .with_context(|| format!("rename tmp to final: {}", target.display()))?;
        Ok(())
    }

    async fn public_url(&self, path: &str) -> anyhow::Result<String> {
        self.object_path(path)?;
        Ok(format!(
            "{}/{}",
            self.public_base_url,
            percent_encode_path(path)
        ))
    }
}

pub const GCS_DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Google Cloud Storage through the JSON API, with publicly readable objects.
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    bucket: String,
    endpoint: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl GcsObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint: GCS_DEFAULT_ENDPOINT.to_string(),
            access_token: None,
            client: reqwest::Client::new(),
        }
    }

    /// Overrides the storage endpoint (emulators, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Uses a fixed bearer token instead of asking the GCE metadata server.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        if let Some(token) = &self.access_token {
            return Ok(token.clone());
        }

        #[derive(Debug, serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let url = concat!(
            "http://metadata.google.internal",
            "/computeMetadata/v1/instance/service-accounts/default/token"
        );
        let resp = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("request metadata access token")?;
        if !resp.status().is_success() {
            anyhow::bail!("metadata token request failed ({})", resp.status());
        }
        let token: TokenResponse = resp.json().await.context("parse metadata token json")?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        let access_token = self.access_token().await.context("get access token")?;
        let url = format!(
            "{endpoint}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={name}",
            endpoint = self.endpoint,
            bucket = percent_encode_rfc3986(&self.bucket),
            name = percent_encode_rfc3986(path),
        );

        tracing::debug!(
            bucket = %self.bucket,
            object = %path,
            bytes = bytes.len(),
            "uploading object to gcs"
        );
        let resp = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .context("upload object to gcs")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("gcs upload failed ({status}): {body}");
        }
        Ok(())
    }

    async fn public_url(&self, path: &str) -> anyhow::Result<String> {
        Ok(format!(
            "{}/{}/{}",
            self.endpoint,
            percent_encode_rfc3986(&self.bucket),
            percent_encode_path(path)
        ))
    }
}

/// Keeps objects in memory. URLs use the `memory://` scheme.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn get(&self, path: &str) -> Option<StoredObject> {
        self.lock().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        self.lock().insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn public_url(&self, path: &str) -> anyhow::Result<String> {
        if !self.lock().contains_key(path) {
            anyhow::bail!("no such object: {path}");
        }
        Ok(format!("memory://{path}"))
    }
}

fn percent_encode_rfc3986(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        let is_unreserved = matches!(
            b,
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~'
        );
        if is_unreserved {
            out.push(b as char);
        } else {
            out.push('%');
            out.push_str(&format!("{b:02X}"));
        }
    }
    out
}

fn percent_encode_path(path: &str) -> String {
    path.split('/')
        .map(percent_encode_rfc3986)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encode_rfc3986_encodes_reserved_chars() {
        assert_eq!(percent_encode_rfc3986("a b"), "a%20b");
        assert_eq!(percent_encode_rfc3986("videos/x.mp4"), "videos%2Fx.mp4");
        assert_eq!(percent_encode_rfc3986("~"), "~");
    }

    #[test]
    fn percent_encode_path_preserves_slash_separators() {
        assert_eq!(percent_encode_path("videos/my clip.mp4"), "videos/my%20clip.mp4");
    }

    #[tokio::test]
    async fn local_fs_put_writes_under_objects_dir() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalFsObjectStore::new(dir.path(), "/objects/");
        store
            .put("thumbnails/abc_cover.png", b"png".to_vec(), "image/png")
            .await?;

        let written = std::fs::read(dir.path().join("objects/thumbnails/abc_cover.png"))?;
        assert_eq!(written, b"png");
        assert_eq!(
            store.public_url("thumbnails/abc_cover.png").await?,
            "/objects/thumbnails/abc_cover.png"
        );
        Ok(())
    }

    #[tokio::test]
    async fn local_fs_rejects_parent_segments() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path(), "/objects");
        let err = store
            .put("../escape.txt", b"x".to_vec(), "text/plain")
            .await
            .unwrap_err();
        assert!(err.to_string().contains(".."));
    }

    #[tokio::test]
    async fn gcs_public_url_points_at_bucket_object() -> anyhow::Result<()> {
        let store = GcsObjectStore::new("lectern-media").with_access_token("t");
        assert_eq!(
            store.public_url("videos/abc_intro clip.mp4").await?,
            "https://storage.googleapis.com/lectern-media/videos/abc_intro%20clip.mp4"
        );
        Ok(())
    }
}
