use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::app::document_store::{DocumentStore, LocalFsDocumentStore};
use crate::app::object_store::{GcsObjectStore, LocalFsObjectStore, ObjectStore};

pub const DEFAULT_PUBLIC_OBJECT_BASE_URL: &str = "/objects";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectBackend {
    Local,
    Gcs,
}

impl ObjectBackend {
    pub fn from_env() -> anyhow::Result<Self> {
        let raw = std::env::var("LECTERN_OBJECT_BACKEND").unwrap_or_else(|_| "local".to_string());
        Self::parse(&raw).with_context(|| {
            format!("invalid LECTERN_OBJECT_BACKEND={raw:?}. expected one of: local, gcs")
        })
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "local" => Ok(Self::Local),
            "gcs" => Ok(Self::Gcs),
            other => anyhow::bail!("unsupported object backend: {other}"),
        }
    }
}

/// Storage wiring shared by the CLI and the HTTP app.
pub struct Backends {
    pub documents: Arc<dyn DocumentStore>,
    pub objects: Arc<dyn ObjectStore>,
    /// Set when objects live on local disk and must be served by the app.
    pub local_objects: Option<LocalFsObjectStore>,
}

impl Backends {
    pub fn from_env(data_dir: &Path) -> anyhow::Result<Self> {
        let documents: Arc<dyn DocumentStore> = Arc::new(LocalFsDocumentStore::new(data_dir));

        match ObjectBackend::from_env()? {
            ObjectBackend::Local => {
                let base_url = env_non_empty("LECTERN_PUBLIC_OBJECT_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_PUBLIC_OBJECT_BASE_URL.to_string());
                validate_base_url(&base_url)?;
                tracing::info!(
                    data_dir = %data_dir.display(),
                    %base_url,
                    "using local object store"
                );
                let store = LocalFsObjectStore::new(data_dir, base_url);
                Ok(Self {
                    documents,
                    objects: Arc::new(store.clone()),
                    local_objects: Some(store),
                })
            }
            ObjectBackend::Gcs => {
                let bucket = env_non_empty("LECTERN_GCS_BUCKET")
                    .context("LECTERN_GCS_BUCKET is required for the gcs object backend")?;
                let mut store = GcsObjectStore::new(bucket.clone());
                if let Some(token) = env_non_empty("LECTERN_GCS_ACCESS_TOKEN") {
                    store = store.with_access_token(token);
                }
                tracing::info!(%bucket, "using gcs object store");
                Ok(Self {
                    documents,
                    objects: Arc::new(store),
                    local_objects: None,
                })
            }
        }
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts an absolute URL or an absolute path such as `/objects`.
pub fn validate_base_url(raw: &str) -> anyhow::Result<()> {
    if raw.starts_with('/') {
        return Ok(());
    }
    let url = url::Url::parse(raw).with_context(|| format!("invalid object base url: {raw}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("object base url must be http(s): {raw}");
    }
    Ok(())
}
