//! Uploads authoring files to the object store and describes the result.

use std::io::Cursor;
use std::sync::Arc;

use lofty::prelude::*;
use lofty::probe::Probe;
use tokio::sync::Semaphore;

use crate::app::object_store::ObjectStore;
use crate::authoring::FileUpload;
use crate::error::{CatalogError, Result};
use crate::model::{FileAsset, MediaKind};

pub const THUMBNAIL_NAMESPACE: &str = "thumbnails";
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 8;

#[derive(Clone)]
pub struct AssetUploader {
    store: Arc<dyn ObjectStore>,
    permits: Arc<Semaphore>,
}

impl AssetUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_max_concurrency(store, DEFAULT_MAX_CONCURRENT_UPLOADS)
    }

    pub fn with_max_concurrency(store: Arc<dyn ObjectStore>, max_concurrency: usize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Stores a lesson or profile file under the namespace of its media kind.
    pub async fn store(&self, file: &FileUpload) -> Result<FileAsset> {
        let kind = MediaKind::from_content_type(&file.content_type).ok_or_else(|| {
            CatalogError::UnsupportedAssetType {
                file_name: file.file_name.clone(),
                content_type: file.content_type.clone(),
            }
        })?;

        let path = object_path(kind.namespace(), &file.file_name);
        let url = self.put(&path, file).await?;

        let duration = if kind.is_timed() {
            probe_duration(file.data.clone()).await
        } else {
            None
        };

        tracing::info!(%path, ?kind, bytes = file.data.len(), ?duration, "stored asset");
        Ok(FileAsset {
            url,
            kind,
            file_name: file.file_name.clone(),
            duration,
        })
    }

    /// Stores a degree or course thumbnail and returns its URL.
    pub async fn store_thumbnail(&self, file: &FileUpload) -> Result<String> {
        let path = object_path(THUMBNAIL_NAMESPACE, &file.file_name);
        let url = self.put(&path, file).await?;
        tracing::info!(%path, bytes = file.data.len(), "stored thumbnail");
        Ok(url)
    }

    async fn put(&self, path: &str, file: &FileUpload) -> Result<String> {
        let upload_failure = |source: anyhow::Error| CatalogError::UploadFailure {
            file_name: file.file_name.clone(),
            source,
        };

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|err| upload_failure(anyhow::Error::new(err)))?;
        self.store
            .put(path, file.data.clone(), &file.content_type)
            .await
            .map_err(upload_failure)?;
        self.store.public_url(path).await.map_err(upload_failure)
    }
}

/// `<namespace>/<token>_<file name>`; the token keeps repeated uploads of the
/// same file name apart.
fn object_path(namespace: &str, file_name: &str) -> String {
    let base_name = file_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or("file");
    format!(
        "{namespace}/{token}_{base_name}",
        token = uuid::Uuid::new_v4().simple()
    )
}

/// Reads the media duration in seconds. Any failure yields `None`.
async fn probe_duration(bytes: Vec<u8>) -> Option<f64> {
    let probed = tokio::task::spawn_blocking(move || -> anyhow::Result<f64> {
        let tagged_file = Probe::new(Cursor::new(bytes)).guess_file_type()?.read()?;
        Ok(tagged_file.properties().duration().as_secs_f64())
    })
    .await;

    match probed {
        Ok(Ok(seconds)) if seconds > 0.0 => Some(seconds),
        Ok(Ok(_)) => None,
        Ok(Err(err)) => {
            tracing::debug!(?err, "could not read media duration");
            None
        }
        Err(err) => {
            tracing::warn!(?err, "duration probe task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::app::object_store::InMemoryObjectStore;

    struct BrokenStore;

    #[async_trait]
    impl ObjectStore for BrokenStore {
        async fn put(&self, _path: &str, _bytes: Vec<u8>, _ct: &str) -> anyhow::Result<()> {
            anyhow::bail!("bucket unavailable")
        }

        async fn public_url(&self, path: &str) -> anyhow::Result<String> {
            Ok(path.to_string())
        }
    }

    #[tokio::test]
    async fn unsupported_type_fails_without_writing() {
        let store = Arc::new(InMemoryObjectStore::new());
        let uploader = AssetUploader::new(store.clone());

        let err = uploader
            .store(&FileUpload::new("notes.zip", "application/zip", b"PK".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::UnsupportedAssetType { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn stores_under_kind_namespace_with_unique_names() -> anyhow::Result<()> {
        let store = Arc::new(InMemoryObjectStore::new());
        let uploader = AssetUploader::new(store.clone());
        let file = FileUpload::new("syllabus.pdf", "application/pdf", b"%PDF-1.4".to_vec());

        let first = uploader.store(&file).await?;
        let second = uploader.store(&file).await?;

        assert_eq!(first.kind, MediaKind::Document);
        assert_eq!(first.file_name, "syllabus.pdf");
        assert_eq!(first.duration, None);
        assert_ne!(first.url, second.url);

        let paths = store.paths();
        assert_eq!(paths.len(), 2);
        for path in paths {
            assert!(path.starts_with("documents/"));
            assert!(path.ends_with("_syllabus.pdf"));
            assert_eq!(store.get(&path).unwrap().content_type, "application/pdf");
        }
        Ok(())
    }

    /// Mono 16-bit PCM WAV of silence.
    fn silent_wav(sample_rate: u32, seconds: u32) -> Vec<u8> {
        let data_len = sample_rate * seconds * 2;
        let mut wav = Vec::with_capacity(44 + data_len as usize);
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        wav.resize(44 + data_len as usize, 0);
        wav
    }

    #[tokio::test]
    async fn timed_media_gets_probed_duration() -> anyhow::Result<()> {
        let store = Arc::new(InMemoryObjectStore::new());
        let uploader = AssetUploader::new(store.clone());

        let asset = uploader
            .store(&FileUpload::new("chant.wav", "audio/wav", silent_wav(8_000, 2)))
            .await?;

        assert_eq!(asset.kind, MediaKind::Audio);
        let seconds = asset.duration.expect("duration for audio");
        assert!((seconds - 2.0).abs() < 0.05, "duration {seconds}");
        assert!(store.paths()[0].starts_with("audios/"));
        Ok(())
    }

    #[tokio::test]
    async fn undecodable_video_still_uploads_without_duration() -> anyhow::Result<()> {
        let store = Arc::new(InMemoryObjectStore::new());
        let uploader = AssetUploader::new(store.clone());

        let asset = uploader
            .store(&FileUpload::new("intro.mp4", "video/mp4", b"not really mp4".to_vec()))
            .await?;

        assert_eq!(asset.kind, MediaKind::Video);
        assert_eq!(asset.duration, None);
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn thumbnails_use_fixed_namespace() -> anyhow::Result<()> {
        let store = Arc::new(InMemoryObjectStore::new());
        let uploader = AssetUploader::new(store.clone());

        let url = uploader
            .store_thumbnail(&FileUpload::new("cover.png", "image/png", vec![1, 2, 3]))
            .await?;

        assert!(url.starts_with("memory://thumbnails/"));
        assert!(url.ends_with("_cover.png"));
        Ok(())
    }

    #[tokio::test]
    async fn object_store_failure_is_upload_failure() {
        let uploader = AssetUploader::new(Arc::new(BrokenStore));
        let err = uploader
            .store(&FileUpload::new("a.png", "image/png", vec![0]))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::UploadFailure { .. }));
    }

    #[test]
    fn object_path_drops_directories_from_file_name() {
        let path = object_path("images", "../../etc/passwd");
        assert!(path.starts_with("images/"));
        assert!(path.ends_with("_passwd"));
        assert!(!path.contains(".."));
    }
}
