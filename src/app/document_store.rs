use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;

use crate::error::StoreError;

/// A document as held by the store. `revision` starts at 1 and grows by one
/// on every write.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub revision: u64,
    pub data: Value,
}

/// Document database gateway. Writes accept an optional expected revision;
/// a mismatch fails with [`StoreError::Conflict`] and leaves the stored
/// document untouched.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<StoredDocument, StoreError>;

    /// All documents of `collection`, ordered by id.
    async fn get_all(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError>;

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StoreError>;

    /// Merges the top-level fields of `patch` into the document.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
        expected_revision: Option<u64>,
    ) -> Result<u64, StoreError>;

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_revision: Option<u64>,
    ) -> Result<u64, StoreError>;

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let docs = self.get_all(collection).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| doc.data.get(field) == Some(value))
            .collect())
    }

    async fn query_by_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let docs = self.get_all(collection).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| {
                doc.data
                    .get(field)
                    .and_then(Value::as_array)
                    .is_some_and(|items| items.contains(value))
            })
            .collect())
    }

    async fn delete_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<usize, StoreError> {
        let matching = self.query_by_field(collection, field, value).await?;
        let mut deleted = 0;
        for doc in matching {
            if self.delete_by_id(collection, &doc.id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

fn check_revision(
    collection: &str,
    id: &str,
    actual: u64,
    expected: Option<u64>,
) -> Result<(), StoreError> {
    match expected {
        Some(expected) if expected != actual => Err(StoreError::Conflict {
            collection: collection.to_string(),
            id: id.to_string(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

fn merge_patch(data: &mut Value, patch: Map<String, Value>) -> Result<(), StoreError> {
    let Value::Object(fields) = data else {
        return Err(StoreError::Backend(anyhow::anyhow!(
            "cannot patch a non-object document"
        )));
    };
    fields.extend(patch);
    Ok(())
}

fn missing(collection: &str, id: &str) -> StoreError {
    StoreError::Missing {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    revision: u64,
    data: Value,
}

/// One JSON file per document under `<base_dir>/collections/<collection>/`.
#[derive(Debug)]
pub struct LocalFsDocumentStore {
    base_dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl LocalFsDocumentStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn collection_dir(&self, collection: &str) -> anyhow::Result<PathBuf> {
        ensure_safe_segment(collection)?;
        Ok(self.base_dir.join("collections").join(collection))
    }

    fn document_path(&self, collection: &str, id: &str) -> anyhow::Result<PathBuf> {
        ensure_safe_segment(id)?;
        Ok(self.collection_dir(collection)?.join(format!("{id}.json")))
    }

    /// Ids outside `[A-Za-z0-9_-]` are never written, so they read as absent.
    async fn load(&self, collection: &str, id: &str) -> Result<Option<Envelope>, StoreError> {
        if !is_safe_segment(id) {
            return Ok(None);
        }
        let path = self.document_path(collection, id)?;
        let envelope = read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?;
        Ok(envelope)
    }

    async fn store(
        &self,
        collection: &str,
        id: &str,
        envelope: &Envelope,
    ) -> Result<(), StoreError> {
        let path = self.document_path(collection, id)?;
        write_json_atomic(&path, envelope)
            .await
            .with_context(|| format!("write document: {}", path.display()))?;
        tracing::debug!(collection, id, revision = envelope.revision, "document written");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for LocalFsDocumentStore {
    async fn create(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<StoredDocument, StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.load(collection, id).await?.is_some() {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        let envelope = Envelope { revision: 1, data };
        self.store(collection, id, &envelope).await?;
        Ok(StoredDocument {
            id: id.to_string(),
            revision: envelope.revision,
            data: envelope.data,
        })
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let dir = self.collection_dir(collection)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("read dir: {}", dir.display()))
                    .into());
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("list dir: {}", dir.display()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();

        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(envelope) = self.load(collection, &id).await? {
                docs.push(StoredDocument {
                    id,
                    revision: envelope.revision,
                    data: envelope.data,
                });
            }
        }
        Ok(docs)
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self
            .load(collection, id)
            .await?
            .map(|envelope| StoredDocument {
                id: id.to_string(),
                revision: envelope.revision,
                data: envelope.data,
            }))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
        expected_revision: Option<u64>,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut envelope = self
            .load(collection, id)
            .await?
            .ok_or_else(|| missing(collection, id))?;
        check_revision(collection, id, envelope.revision, expected_revision)?;
        merge_patch(&mut envelope.data, patch)?;
        envelope.revision += 1;
        self.store(collection, id, &envelope).await?;
        Ok(envelope.revision)
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_revision: Option<u64>,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .load(collection, id)
            .await?
            .ok_or_else(|| missing(collection, id))?;
        check_revision(collection, id, current.revision, expected_revision)?;
        let envelope = Envelope {
            revision: current.revision + 1,
            data,
        };
        self.store(collection, id, &envelope).await?;
        Ok(envelope.revision)
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        if !is_safe_segment(id) {
            return Ok(false);
        }
        let _guard = self.write_lock.lock().await;
        let path = self.document_path(collection, id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("remove: {}", path.display()))
                .into()),
        }
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn ensure_safe_segment(segment: &str) -> anyhow::Result<()> {
    if !is_safe_segment(segment) {
        anyhow::bail!("invalid collection or document id: {segment:?}");
    }
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

type Collections = BTreeMap<String, BTreeMap<String, (u64, Value)>>;

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: Mutex<Collections>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<StoredDocument, StoreError> {
        let mut collections = self.lock();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        docs.insert(id.to_string(), (1, data.clone()));
        Ok(StoredDocument {
            id: id.to_string(),
            revision: 1,
            data,
        })
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self
            .lock()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, (revision, data))| StoredDocument {
                        id: id.clone(),
                        revision: *revision,
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self
            .lock()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|(revision, data)| StoredDocument {
                id: id.to_string(),
                revision: *revision,
                data: data.clone(),
            }))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
        expected_revision: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut collections = self.lock();
        let (revision, data) = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| missing(collection, id))?;
        check_revision(collection, id, *revision, expected_revision)?;
        merge_patch(data, patch)?;
        *revision += 1;
        Ok(*revision)
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_revision: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut collections = self.lock();
        let (revision, stored) = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| missing(collection, id))?;
        check_revision(collection, id, *revision, expected_revision)?;
        *stored = data;
        *revision += 1;
        Ok(*revision)
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .get_mut(collection)
            .is_some_and(|docs| docs.remove(id).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn exercise_store(store: &dyn DocumentStore) -> anyhow::Result<()> {
        store
            .create("users", "u1", json!({"email": "a@x.io", "degrees": ["d1", "d2"]}))
            .await?;
        store
            .create("users", "u2", json!({"email": "b@x.io", "degrees": ["d2"]}))
            .await?;

        let by_email = store
            .query_by_field("users", "email", &json!("b@x.io"))
            .await?;
        assert_eq!(by_email.len(), 1);
        assert_eq!(by_email[0].id, "u2");

        let holders = store
            .query_by_array_contains("users", "degrees", &json!("d2"))
            .await?;
        assert_eq!(
            holders.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            vec!["u1", "u2"]
        );

        let mut patch = Map::new();
        patch.insert("name".to_string(), json!("Ada"));
        let revision = store.update("users", "u1", patch, Some(1)).await?;
        assert_eq!(revision, 2);
        let u1 = store.get_by_id("users", "u1").await?.unwrap();
        assert_eq!(u1.data["name"], "Ada");
        assert_eq!(u1.data["email"], "a@x.io");

        let stale = store
            .replace("users", "u1", json!({"email": "c@x.io"}), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(stale, StoreError::Conflict { actual: 2, .. }));
        assert_eq!(
            store.get_by_id("users", "u1").await?.unwrap().data["email"],
            "a@x.io"
        );

        assert_eq!(
            store
                .delete_where("users", "email", &json!("b@x.io"))
                .await?,
            1
        );
        assert!(store.delete_by_id("users", "u1").await?);
        assert!(!store.delete_by_id("users", "u1").await?);
        assert!(store.get_all("users").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn in_memory_store_behaves_as_gateway() -> anyhow::Result<()> {
        exercise_store(&InMemoryDocumentStore::new()).await
    }

    #[tokio::test]
    async fn local_fs_store_behaves_as_gateway() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        exercise_store(&LocalFsDocumentStore::new(dir.path())).await
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = InMemoryDocumentStore::new();
        store.create("degrees", "d1", json!({})).await.unwrap();
        let err = store.create("degrees", "d1", json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn local_fs_treats_unstorable_ids_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsDocumentStore::new(dir.path());

        assert!(store.create("degrees", "../etc", json!({})).await.is_err());
        assert_eq!(store.get_by_id("degrees", "../etc").await.unwrap(), None);
        assert_eq!(store.get_by_id("degrees", "no.such.degree").await.unwrap(), None);
        assert!(!store.delete_by_id("degrees", "no.such.degree").await.unwrap());

        let err = store
            .replace("degrees", "no.such.degree", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { .. }));
    }

    #[tokio::test]
    async fn update_of_missing_document_reports_missing() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .update("degrees", "nope", Map::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { .. }));
    }
}
