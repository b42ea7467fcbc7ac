//! Learner and admin profiles stored in the `users` collection.

use std::sync::Arc;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::app::document_store::{DocumentStore, StoredDocument};
use crate::assets::AssetUploader;
use crate::authoring::FileUpload;
use crate::catalog::DegreeRepository;
use crate::error::{CatalogError, EntityKind, Result, StoreError};
use crate::model::FileAsset;

pub const USERS: &str = "users";
/// One document per registered email, keyed by its base64url form. Claimed with
/// `create` so two signups for the same address cannot both succeed.
pub const USER_EMAILS: &str = "user_emails";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Student,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub documents: Vec<FileAsset>,
    /// Identifiers of purchased degrees.
    pub purchased_degrees: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn DocumentStore>,
    degrees: DegreeRepository,
    uploader: AssetUploader,
}

impl UserService {
    pub fn new(store: Arc<dyn DocumentStore>, uploader: AssetUploader) -> Self {
        Self {
            degrees: DegreeRepository::new(Arc::clone(&store)),
            store,
            uploader,
        }
    }

    pub async fn create_user(&self, new_user: &NewUser) -> Result<UserProfile> {
        let email = normalize_email(&new_user.email)?;
        if self.find_by_email(&email).await?.is_some() {
            return Err(email_taken(&email));
        }

        let user = UserProfile {
            id: crate::new_id(),
            name: new_user.name.trim().to_string(),
            email,
            phone: new_user.phone.clone(),
            role: new_user.role,
            documents: Vec::new(),
            purchased_degrees: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        };

        let key = email_key(&user.email);
        match self
            .store
            .create(USER_EMAILS, &key, serde_json::json!({ "userId": user.id }))
            .await
        {
            Ok(_) => {}
            Err(StoreError::AlreadyExists { .. }) => return Err(email_taken(&user.email)),
            Err(err) => return Err(err.into()),
        }
        if let Err(err) = self.store.create(USERS, &user.id, encode(&user)?).await {
            self.store.delete_by_id(USER_EMAILS, &key).await?;
            return Err(err.into());
        }
        tracing::info!(user_id = %user.id, role = ?user.role, "user created");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<UserProfile> {
        Ok(self.fetch(user_id).await?.0)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        let email = normalize_email(email)?;
        let docs = self
            .store
            .query_by_field(USERS, "email", &Value::String(email))
            .await?;
        docs.into_iter().next().map(decode).transpose()
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile> {
        let (mut user, revision) = self.fetch(user_id).await?;
        let mut patch = Map::new();
        if let Some(name) = &update.name {
            user.name = name.trim().to_string();
            patch.insert("name".to_string(), Value::String(user.name.clone()));
        }
        if let Some(phone) = &update.phone {
            user.phone = Some(phone.clone());
            patch.insert("phone".to_string(), Value::String(phone.clone()));
        }
        if let Some(role) = update.role {
            user.role = role;
            patch.insert("role".to_string(), to_value(&role)?);
        }
        self.patch(&mut user, patch, revision).await?;
        Ok(user)
    }

    /// Uploads a profile document (ID scan, certificate, ...) and attaches it.
    pub async fn upload_document(&self, user_id: &str, file: &FileUpload) -> Result<UserProfile> {
        let (mut user, revision) = self.fetch(user_id).await?;
        let asset = self.uploader.store(file).await?;
        user.documents.push(asset);

        let mut patch = Map::new();
        patch.insert("documents".to_string(), to_value(&user.documents)?);
        self.patch(&mut user, patch, revision).await?;
        Ok(user)
    }

    pub async fn record_purchase(&self, user_id: &str, degree_id: &str) -> Result<UserProfile> {
        self.degrees.fetch(degree_id).await?;
        let (mut user, revision) = self.fetch(user_id).await?;
        if user.purchased_degrees.iter().any(|id| id == degree_id) {
            return Ok(user);
        }
        user.purchased_degrees.push(degree_id.to_string());

        let mut patch = Map::new();
        patch.insert(
            "purchasedDegrees".to_string(),
            to_value(&user.purchased_degrees)?,
        );
        self.patch(&mut user, patch, revision).await?;
        tracing::info!(user_id, degree_id, "purchase recorded");
        Ok(user)
    }

    pub async fn students_of_degree(&self, degree_id: &str) -> Result<Vec<UserProfile>> {
        self.store
            .query_by_array_contains(
                USERS,
                "purchasedDegrees",
                &Value::String(degree_id.to_string()),
            )
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        let (user, _) = self.fetch(user_id).await?;
        if !self.store.delete_by_id(USERS, user_id).await? {
            return Err(CatalogError::not_found(EntityKind::User, user_id));
        }
        self.store
            .delete_by_id(USER_EMAILS, &email_key(&user.email))
            .await?;
        tracing::info!(user_id, "user deleted");
        Ok(())
    }

    async fn fetch(&self, user_id: &str) -> Result<(UserProfile, u64)> {
        let doc = self
            .store
            .get_by_id(USERS, user_id)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::User, user_id))?;
        let revision = doc.revision;
        Ok((decode(doc)?, revision))
    }

    async fn patch(
        &self,
        user: &mut UserProfile,
        mut patch: Map<String, Value>,
        revision: u64,
    ) -> Result<()> {
        let now = Utc::now();
        user.updated_at = Some(now);
        patch.insert("updatedAt".to_string(), to_value(&now)?);
        self.store
            .update(USERS, &user.id, patch, Some(revision))
            .await?;
        Ok(())
    }
}

fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(CatalogError::InvalidInput(format!("invalid email: {raw:?}")));
    }
    Ok(email)
}

/// Document id for a normalized email, restricted to `[A-Za-z0-9_-]`.
fn email_key(email: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(email.as_bytes())
}

fn email_taken(email: &str) -> CatalogError {
    CatalogError::InvalidInput(format!("email already registered: {email}"))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| CatalogError::Store(err.into()))
}

fn encode(user: &UserProfile) -> Result<Value> {
    to_value(user)
}

fn decode(doc: StoredDocument) -> Result<UserProfile> {
    serde_json::from_value(doc.data).map_err(|err| {
        CatalogError::Store(anyhow::Error::new(err).context(format!("decode user {}", doc.id)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::document_store::{InMemoryDocumentStore, LocalFsDocumentStore};
    use crate::app::object_store::InMemoryObjectStore;
    use crate::assembler::{Assembler, AssemblyOptions};
    use crate::authoring::DegreeSpec;
    use crate::catalog::CatalogService;
    use crate::model::MediaKind;

    fn services() -> (UserService, CatalogService) {
        let docs: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let uploader = AssetUploader::new(Arc::new(InMemoryObjectStore::new()));
        let catalog = CatalogService::new(
            Arc::clone(&docs),
            Assembler::new(uploader.clone(), AssemblyOptions::default()),
        );
        (UserService::new(docs, uploader), catalog)
    }

    fn ada() -> NewUser {
        NewUser {
            name: " Ada ".to_string(),
            email: "Ada@Example.org".to_string(),
            phone: None,
            role: Role::Student,
        }
    }

    #[tokio::test]
    async fn create_and_find_by_email() -> anyhow::Result<()> {
        let (users, _) = services();
        let user = users.create_user(&ada()).await?;

        assert_eq!(user.name, "Ada");
        assert_eq!(user.email, "ada@example.org");
        let found = users.find_by_email("ADA@example.org").await?.unwrap();
        assert_eq!(found, user);

        let err = users.create_user(&ada()).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidInput(_)));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_malformed_email() {
        let (users, _) = services();
        let err = users
            .create_user(&NewUser {
                email: "not-an-email".to_string(),
                ..ada()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn update_profile_patches_named_fields() -> anyhow::Result<()> {
        let (users, _) = services();
        let user = users.create_user(&ada()).await?;

        let updated = users
            .update_profile(
                &user.id,
                &ProfileUpdate {
                    phone: Some("+1 555 0100".to_string()),
                    ..ProfileUpdate::default()
                },
            )
            .await?;

        assert_eq!(updated.phone.as_deref(), Some("+1 555 0100"));
        assert_eq!(updated.name, "Ada");
        assert_eq!(users.get_user(&user.id).await?, updated);
        Ok(())
    }

    #[tokio::test]
    async fn uploaded_documents_are_attached() -> anyhow::Result<()> {
        let (users, _) = services();
        let user = users.create_user(&ada()).await?;

        let updated = users
            .upload_document(
                &user.id,
                &FileUpload::new("id.pdf", "application/pdf", b"%PDF".to_vec()),
            )
            .await?;

        assert_eq!(updated.documents.len(), 1);
        assert_eq!(updated.documents[0].kind, MediaKind::Document);
        assert_eq!(users.get_user(&user.id).await?.documents.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn purchases_index_students_by_degree_id() -> anyhow::Result<()> {
        let (users, catalog) = services();
        let degree = catalog
            .create_degree(&DegreeSpec {
                name: "Theology I".to_string(),
                description: String::new(),
                thumbnail: None,
                overview_points: None,
                courses: Vec::new(),
            })
            .await?;
        let user = users.create_user(&ada()).await?;

        users.record_purchase(&user.id, &degree.id).await?;
        let again = users.record_purchase(&user.id, &degree.id).await?;
        assert_eq!(again.purchased_degrees, vec![degree.id.clone()]);

        let students = users.students_of_degree(&degree.id).await?;
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, user.id);

        let err = users.record_purchase(&user.id, "missing").await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::NotFound {
                kind: EntityKind::Degree,
                ..
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_signups_with_same_email_register_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let docs: Arc<dyn DocumentStore> = Arc::new(LocalFsDocumentStore::new(dir.path()));
        let users = UserService::new(
            docs,
            AssetUploader::new(Arc::new(InMemoryObjectStore::new())),
        );

        for round in 0..10 {
            let new_user = NewUser {
                email: format!("racer{round}@example.org"),
                ..ada()
            };
            let first = tokio::spawn({
                let users = users.clone();
                let new_user = new_user.clone();
                async move { users.create_user(&new_user).await }
            });
            let second = tokio::spawn({
                let users = users.clone();
                let new_user = new_user.clone();
                async move { users.create_user(&new_user).await }
            });
            let results = [first.await?, second.await?];

            let created = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(created, 1, "round {round}");
            assert!(
                results
                    .iter()
                    .any(|r| matches!(r, Err(CatalogError::InvalidInput(_))))
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn deleted_user_frees_the_email() -> anyhow::Result<()> {
        let (users, _) = services();
        let user = users.create_user(&ada()).await?;
        users.delete_user(&user.id).await?;

        let again = users.create_user(&ada()).await?;
        assert_ne!(again.id, user.id);
        Ok(())
    }

    #[tokio::test]
    async fn delete_user_then_not_found() -> anyhow::Result<()> {
        let (users, _) = services();
        let user = users.create_user(&ada()).await?;
        users.delete_user(&user.id).await?;
        assert!(matches!(
            users.get_user(&user.id).await.unwrap_err(),
            CatalogError::NotFound {
                kind: EntityKind::User,
                ..
            }
        ));
        Ok(())
    }
}
