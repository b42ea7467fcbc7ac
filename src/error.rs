use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Catalog node kinds referenced by `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Degree,
    Course,
    Chapter,
    Test,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Degree => "degree",
            Self::Course => "course",
            Self::Chapter => "chapter",
            Self::Test => "test",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The declared content type has no storage namespace. Nothing was written.
    #[error("unsupported asset type {content_type:?} for {file_name:?}")]
    UnsupportedAssetType {
        file_name: String,
        content_type: String,
    },

    #[error("upload of {file_name:?} failed")]
    UploadFailure {
        file_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// A descendant of the authoring tree failed; `node` is the path to it.
    #[error("assembly failed at {node}")]
    AssemblyFailure {
        node: String,
        #[source]
        source: Box<CatalogError>,
    },

    #[error("{collection}/{id} changed since it was read (expected revision {expected})")]
    Conflict {
        collection: String,
        id: String,
        expected: u64,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("document store failure")]
    Store(#[source] anyhow::Error),
}

impl CatalogError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Wraps `self` as the failure of the node at `node`, nesting paths
    /// when the error is already an assembly failure of a descendant.
    pub fn at_node(self, node: impl Into<String>) -> Self {
        let node = node.into();
        match self {
            Self::AssemblyFailure {
                node: child,
                source,
            } => Self::AssemblyFailure {
                node: format!("{node}.{child}"),
                source,
            },
            other => Self::AssemblyFailure {
                node,
                source: Box::new(other),
            },
        }
    }

    /// The innermost non-assembly error.
    pub fn root_cause(&self) -> &CatalogError {
        match self {
            Self::AssemblyFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Failures reported by a [`crate::app::document_store::DocumentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection}/{id} is at revision {actual}, expected {expected}")]
    Conflict {
        collection: String,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("{collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("{collection}/{id} does not exist")]
    Missing { collection: String, id: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                collection,
                id,
                expected,
                ..
            } => Self::Conflict {
                collection,
                id,
                expected,
            },
            StoreError::Missing { collection, id } => Self::NotFound {
                kind: kind_for_collection(&collection),
                id,
            },
            other => Self::Store(anyhow::Error::new(other)),
        }
    }
}

fn kind_for_collection(collection: &str) -> EntityKind {
    if collection == crate::users::USERS {
        EntityKind::User
    } else {
        EntityKind::Degree
    }
}
