//! Primitive object storage interface.
//!
//! Backends offer only put, get and head. There is no compare-and-swap and no
//! server-side expiry; the indirect store builds both on top.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// User metadata attached to an object.
pub type Metadata = BTreeMap<String, String>;

/// An object to be written.
#[derive(Debug, Clone, Default)]
pub struct PutObject {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub metadata: Metadata,
}

/// Object metadata returned without the body.
#[derive(Debug, Clone)]
pub struct ObjectHead {
    /// Write time assigned by the backend.
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    pub content_type: Option<String>,
    pub metadata: Metadata,
}

/// Errors from an object storage backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No object at the given path.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Path cannot be mapped onto the backend.
    #[error("invalid object path: {0}")]
    InvalidPath(String),

    /// Local filesystem failure.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Remote store or transport failure.
    #[error("object store error: {0}")]
    Remote(String),
}

impl BackendError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            BackendError::NotFound(path.into())
        } else {
            BackendError::Io { path: path.into(), source }
        }
    }
}

/// Durable object store holding links and artifacts.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Fetch an object's metadata without its body.
    async fn head_object(&self, path: &str) -> Result<ObjectHead, BackendError>;

    /// Fetch an object's body.
    async fn get_object(&self, path: &str) -> Result<Bytes, BackendError>;

    /// Create or replace an object. Must be durably visible when this returns `Ok`.
    async fn put_object(&self, path: &str, object: PutObject) -> Result<(), BackendError>;
}
