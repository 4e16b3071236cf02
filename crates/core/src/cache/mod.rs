//! Render-result cache over pluggable object storage.
//!
//! A [`BlobStore`] maps a [`CacheKey`] to the latest image bytes and answers
//! freshness from the TTL recorded at upload time. The only implementation,
//! [`IndirectBlobStore`], lays entries out as link objects pointing at
//! immutable artifacts on any [`ObjectBackend`]:
//!
//! - [`MemoryBackend`]: process-local, with fault injection for tests
//! - [`FsBackend`]: a directory with JSON metadata sidecars
//! - `S3Backend`: S3-compatible buckets (feature `s3`)

pub mod backend;
pub mod fs;
pub mod indirect;
pub mod key;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Error;
use crate::config::{ConfigError, StorageBackend, StorageConfig};

pub use backend::{BackendError, Metadata, ObjectBackend, ObjectHead, PutObject};
pub use fs::FsBackend;
pub use indirect::{IndirectBlobStore, Link};
pub use key::{CacheKey, compute_cache_key};
pub use memory::MemoryBackend;
#[cfg(feature = "s3")]
pub use s3::S3Backend;

/// Outcome of a cache read that did not produce bytes.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No link exists for the key.
    #[error("cache entry not found")]
    NotFound,

    /// The link is older than its TTL.
    #[error("cache entry expired")]
    Expired,

    /// The link is unreadable or points at nothing.
    #[error("cache entry corrupted: {0}")]
    Corrupted(String),

    /// The backend itself failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl CacheError {
    /// Whether the caller should fall through to a fresh render.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CacheError::NotFound | CacheError::Expired | CacheError::Corrupted(_))
    }
}

/// One image to persist under a key.
#[derive(Debug, Clone)]
pub struct Upload {
    pub key: CacheKey,
    pub ttl: Duration,
    pub body: Bytes,
}

/// Keyed image store with TTL-based freshness.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether any entry exists for `key`, regardless of age.
    async fn has(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Latest bytes for `key` if present and fresh.
    async fn get(&self, key: &CacheKey) -> Result<Bytes, CacheError>;

    /// Store bytes under `key`, superseding any earlier entry.
    async fn upload(&self, upload: Upload) -> Result<(), CacheError>;
}

/// Build the configured blob store, or `None` when caching is disabled.
///
/// # Errors
///
/// Returns `Error::Config` when the selected backend cannot be opened.
pub async fn build_store(config: &StorageConfig) -> Result<Option<Arc<dyn BlobStore>>, Error> {
    let backend: Arc<dyn ObjectBackend> = match config.backend {
        StorageBackend::Disabled => return Ok(None),
        StorageBackend::Memory => Arc::new(MemoryBackend::new()),
        StorageBackend::Fs => {
            let root = config.fs_root.clone().ok_or_else(|| ConfigError::Missing {
                field: "storage.fs_root".into(),
                hint: "Set WEBSHOT_STORAGE__FS_ROOT".into(),
            })?;
            let backend = FsBackend::open(root).await.map_err(|e| ConfigError::Invalid {
                field: "storage.fs_root".into(),
                reason: e.to_string(),
            })?;
            Arc::new(backend)
        }
        #[cfg(feature = "s3")]
        StorageBackend::S3 => {
            let backend = S3Backend::from_config(&config.s3)
                .map_err(|e| ConfigError::Invalid { field: "storage.s3".into(), reason: e.to_string() })?;
            Arc::new(backend)
        }
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => {
            return Err(ConfigError::Invalid {
                field: "storage.backend".into(),
                reason: "built without the `s3` feature".into(),
            }
            .into());
        }
    };

    tracing::info!(backend = ?config.backend, prefix = %config.prefix, "cache storage ready");

    let store = IndirectBlobStore::new(backend).with_prefix(&config.prefix);
    Ok(Some(Arc::new(store)))
}
