//! Link-indirected blob store.
//!
//! Every cache entry is a small link object at a stable, key-derived path plus
//! any number of immutable artifact objects at unique paths. The link's
//! metadata names the latest artifact and its TTL:
//!
//! ```text
//! {prefix}/{host}/{digest}.link            latest={artifact path} ttl={seconds}
//! {prefix}/{host}/{digest}.{salt}.{ext}    image bytes, never overwritten
//! ```
//!
//! Expiry is decided from the link's `last_modified` and `ttl`; nothing is
//! ever deleted or rewritten in place, so concurrent writers for one key only
//! race on which link wins. The link is written only after its artifact is
//! stored, so a failed or cancelled upload leaves any earlier link in place.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};

use super::backend::{BackendError, Metadata, ObjectBackend, ObjectHead, PutObject};
use super::key::{CacheKey, new_salt};
use super::{BlobStore, CacheError, Upload};

/// Link metadata naming the current artifact.
pub const META_LATEST: &str = "latest";

/// Link and artifact metadata holding the TTL in whole seconds.
pub const META_TTL: &str = "ttl";

const LINK_CONTENT_TYPE: &str = "application/octet-stream";

/// Artifacts are immutable, so downstream caches may keep them for long.
const ARTIFACT_MAX_AGE_SECS: u64 = 3600 * 24 * 360;

/// A decoded link record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub latest: String,
    pub ttl_secs: u64,
    pub last_modified: DateTime<Utc>,
}

impl Link {
    /// Decode a link from its object metadata.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Corrupted` when `ttl` or `latest` is missing or
    /// `ttl` is not a non-negative integer.
    pub fn from_head(head: &ObjectHead) -> Result<Self, CacheError> {
        let ttl = head
            .metadata
            .get(META_TTL)
            .ok_or_else(|| CacheError::Corrupted("link has no ttl".into()))?;
        let ttl_secs: u64 = ttl
            .trim()
            .parse()
            .ok()
            .ok_or_else(|| CacheError::Corrupted(format!("link ttl is not a number of seconds: {ttl:?}")))?;
        let latest = head
            .metadata
            .get(META_LATEST)
            .filter(|path| !path.is_empty())
            .ok_or_else(|| CacheError::Corrupted("link has no latest artifact".into()))?;

        Ok(Self { latest: latest.clone(), ttl_secs, last_modified: head.last_modified })
    }

    /// Metadata to store on a link pointing at `latest`.
    pub fn metadata(latest: &str, ttl: Duration) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(META_LATEST.to_string(), latest.to_string());
        metadata.insert(META_TTL.to_string(), ttl.as_secs().to_string());
        metadata
    }

    /// Instant after which the link is stale, `None` if it never expires in
    /// representable time.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| self.last_modified.checked_add_signed(ttl))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now > at)
    }
}

/// [`BlobStore`] over an [`ObjectBackend`] using link objects.
#[derive(Clone)]
pub struct IndirectBlobStore {
    backend: Arc<dyn ObjectBackend>,
    prefix: String,
}

impl std::fmt::Debug for IndirectBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndirectBlobStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl IndirectBlobStore {
    pub fn new(backend: Arc<dyn ObjectBackend>) -> Self {
        Self { backend, prefix: String::new() }
    }

    /// Place every object under `prefix` (a bucket subdirectory).
    pub fn with_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        self.prefix = prefix.as_ref().trim_matches('/').to_string();
        self
    }

    fn locate(&self, path: String) -> String {
        if self.prefix.is_empty() { path } else { format!("{}/{}", self.prefix, path) }
    }

    /// Full backend path of the key's link object.
    pub fn link_path(&self, key: &CacheKey) -> String {
        self.locate(key.link_path())
    }

    fn fresh_artifact_path(&self, key: &CacheKey) -> String {
        self.locate(key.artifact_path(&new_salt()))
    }

    /// Read and decode the key's link.
    pub async fn link(&self, key: &CacheKey) -> Result<Link, CacheError> {
        let head = match self.backend.head_object(&self.link_path(key)).await {
            Ok(head) => head,
            Err(BackendError::NotFound(_)) => return Err(CacheError::NotFound),
            Err(e) => return Err(e.into()),
        };
        Link::from_head(&head)
    }
}

#[async_trait]
impl BlobStore for IndirectBlobStore {
    async fn has(&self, key: &CacheKey) -> Result<bool, CacheError> {
        match self.backend.head_object(&self.link_path(key)).await {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &CacheKey) -> Result<Bytes, CacheError> {
        let link = self.link(key).await?;

        if link.is_expired(Utc::now()) {
            return Err(CacheError::Expired);
        }

        match self.backend.get_object(&link.latest).await {
            Ok(body) => Ok(body),
            Err(BackendError::NotFound(_)) => Err(CacheError::Corrupted("link points at a missing artifact".into())),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, upload: Upload) -> Result<(), CacheError> {
        let started = Instant::now();
        let Upload { key, ttl, body } = upload;
        let artifact_path = self.fresh_artifact_path(&key);
        let link_path = self.link_path(&key);
        let size = body.len();

        let mut artifact_metadata = Metadata::new();
        artifact_metadata.insert(META_TTL.to_string(), ttl.as_secs().to_string());
        let artifact = PutObject {
            body,
            content_type: Some(key.format().content_type().to_string()),
            cache_control: Some(format!("max-age={ARTIFACT_MAX_AGE_SECS}")),
            metadata: artifact_metadata,
        };
        let link = PutObject {
            body: Bytes::from(artifact_path.clone()),
            content_type: Some(LINK_CONTENT_TYPE.to_string()),
            cache_control: None,
            metadata: Link::metadata(&artifact_path, ttl),
        };

        self.backend.put_object(&artifact_path, artifact).await?;
        self.backend.put_object(&link_path, link).await?;

        tracing::info!(
            key = %key.digest(),
            url = %key.url(),
            path = %artifact_path,
            ttl_secs = ttl.as_secs(),
            bytes = size,
            took_ms = started.elapsed().as_millis() as u64,
            "upload"
        );
        Ok(())
    }
}
