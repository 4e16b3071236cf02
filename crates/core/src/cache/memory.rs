//! In-memory object backend.
//!
//! Used for tests and single-process deployments where losing the cache on
//! restart is fine. Supports fault injection so callers can exercise store
//! outages and partial uploads.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::RwLock;

use super::backend::{BackendError, ObjectBackend, ObjectHead, PutObject};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    head: ObjectHead,
}

/// Failures to inject into a [`MemoryBackend`].
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Every `head_object` fails with a remote error.
    pub fail_head: bool,
    /// Every `get_object` fails with a remote error.
    pub fail_get: bool,
    /// `put_object` fails for paths ending with this suffix.
    pub fail_put_suffix: Option<String>,
    /// `put_object` sleeps this long before writing.
    pub put_delay: Option<Duration>,
}

/// Object backend backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, StoredObject>>,
    faults: RwLock<Faults>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active fault set.
    pub async fn set_faults(&self, faults: Faults) {
        *self.faults.write().await = faults;
    }

    /// Paths of all stored objects, sorted.
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.objects.read().await.contains_key(path)
    }

    /// Move an object's write time into the past.
    ///
    /// Returns false if no object exists at `path`.
    pub async fn backdate(&self, path: &str, by: Duration) -> bool {
        let Ok(delta) = chrono::TimeDelta::from_std(by) else {
            return false;
        };
        match self.objects.write().await.get_mut(path) {
            Some(object) => {
                object.head.last_modified -= delta;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn head_object(&self, path: &str) -> Result<ObjectHead, BackendError> {
        if self.faults.read().await.fail_head {
            return Err(BackendError::Remote(format!("injected head failure for {path}")));
        }
        self.objects
            .read()
            .await
            .get(path)
            .map(|object| object.head.clone())
            .ok_or_else(|| BackendError::NotFound(path.to_string()))
    }

    async fn get_object(&self, path: &str) -> Result<Bytes, BackendError> {
        if self.faults.read().await.fail_get {
            return Err(BackendError::Remote(format!("injected get failure for {path}")));
        }
        self.objects
            .read()
            .await
            .get(path)
            .map(|object| object.body.clone())
            .ok_or_else(|| BackendError::NotFound(path.to_string()))
    }

    async fn put_object(&self, path: &str, object: PutObject) -> Result<(), BackendError> {
        let faults = self.faults.read().await.clone();
        if let Some(delay) = faults.put_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(suffix) = &faults.fail_put_suffix
            && path.ends_with(suffix.as_str())
        {
            return Err(BackendError::Remote(format!("injected put failure for {path}")));
        }

        let head = ObjectHead {
            last_modified: Utc::now(),
            size: object.body.len() as u64,
            content_type: object.content_type,
            metadata: object.metadata,
        };
        self.objects
            .write()
            .await
            .insert(path.to_string(), StoredObject { body: object.body, head });
        Ok(())
    }
}
