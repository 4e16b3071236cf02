//! Local filesystem object backend.
//!
//! Each object is a data file plus a `.meta.json` sidecar holding its write
//! time, content headers and user metadata. Both are written to a temp file
//! and renamed into place; the sidecar is renamed last, so a visible sidecar
//! always has a complete body next to it.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::backend::{BackendError, Metadata, ObjectBackend, ObjectHead, PutObject};
use super::key::new_salt;

const SIDECAR_SUFFIX: &str = ".meta.json";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    last_modified: DateTime<Utc>,
    size: u64,
    content_type: Option<String>,
    cache_control: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

/// Object backend rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Open a backend rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| BackendError::io(root.display().to_string(), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, path: &str) -> Result<PathBuf, BackendError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let safe = relative.components().all(|c| matches!(c, Component::Normal(_)));
        if path.trim_start_matches('/').is_empty() || !safe || path.ends_with(SIDECAR_SUFFIX) {
            return Err(BackendError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn sidecar_path(data: &Path) -> PathBuf {
        let mut name = data.as_os_str().to_owned();
        name.push(SIDECAR_SUFFIX);
        PathBuf::from(name)
    }

    async fn write_atomic(target: &Path, contents: &[u8], path: &str) -> Result<(), BackendError> {
        let mut tmp = target.as_os_str().to_owned();
        tmp.push(format!(".tmp-{}", new_salt()));
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, contents)
            .await
            .map_err(|e| BackendError::Io { path: path.to_string(), source: e })?;
        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(BackendError::Io { path: path.to_string(), source: e });
        }
        Ok(())
    }

    async fn read_sidecar(&self, path: &str) -> Result<Sidecar, BackendError> {
        let data = self.data_path(path)?;
        let raw = fs::read(Self::sidecar_path(&data))
            .await
            .map_err(|e| BackendError::io(path, e))?;
        serde_json::from_slice(&raw).map_err(|e| {
            BackendError::Io { path: path.to_string(), source: std::io::Error::new(std::io::ErrorKind::InvalidData, e) }
        })
    }
}

#[async_trait]
impl ObjectBackend for FsBackend {
    async fn head_object(&self, path: &str) -> Result<ObjectHead, BackendError> {
        let sidecar = self.read_sidecar(path).await?;
        Ok(ObjectHead {
            last_modified: sidecar.last_modified,
            size: sidecar.size,
            content_type: sidecar.content_type,
            metadata: sidecar.metadata,
        })
    }

    async fn get_object(&self, path: &str) -> Result<Bytes, BackendError> {
        // An object is visible only once its sidecar exists.
        self.read_sidecar(path).await?;
        let data = self.data_path(path)?;
        let body = fs::read(&data).await.map_err(|e| BackendError::io(path, e))?;
        Ok(Bytes::from(body))
    }

    async fn put_object(&self, path: &str, object: PutObject) -> Result<(), BackendError> {
        let data = self.data_path(path)?;
        if let Some(parent) = data.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::Io { path: path.to_string(), source: e })?;
        }

        let sidecar = Sidecar {
            last_modified: Utc::now(),
            size: object.body.len() as u64,
            content_type: object.content_type,
            cache_control: object.cache_control,
            metadata: object.metadata,
        };
        let sidecar = serde_json::to_vec(&sidecar).map_err(|e| BackendError::Io {
            path: path.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        Self::write_atomic(&data, &object.body, path).await?;
        Self::write_atomic(&Self::sidecar_path(&data), &sidecar, path).await?;

        tracing::trace!(path, bytes = object.body.len(), "fs object written");
        Ok(())
    }
}
