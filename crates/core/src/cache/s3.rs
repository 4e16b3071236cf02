//! S3-compatible object backend built on the `object_store` crate.
//!
//! User metadata maps to `x-amz-meta-*` headers, so link records are read
//! with a single HEAD request.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{Attribute, AttributeValue, Attributes, GetOptions, ObjectStore, PutOptions, PutPayload};

use super::backend::{BackendError, Metadata, ObjectBackend, ObjectHead, PutObject};
use crate::config::S3Config;

/// Object backend for S3 and compatible services (MinIO, R2, ...).
#[derive(Debug, Clone)]
pub struct S3Backend {
    store: Arc<dyn ObjectStore>,
}

impl S3Backend {
    /// Build a client from configuration.
    ///
    /// Credentials and region not given in `config` fall back to the standard
    /// `AWS_*` environment variables.
    pub fn from_config(config: &S3Config) -> Result<Self, BackendError> {
        let mut builder = AmazonS3Builder::from_env().with_allow_http(config.allow_http);

        if let Some(bucket) = &config.bucket {
            builder = builder.with_bucket_name(bucket);
        }
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(access_key) = &config.access_key {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = &config.secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }

        let store = builder.build().map_err(|e| BackendError::Remote(e.to_string()))?;
        Ok(Self::from_store(Arc::new(store)))
    }

    /// Wrap any `object_store` implementation.
    pub fn from_store(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

fn map_error(path: &str, err: object_store::Error) -> BackendError {
    match err {
        object_store::Error::NotFound { .. } => BackendError::NotFound(path.to_string()),
        other => BackendError::Remote(other.to_string()),
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn head_object(&self, path: &str) -> Result<ObjectHead, BackendError> {
        let location = Path::from(path);
        let options = GetOptions { head: true, ..Default::default() };
        let result = self
            .store
            .get_opts(&location, options)
            .await
            .map_err(|e| map_error(path, e))?;

        let mut metadata = Metadata::new();
        let mut content_type = None;
        for (attribute, value) in result.attributes.iter() {
            let value: &str = value.as_ref();
            match attribute {
                Attribute::Metadata(name) => {
                    metadata.insert(name.to_string(), value.to_string());
                }
                Attribute::ContentType => content_type = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(ObjectHead {
            last_modified: result.meta.last_modified,
            size: result.meta.size as u64,
            content_type,
            metadata,
        })
    }

    async fn get_object(&self, path: &str) -> Result<Bytes, BackendError> {
        let location = Path::from(path);
        let result = self.store.get(&location).await.map_err(|e| map_error(path, e))?;
        result.bytes().await.map_err(|e| map_error(path, e))
    }

    async fn put_object(&self, path: &str, object: PutObject) -> Result<(), BackendError> {
        let location = Path::from(path);

        let mut attributes = Attributes::new();
        if let Some(content_type) = object.content_type {
            attributes.insert(Attribute::ContentType, AttributeValue::from(content_type));
        }
        if let Some(cache_control) = object.cache_control {
            attributes.insert(Attribute::CacheControl, AttributeValue::from(cache_control));
        }
        for (name, value) in object.metadata {
            attributes.insert(Attribute::Metadata(name.into()), AttributeValue::from(value));
        }

        let options = PutOptions { attributes, ..Default::default() };
        self.store
            .put_opts(&location, PutPayload::from(object.body), options)
            .await
            .map_err(|e| map_error(path, e))?;
        Ok(())
    }
}
