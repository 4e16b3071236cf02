//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, StorageBackend};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `addr` is not a socket address
    /// - `render_timeout_ms` is under 1s or over 10 minutes
    /// - `default_ttl_secs` is 0
    ///
    /// Returns `ConfigError::Missing` if the selected storage backend lacks
    /// its location (`fs_root` or the S3 bucket).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        if self.render_timeout_ms < 1_000 {
            return Err(ConfigError::Invalid {
                field: "render_timeout_ms".into(),
                reason: "must be at least 1s (1000ms)".into(),
            });
        }
        if self.render_timeout_ms > 600_000 {
            return Err(ConfigError::Invalid {
                field: "render_timeout_ms".into(),
                reason: "must not exceed 10 minutes (600000ms)".into(),
            });
        }

        if self.default_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "default_ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        match self.storage.backend {
            StorageBackend::Disabled => {
                tracing::warn!("storage backend is `none`; every request will render");
            }
            StorageBackend::Memory => {}
            StorageBackend::Fs if self.storage.fs_root.is_none() => {
                return Err(ConfigError::Missing {
                    field: "storage.fs_root".into(),
                    hint: "Set WEBSHOT_STORAGE__FS_ROOT environment variable".into(),
                });
            }
            StorageBackend::Fs => {}
            StorageBackend::S3 if self.storage.s3.bucket.as_deref().is_none_or(str::is_empty) => {
                return Err(ConfigError::Missing {
                    field: "storage.s3.bucket".into(),
                    hint: "Set WEBSHOT_STORAGE__S3__BUCKET environment variable".into(),
                });
            }
            StorageBackend::S3 => {}
        }

        if self.sign_key.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::Invalid { field: "sign_key".into(), reason: "must not be empty when set".into() });
        }

        Ok(())
    }
}
