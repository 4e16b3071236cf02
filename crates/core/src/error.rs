//! Unified error types for webshot.
//!
//! Only the cache states carried inside [`CacheError`] are ever recovered
//! locally; everything here crosses the core boundary as-is.

use crate::cache::{CacheError, CacheKey};
use crate::config::ConfigError;
use crate::render::RenderError;

/// Unified error type for webshot operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed option combination, rejected before any I/O.
    #[error("INVALID_OPTIONS: {0}")]
    InvalidOptions(String),

    /// Target URL could not be parsed or is not http(s).
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The renderer failed.
    #[error("RENDER_FAILED: {0}")]
    Render(#[from] RenderError),

    /// A blob store failure that is not a recoverable cache state.
    ///
    /// `key` is the cache key digest, never a storage path.
    #[error("STORAGE_ERROR: {op} {key}: {source}")]
    Storage {
        op: &'static str,
        key: String,
        #[source]
        source: CacheError,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn storage(op: &'static str, key: &CacheKey, source: CacheError) -> Self {
        Error::Storage { op, key: key.digest().to_string(), source }
    }
}
