//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (WEBSHOT_*, nested with `__`)
//! 2. TOML config file (if WEBSHOT_CONFIG_FILE set)
//! 3. Built-in defaults

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (WEBSHOT_*)
/// 2. TOML config file (if WEBSHOT_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    ///
    /// Set via WEBSHOT_ADDR environment variable.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Port override for platforms that only hand out a port.
    ///
    /// Set via WEBSHOT_PORT environment variable. Replaces the port of `addr`.
    #[serde(default)]
    pub port: Option<u16>,

    /// HMAC key for signed requests. Unsigned requests are accepted when unset.
    ///
    /// Set via WEBSHOT_SIGN_KEY environment variable.
    #[serde(default)]
    pub sign_key: Option<String>,

    /// Remote browser address: `ws://` debugger URL or `http://` DevTools endpoint.
    ///
    /// Set via WEBSHOT_BROWSER_ADDR environment variable. A local headless
    /// Chromium is launched when unset.
    #[serde(default)]
    pub browser_addr: Option<String>,

    /// Extra command line flags for a locally launched browser.
    #[serde(default)]
    pub browser_args: Vec<String>,

    /// Upper bound for a single render in milliseconds.
    ///
    /// Set via WEBSHOT_RENDER_TIMEOUT_MS environment variable.
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// TTL applied when a request does not give one.
    ///
    /// Set via WEBSHOT_DEFAULT_TTL_SECS environment variable.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Human-readable logs instead of JSON.
    #[serde(default)]
    pub log_pretty: bool,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Which object backend holds cached renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// No cache; every request renders.
    #[default]
    #[serde(rename = "none", alias = "disabled")]
    Disabled,
    Memory,
    Fs,
    S3,
}

/// Cache storage settings (`WEBSHOT_STORAGE__*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Subdirectory every object is placed under.
    #[serde(default)]
    pub prefix: String,

    /// Root directory for the `fs` backend.
    #[serde(default)]
    pub fs_root: Option<PathBuf>,

    #[serde(default)]
    pub s3: S3Config,
}

/// S3 connection settings (`WEBSHOT_STORAGE__S3__*`).
///
/// Anything left unset falls back to the standard `AWS_*` variables.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Permit plain-HTTP endpoints (local MinIO).
    #[serde(default)]
    pub allow_http: bool,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

fn default_addr() -> String {
    "0.0.0.0:8000".into()
}

fn default_render_timeout_ms() -> u64 {
    60_000
}

fn default_ttl_secs() -> u64 {
    30 * 24 * 3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: None,
            sign_key: None,
            browser_addr: None,
            browser_args: Vec::new(),
            render_timeout_ms: default_render_timeout_ms(),
            default_ttl_secs: default_ttl_secs(),
            log_pretty: false,
            storage: StorageConfig::default(),
        }
    }
}

impl AppConfig {
    /// Render timeout as Duration for use with tokio.
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Socket address to listen on, with `port` applied.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `addr` is not a socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let mut addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|e| ConfigError::Invalid { field: "addr".into(), reason: format!("{e}") })?;
        if let Some(port) = self.port {
            addr.set_port(port);
        }
        Ok(addr)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `WEBSHOT_`
    /// 2. TOML file from `WEBSHOT_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("WEBSHOT_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("WEBSHOT_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
