//! Renderer collaborator interface.
//!
//! The cache only needs "URL + options in, image bytes out". Browser driving
//! lives in `webshot-client`.

use thiserror::Error;
use url::Url;

use crate::options::RenderOptions;

/// Errors that can occur during page rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to launch or connect to browser.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Failed to resolve the remote browser's websocket address.
    #[error("browser resolve failed: {0}")]
    BrowserResolve(String),

    /// Failed to navigate to URL.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Failed to configure the page or capture pixels.
    #[error("capture failed: {0}")]
    Capture(String),

    /// Render did not finish in time.
    #[error("render timeout after {0}ms")]
    Timeout(u64),

    /// Rendering is not available in this build.
    #[error("rendering is disabled")]
    Disabled,
}

/// Produces image bytes for a page.
///
/// Implementations do not retry and do not enforce timeouts; the caller
/// bounds the call and cancels it by dropping the future.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<Vec<u8>, RenderError>;
}
