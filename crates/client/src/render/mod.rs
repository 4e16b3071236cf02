//! Headless browser rendering for screenshots.
//!
//! This module provides the chromiumoxide-backed [`HeadlessRenderer`]
//! (feature `render`) and the remote browser [`ChromeResolver`]. Builds
//! without a browser use [`DisabledRenderer`].

#[cfg(feature = "render")]
mod headless;
mod resolver;

#[cfg(feature = "render")]
pub use headless::{BrowserOptions, HeadlessRenderer};
pub use resolver::ChromeResolver;

use url::Url;
use webshot_core::{RenderError, RenderOptions, Renderer};

/// Renderer that refuses every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRenderer;

#[async_trait::async_trait]
impl Renderer for DisabledRenderer {
    async fn render(&self, _url: &Url, _opts: &RenderOptions) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::Disabled)
    }
}
