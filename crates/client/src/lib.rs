//! Browser side of webshot.
//!
//! This crate turns a URL and [`webshot_core::RenderOptions`] into image bytes
//! using a local or remote headless Chromium.

pub mod render;

#[cfg(feature = "render")]
pub use render::{BrowserOptions, HeadlessRenderer};
pub use render::{ChromeResolver, DisabledRenderer};
