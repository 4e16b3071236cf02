//! Core types and shared functionality for webshot.
//!
//! This crate provides:
//! - Render options, fingerprints and cache keys
//! - The link-indirected blob store over memory, filesystem and S3 backends
//! - The cache-fronted screenshot [`Service`]
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod canonical;
pub mod config;
pub mod error;
pub mod options;
pub mod render;
pub mod service;

pub use cache::{BlobStore, CacheError, CacheKey, IndirectBlobStore, build_store};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use options::{ClipParts, ClipRect, ImageFormat, RenderOptions};
pub use render::{RenderError, Renderer};
pub use service::{CacheOptions, Service, Shot, ShotOptions, ShotSource};
