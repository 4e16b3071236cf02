//! HTTP endpoints.

pub mod health;
pub mod image;
pub mod version;
