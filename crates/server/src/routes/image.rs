//! `GET /image`: screenshot a page, through the cache.

use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, RawQuery, State};
use axum::http::HeaderName;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Deserializer, de};
use webshot_core::options::MAX_QUALITY;
use webshot_core::{CacheOptions, ClipParts, ImageFormat, RenderOptions, ShotOptions};

use crate::error::ApiError;
use crate::handler::AppState;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Query string of an image request. Unknown parameters (including `sign`)
/// are ignored here.
#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub scale: f64,

    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub quality: u32,

    #[serde(default, deserialize_with = "flag")]
    pub full_page: bool,
    #[serde(default, deserialize_with = "flag")]
    pub scroll_page: bool,
    /// Milliseconds.
    #[serde(default)]
    pub delay: u64,

    #[serde(default)]
    pub clip_x: Option<f64>,
    #[serde(default)]
    pub clip_y: Option<f64>,
    #[serde(default)]
    pub clip_width: Option<f64>,
    #[serde(default)]
    pub clip_height: Option<f64>,

    #[serde(default, deserialize_with = "flag")]
    pub fresh: bool,
    /// Seconds; 0 uses the server default.
    #[serde(default)]
    pub ttl: u64,
}

/// Lenient boolean: `1/0`, `t/f`, `true/false`, `yes/no`, `on/off`.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "f" | "false" | "no" | "off" => Ok(false),
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        other => Err(de::Error::custom(format!("invalid boolean `{other}`"))),
    }
}

impl ImageQuery {
    /// Split into the target URL and shot options.
    ///
    /// # Errors
    ///
    /// `ApiError` 422 when `url` is missing, the format is unknown or the
    /// clip is partial.
    pub fn into_shot(self) -> Result<(String, ShotOptions), ApiError> {
        let url = self
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ApiError::unprocessable("decode query: url is required"))?;

        let format = match self.format.as_deref().map(str::trim) {
            None | Some("") => ImageFormat::default(),
            Some(format) => format.parse()?,
        };
        let clip = ClipParts { x: self.clip_x, y: self.clip_y, width: self.clip_width, height: self.clip_height }
            .validate()?;

        let render = RenderOptions {
            width: self.width,
            height: self.height,
            scale: self.scale,
            format,
            quality: self.quality.min(u32::from(MAX_QUALITY)) as u8,
            clip,
            full_page: self.full_page,
            scroll_page: self.scroll_page,
            delay: Duration::from_millis(self.delay),
        };
        let cache = CacheOptions { ttl: (self.ttl > 0).then(|| Duration::from_secs(self.ttl)), fresh: self.fresh };

        Ok((url, ShotOptions { render, cache }))
    }
}

pub async fn image(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    query: Result<Query<ImageQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::unprocessable(format!("decode query: {}", e.body_text())))?;

    if let Some(auth) = &state.auth {
        auth.verify_query(raw.as_deref().unwrap_or_default())
            .map_err(|e| ApiError::unauthorized(format!("unauthorized: {e}")))?;
    }

    let (url, opts) = query.into_shot()?;
    let shot = state.service.shot(&url, &opts).await?;

    tracing::info!(url = %url, cache = shot.source.as_str(), bytes = shot.body.len(), "image served");
    Ok(([(CONTENT_TYPE, shot.content_type()), (X_CACHE, shot.source.as_str())], shot.body).into_response())
}
