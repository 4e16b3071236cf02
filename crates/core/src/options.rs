//! Render options and their cache fingerprint.
//!
//! Every numeric field self-heals to a fixed default when zero, so two option
//! sets that render the same image always produce the same fingerprint.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

/// Viewport width used when none is requested.
pub const DEFAULT_WIDTH: u32 = 1680;

/// Viewport height used when none is requested.
pub const DEFAULT_HEIGHT: u32 = 867;

/// Device scale factor used when none is requested.
pub const DEFAULT_SCALE: f64 = 1.0;

/// Upper bound for encoder quality.
pub const MAX_QUALITY: u8 = 100;

/// Output image format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    /// File extension used for stored artifacts.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            other => Err(Error::InvalidOptions(format!("unsupported image type: {other}"))),
        }
    }
}

/// A fully specified clip region in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ClipRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    fn validate(&self) -> Result<(), Error> {
        let fields = [("x", self.x), ("y", self.y), ("width", self.width), ("height", self.height)];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::InvalidOptions(format!("clip field `{name}` must be a finite number")));
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(Error::InvalidOptions("clip size must not be negative".into()));
        }
        Ok(())
    }
}

/// Clip fields as they arrive from a request, each one optional.
///
/// This is the only place a partially specified clip can exist; [`ClipParts::validate`]
/// turns it into the all-or-nothing form used by [`RenderOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipParts {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl ClipParts {
    /// Resolve the parts into a clip.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidOptions` naming the first missing field when one to
    /// three of the four fields are set.
    pub fn validate(self) -> Result<Option<ClipRect>, Error> {
        match (self.x, self.y, self.width, self.height) {
            (None, None, None, None) => Ok(None),
            (Some(x), Some(y), Some(width), Some(height)) => Ok(Some(ClipRect { x, y, width, height })),
            (x, y, width, _) => {
                let missing = if x.is_none() {
                    "x"
                } else if y.is_none() {
                    "y"
                } else if width.is_none() {
                    "width"
                } else {
                    "height"
                };
                Err(Error::InvalidOptions(format!("validate clip: missing field `{missing}`")))
            }
        }
    }
}

/// How a page should be captured.
///
/// Fields hold what the caller asked for; the accessor methods return the
/// normalized values the renderer and the fingerprint use.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    /// Viewport width in pixels, 0 means [`DEFAULT_WIDTH`].
    pub width: u32,
    /// Viewport height in pixels, 0 means [`DEFAULT_HEIGHT`].
    pub height: u32,
    /// Device scale factor, 0 (or anything not finite and positive) means [`DEFAULT_SCALE`].
    pub scale: f64,
    pub format: ImageFormat,
    /// Encoder quality, clamped to [`MAX_QUALITY`]. Only JPEG honours it.
    pub quality: u8,
    pub clip: Option<ClipRect>,
    /// Capture the whole scrollable page instead of the viewport.
    pub full_page: bool,
    /// Scroll through the page before capture to trigger lazy loading.
    pub scroll_page: bool,
    /// Extra wait after load before capturing.
    pub delay: Duration,
}

impl RenderOptions {
    pub fn width(&self) -> u32 {
        if self.width == 0 { DEFAULT_WIDTH } else { self.width }
    }

    pub fn height(&self) -> u32 {
        if self.height == 0 { DEFAULT_HEIGHT } else { self.height }
    }

    pub fn scale(&self) -> f64 {
        if self.scale.is_finite() && self.scale > 0.0 { self.scale } else { DEFAULT_SCALE }
    }

    pub fn quality(&self) -> u8 {
        self.quality.min(MAX_QUALITY)
    }

    /// Check the option set before any I/O happens.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidOptions` when the clip has non-finite coordinates
    /// or a negative size.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(clip) = &self.clip {
            clip.validate()?;
        }
        Ok(())
    }

    /// Stable digest of the normalized option set.
    ///
    /// Fields are written in a fixed order, newline separated, with floats in
    /// Rust's shortest round-trip notation. Clip values are only written when a
    /// clip is present, behind a `clip` marker, so "no clip" never collides with
    /// a zero-sized one.
    pub fn fingerprint(&self) -> String {
        let mut fields = vec![
            self.width().to_string(),
            self.height().to_string(),
            self.scale().to_string(),
            self.format.to_string(),
            self.quality().to_string(),
            self.full_page.to_string(),
            self.scroll_page.to_string(),
            self.delay.as_millis().to_string(),
        ];

        if let Some(clip) = &self.clip {
            fields.push("clip".to_string());
            fields.extend([clip.x, clip.y, clip.width, clip.height].iter().map(f64::to_string));
        }

        let mut hasher = Sha256::new();
        for field in &fields {
            hasher.update(field.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}
