//! `GET /version`: build information.
//!
//! Values come from `WEBSHOT_BUILD_VERSION`, `WEBSHOT_BUILD_REF` and
//! `WEBSHOT_BUILD_TIME` at compile time.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    #[serde(rename = "ref")]
    pub git_ref: &'static str,
    pub time: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            version: match option_env!("WEBSHOT_BUILD_VERSION") {
                Some(version) => version,
                None => env!("CARGO_PKG_VERSION"),
            },
            git_ref: match option_env!("WEBSHOT_BUILD_REF") {
                Some(git_ref) => git_ref,
                None => "unknown",
            },
            time: match option_env!("WEBSHOT_BUILD_TIME") {
                Some(time) => time,
                None => "unknown",
            },
        }
    }
}

pub async fn version() -> Json<BuildInfo> {
    Json(BuildInfo::current())
}
