//! `GET /health`: liveness with uptime.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::handler::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub uptime: String,
}

/// Render a duration as `1h2m3.5s`, dropping leading zero units.
pub fn humanize(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes) = (total / 3600, total % 3600 / 60);
    let seconds = (total % 60) as f64 + f64::from(elapsed.subsec_millis()) / 1000.0;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&format!("{seconds}s"));
    out
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { uptime: humanize(state.started.elapsed()) })
}
