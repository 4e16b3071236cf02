//! Request id propagation.
//!
//! The id comes from `X-Request-ID` or `CF-Request-ID` when a proxy set one
//! and is generated otherwise. It is written back onto the request so the
//! trace span can pick it up, and echoed on the response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const CF_REQUEST_ID: HeaderName = HeaderName::from_static("cf-request-id");

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// `{start millis}-{pid}-{sequence}` in hex; unique within a process and
/// very unlikely to repeat across restarts.
fn generate_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{millis:x}-{:x}-{seq:08x}", std::process::id())
}

fn incoming_id(request: &Request) -> Option<HeaderValue> {
    [REQUEST_ID, CF_REQUEST_ID]
        .iter()
        .filter_map(|name| request.headers().get(name))
        .find(|value| !value.is_empty())
        .cloned()
}

pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = incoming_id(&request)
        .or_else(|| HeaderValue::from_str(&generate_id()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("unknown"));

    request.headers_mut().insert(REQUEST_ID, id.clone());
    let mut response = next.run(request).await;
    response.headers_mut().insert(REQUEST_ID, id);
    response
}
