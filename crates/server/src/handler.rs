//! HTTP router and shared state.
//!
//! Routes:
//! - `GET /image`: screenshot through the cache
//! - `GET /health`: uptime
//! - `GET /version`: build info
//!
//! Every response carries `X-Request-ID`; requests are traced with the id.
//! A panicking handler answers 500 with the usual JSON error body.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use webshot_core::Service;

use crate::auth::HmacAuth;
use crate::error::ApiError;
use crate::request_id::{REQUEST_ID, request_id};
use crate::routes::{health::health, image::image, version::version};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
    /// Set when requests must be signed.
    pub auth: Option<HmacAuth>,
    pub started: Instant,
}

impl AppState {
    pub fn new(service: Service, auth: Option<HmacAuth>) -> Self {
        Self { service: Arc::new(service), auth, started: Instant::now() }
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = details, "handler panicked");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
}

pub fn create_router(state: AppState) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = request
            .headers()
            .get(REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!("http", method = %request.method(), path = %request.uri().path(), request_id)
    });

    Router::new()
        .route("/image", get(image))
        .route("/health", get(health))
        .route("/version", get(version))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(trace)
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::header;
    use serde_json::Value;
    use tower::ServiceExt;
    use url::Url;
    use webshot_core::cache::memory::{Faults, MemoryBackend};
    use webshot_core::{IndirectBlobStore, RenderError, RenderOptions, Renderer};

    #[derive(Default)]
    struct FakeRenderer {
        calls: AtomicUsize,
        fail: AtomicBool,
        panic: AtomicBool,
    }

    #[async_trait::async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, _url: &Url, opts: &RenderOptions) -> Result<Vec<u8>, RenderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panic.load(Ordering::SeqCst) {
                panic!("renderer blew up");
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(RenderError::Navigation("net::ERR_NAME_NOT_RESOLVED".into()));
            }
            Ok(format!("{}-{n}", opts.format).into_bytes())
        }
    }

    struct TestApp {
        renderer: Arc<FakeRenderer>,
        backend: Arc<MemoryBackend>,
        router: Router,
    }

    fn test_app(auth: Option<HmacAuth>) -> TestApp {
        let renderer = Arc::new(FakeRenderer::default());
        let backend = Arc::new(MemoryBackend::new());
        let store = IndirectBlobStore::new(backend.clone());
        let service = Service::new(renderer.clone())
            .with_storage(Some(Arc::new(store)))
            .with_default_ttl(Duration::from_secs(3600));
        TestApp { renderer, backend, router: create_router(AppState::new(service, auth)) }
    }

    async fn get(router: &Router, uri: &str) -> Response {
        router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_bytes(response: Response) -> bytes::Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_app(None);
        let response = get(&app.router, "/health").await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["uptime"].as_str().unwrap().ends_with('s'));
    }

    #[tokio::test]
    async fn test_version_endpoint() {
        let app = test_app(None);
        let response = get(&app.router, "/version").await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["version"].is_string());
        assert!(json["ref"].is_string());
        assert!(json["time"].is_string());
    }

    #[tokio::test]
    async fn test_image_miss_then_hit() {
        let app = test_app(None);

        let response = get(&app.router, "/image?url=example.com&format=jpeg").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(response.headers()["x-cache"], "MISS");
        assert_eq!(body_bytes(response).await, "jpeg-1");

        let response = get(&app.router, "/image?url=https://example.com/&format=jpeg").await;
        assert_eq!(response.headers()["x-cache"], "HIT");
        assert_eq!(body_bytes(response).await, "jpeg-1");
        assert_eq!(app.renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_image_fresh_rerenders() {
        let app = test_app(None);

        get(&app.router, "/image?url=example.com").await;
        let response = get(&app.router, "/image?url=example.com&fresh=1").await;

        assert_eq!(response.headers()["x-cache"], "MISS");
        assert_eq!(body_bytes(response).await, "png-2");
    }

    #[tokio::test]
    async fn test_image_missing_url() {
        let app = test_app(None);
        let response = get(&app.router, "/image?width=100").await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert!(json["details"].as_str().unwrap().contains("url"));
    }

    #[tokio::test]
    async fn test_image_undecodable_query() {
        let app = test_app(None);
        let response = get(&app.router, "/image?url=example.com&width=wide").await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_image_partial_clip() {
        let app = test_app(None);
        let response = get(&app.router, "/image?url=example.com&clip_x=0&clip_y=0").await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert!(json["details"].as_str().unwrap().contains("missing field `width`"));
        assert_eq!(app.renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_image_render_failure() {
        let app = test_app(None);
        app.renderer.fail.store(true, Ordering::SeqCst);

        let response = get(&app.router, "/image?url=example.com").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["details"].as_str().unwrap().contains("render error"));
    }

    #[tokio::test]
    async fn test_panic_becomes_json_500() {
        let app = test_app(None);
        app.renderer.panic.store(true, Ordering::SeqCst);

        let response = get(&app.router, "/image?url=example.com").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key(REQUEST_ID));
        let json = body_json(response).await;
        assert_eq!(json["details"], "internal error");

        let response = get(&app.router, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_image_storage_failure_hides_paths() {
        let app = test_app(None);
        app.backend.set_faults(Faults { fail_head: true, ..Default::default() }).await;

        let response = get(&app.router, "/image?url=example.com").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let details = body_json(response).await["details"].as_str().unwrap().to_string();
        assert!(details.starts_with("storage error: get"));
        assert!(!details.contains("example.com/"));
        assert_eq!(app.renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_signed_requests() {
        let auth = HmacAuth::new("secret").unwrap();
        let sign = auth.sign([("url", "example.com"), ("width", "640")]);
        let app = test_app(Some(auth));

        let response = get(&app.router, "/image?url=example.com&width=640").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = get(&app.router, "/image?url=example.com&width=640&sign=nothex").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert!(json["details"].as_str().unwrap().contains("signature is not hex encoded"));

        let response = get(&app.router, &format!("/image?url=example.com&width=641&sign={sign}")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = get(&app.router, &format!("/image?width=640&url=example.com&sign={sign}")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_request_id_echoed() {
        let app = test_app(None);

        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").header("X-Request-ID", "abc-123").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");

        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").header("CF-Request-ID", "cf-9").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "cf-9");
    }

    #[tokio::test]
    async fn test_request_id_generated() {
        let app = test_app(None);

        let first = get(&app.router, "/health").await;
        let second = get(&app.router, "/image").await;

        let first = first.headers()["x-request-id"].to_str().unwrap().to_string();
        let second = second.headers()["x-request-id"].to_str().unwrap().to_string();
        assert!(!first.is_empty());
        assert_ne!(first, second);
    }
}
