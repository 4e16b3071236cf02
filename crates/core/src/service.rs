//! Screenshot service: cache lookup, render, persist.
//!
//! One request walks a small state machine:
//!
//! ```text
//! Start ──fresh──▶ Render ──▶ Persist ──▶ Done
//!   │                ▲           │
//!   ▼                │           ▼
//! CacheLookup ──miss/expired/corrupted     Failed
//!   │
//!   ▼
//! CacheHit ──▶ Done
//! ```
//!
//! Only not-found, expired and corrupted entries are recovered by rendering;
//! backend failures, render failures and persist failures fail the request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::Error;
use crate::cache::{BlobStore, CacheError, CacheKey, Upload};
use crate::canonical::canonicalize;
use crate::options::{ImageFormat, RenderOptions};
use crate::render::{RenderError, Renderer};

/// TTL used when neither the request nor the service configures one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Per-request cache directives.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Lifetime of a newly written entry. `None` or zero uses the service default.
    pub ttl: Option<Duration>,
    /// Skip the lookup and always render (the result is still stored).
    pub fresh: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ShotOptions {
    pub render: RenderOptions,
    pub cache: CacheOptions,
}

/// Where a returned image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotSource {
    Cache,
    Render,
}

impl ShotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotSource::Cache => "HIT",
            ShotSource::Render => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Shot {
    pub body: Bytes,
    pub format: ImageFormat,
    pub source: ShotSource,
}

impl Shot {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

enum State {
    Start,
    CacheLookup,
    CacheHit(Bytes),
    Render,
    Persist(Bytes),
    Done(Shot),
    Failed(Error),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Start => "start",
            State::CacheLookup => "cache_lookup",
            State::CacheHit(_) => "cache_hit",
            State::Render => "render",
            State::Persist(_) => "persist",
            State::Done(_) => "done",
            State::Failed(_) => "failed",
        }
    }
}

/// Cache-fronted screenshot service.
#[derive(Clone)]
pub struct Service {
    renderer: Arc<dyn Renderer>,
    storage: Option<Arc<dyn BlobStore>>,
    default_ttl: Duration,
    render_timeout: Option<Duration>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("storage", &self.storage.is_some())
            .field("default_ttl", &self.default_ttl)
            .field("render_timeout", &self.render_timeout)
            .finish_non_exhaustive()
    }
}

impl Service {
    /// A service that renders every request.
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer, storage: None, default_ttl: DEFAULT_TTL, render_timeout: None }
    }

    pub fn with_storage(mut self, storage: Option<Arc<dyn BlobStore>>) -> Self {
        self.storage = storage;
        self
    }

    /// Replace the fallback TTL; zero keeps [`DEFAULT_TTL`].
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        if !ttl.is_zero() {
            self.default_ttl = ttl;
        }
        self
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = Some(timeout);
        self
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// Produce an image for `target_url`, from cache when possible.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidOptions` / `Error::InvalidUrl` before any I/O
    /// - `Error::Render` when rendering fails or times out
    /// - `Error::Storage` when the store fails on lookup or upload
    pub async fn shot(&self, target_url: &str, opts: &ShotOptions) -> Result<Shot, Error> {
        opts.render.validate()?;
        let url = canonicalize(target_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let Some(storage) = &self.storage else {
            let body = self.render(&url, &opts.render).await?;
            return Ok(Shot { body, format: opts.render.format, source: ShotSource::Render });
        };

        let key = CacheKey::new(url, &opts.render);
        let ttl = match opts.cache.ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => self.default_ttl,
        };

        let mut state = State::Start;
        loop {
            state = match state {
                State::Start if opts.cache.fresh => State::Render,
                State::Start => State::CacheLookup,
                State::CacheLookup => match storage.get(&key).await {
                    Ok(body) => State::CacheHit(body),
                    Err(CacheError::NotFound) => State::Render,
                    Err(CacheError::Expired) => {
                        tracing::debug!(key = %key.digest(), "cache entry expired");
                        State::Render
                    }
                    Err(CacheError::Corrupted(reason)) => {
                        tracing::warn!(
                            key = %key.digest(),
                            url = %key.url(),
                            %reason,
                            "corrupted cache entry, re-rendering"
                        );
                        State::Render
                    }
                    Err(e @ CacheError::Backend(_)) => State::Failed(Error::storage("get", &key, e)),
                },
                State::CacheHit(body) => State::Done(Shot { body, format: key.format(), source: ShotSource::Cache }),
                State::Render => match self.render(key.url(), &opts.render).await {
                    Ok(body) => State::Persist(body),
                    Err(e) => State::Failed(e),
                },
                State::Persist(body) => {
                    let upload = Upload { key: key.clone(), ttl, body: body.clone() };
                    match storage.upload(upload).await {
                        Ok(()) => State::Done(Shot { body, format: key.format(), source: ShotSource::Render }),
                        Err(e) => State::Failed(Error::storage("upload", &key, e)),
                    }
                }
                State::Done(shot) => return Ok(shot),
                State::Failed(err) => {
                    tracing::error!(key = %key.digest(), url = %key.url(), error = %err, "shot failed");
                    return Err(err);
                }
            };
            tracing::debug!(key = %key.digest(), state = state.name(), "transition");
        }
    }

    async fn render(&self, url: &url::Url, opts: &RenderOptions) -> Result<Bytes, Error> {
        let started = Instant::now();
        let rendered = match self.render_timeout {
            Some(limit) => tokio::time::timeout(limit, self.renderer.render(url, opts))
                .await
                .map_err(|_| RenderError::Timeout(limit.as_millis() as u64))?,
            None => self.renderer.render(url, opts).await,
        };
        let body = rendered?;

        tracing::info!(
            url = %url,
            format = %opts.format,
            bytes = body.len(),
            took_ms = started.elapsed().as_millis() as u64,
            "rendered"
        );
        Ok(Bytes::from(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::{Metadata, ObjectBackend, PutObject};
    use crate::cache::indirect::{IndirectBlobStore, META_LATEST, META_TTL};
    use crate::cache::memory::{Faults, MemoryBackend};
    use crate::options::ClipRect;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeRenderer {
        calls: AtomicUsize,
        fail: AtomicBool,
        delay: Option<Duration>,
    }

    impl FakeRenderer {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, url: &url::Url, _opts: &RenderOptions) -> Result<Vec<u8>, RenderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(RenderError::Navigation(format!("{url} unreachable")));
            }
            Ok(format!("render-{n}").into_bytes())
        }
    }

    struct Fixture {
        renderer: Arc<FakeRenderer>,
        backend: Arc<MemoryBackend>,
        store: IndirectBlobStore,
        service: Service,
    }

    fn fixture() -> Fixture {
        let renderer = Arc::new(FakeRenderer::default());
        let backend = Arc::new(MemoryBackend::new());
        let store = IndirectBlobStore::new(backend.clone());
        let service = Service::new(renderer.clone()).with_storage(Some(Arc::new(store.clone())));
        Fixture { renderer, backend, store, service }
    }

    fn key_for(url: &str, opts: &ShotOptions) -> CacheKey {
        CacheKey::new(canonicalize(url).unwrap(), &opts.render)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let f = fixture();
        let opts = ShotOptions::default();

        let first = f.service.shot("https://example.com/", &opts).await.unwrap();
        assert_eq!(first.source, ShotSource::Render);
        assert_eq!(first.body, Bytes::from_static(b"render-1"));
        assert_eq!(first.content_type(), "image/png");

        let second = f.service.shot("https://example.com/", &opts).await.unwrap();
        assert_eq!(second.source, ShotSource::Cache);
        assert_eq!(second.body, first.body);
        assert_eq!(f.renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_equivalent_urls_share_entry() {
        let f = fixture();
        let opts = ShotOptions::default();

        f.service.shot("https://Example.com/page#top", &opts).await.unwrap();
        let again = f.service.shot("  example.com/page ", &opts).await.unwrap();

        assert_eq!(again.source, ShotSource::Cache);
        assert_eq!(f.renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_different_options_miss() {
        let f = fixture();
        let mut opts = ShotOptions::default();
        f.service.shot("https://example.com/", &opts).await.unwrap();

        opts.render.width = 800;
        let other = f.service.shot("https://example.com/", &opts).await.unwrap();
        assert_eq!(other.source, ShotSource::Render);

        opts.render.width = 0;
        opts.render.format = ImageFormat::Jpeg;
        let jpeg = f.service.shot("https://example.com/", &opts).await.unwrap();
        assert_eq!(jpeg.source, ShotSource::Render);
        assert_eq!(jpeg.content_type(), "image/jpeg");
        assert_eq!(f.renderer.calls(), 3);
    }

    #[tokio::test]
    async fn test_fresh_always_renders_and_supersedes() {
        let f = fixture();
        let mut opts = ShotOptions::default();
        let key = key_for("https://example.com/", &opts);

        f.service.shot("https://example.com/", &opts).await.unwrap();
        let first_artifact = f.store.link(&key).await.unwrap().latest;

        opts.cache.fresh = true;
        let forced = f.service.shot("https://example.com/", &opts).await.unwrap();
        assert_eq!(forced.source, ShotSource::Render);
        assert_eq!(forced.body, Bytes::from_static(b"render-2"));
        assert_ne!(f.store.link(&key).await.unwrap().latest, first_artifact);

        opts.cache.fresh = false;
        let cached = f.service.shot("https://example.com/", &opts).await.unwrap();
        assert_eq!(cached.source, ShotSource::Cache);
        assert_eq!(cached.body, Bytes::from_static(b"render-2"));
    }

    #[tokio::test]
    async fn test_expired_entry_rerenders() {
        let f = fixture();
        let opts = ShotOptions::default();
        let key = key_for("https://example.com/", &opts);

        f.service.shot("https://example.com/", &opts).await.unwrap();
        f.backend.backdate(&f.store.link_path(&key), DEFAULT_TTL + Duration::from_secs(1)).await;

        let shot = f.service.shot("https://example.com/", &opts).await.unwrap();
        assert_eq!(shot.source, ShotSource::Render);
        assert_eq!(f.renderer.calls(), 2);
    }

    #[tokio::test]
    async fn test_corrupted_entry_rerenders() {
        let f = fixture();
        let opts = ShotOptions::default();
        let key = key_for("https://example.com/", &opts);
        let mut metadata = Metadata::new();
        metadata.insert(META_LATEST.into(), "example.com/x.png".into());
        f.backend
            .put_object(&f.store.link_path(&key), PutObject { metadata, ..Default::default() })
            .await
            .unwrap();

        let shot = f.service.shot("https://example.com/", &opts).await.unwrap();
        assert_eq!(shot.source, ShotSource::Render);

        let again = f.service.shot("https://example.com/", &opts).await.unwrap();
        assert_eq!(again.source, ShotSource::Cache, "re-render repaired the link");
    }

    #[tokio::test]
    async fn test_lookup_backend_failure_does_not_render() {
        let f = fixture();
        f.backend.set_faults(Faults { fail_head: true, ..Default::default() }).await;

        let result = f.service.shot("https://example.com/", &ShotOptions::default()).await;

        assert!(matches!(result, Err(Error::Storage { op: "get", .. })));
        assert_eq!(f.renderer.calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_fails_request() {
        let f = fixture();
        f.backend
            .set_faults(Faults { fail_put_suffix: Some(".link".into()), ..Default::default() })
            .await;

        let result = f.service.shot("https://example.com/", &ShotOptions::default()).await;

        assert!(matches!(result, Err(Error::Storage { op: "upload", .. })));
        assert_eq!(f.renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_storage_error_hides_paths() {
        let f = fixture();
        f.backend.set_faults(Faults { fail_head: true, ..Default::default() }).await;
        let opts = ShotOptions::default();
        let key = key_for("https://example.com/", &opts);

        let err = f.service.shot("https://example.com/", &opts).await.unwrap_err();
        let Error::Storage { key: digest, .. } = &err else {
            panic!("expected storage error, got {err:?}");
        };
        assert_eq!(digest, key.digest());
    }

    #[tokio::test]
    async fn test_render_failure_stores_nothing() {
        let f = fixture();
        f.renderer.fail.store(true, Ordering::SeqCst);

        let result = f.service.shot("https://example.com/", &ShotOptions::default()).await;

        assert!(matches!(result, Err(Error::Render(RenderError::Navigation(_)))));
        assert!(f.backend.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_render_timeout() {
        let renderer = Arc::new(FakeRenderer { delay: Some(Duration::from_millis(200)), ..Default::default() });
        let service = Service::new(renderer).with_render_timeout(Duration::from_millis(20));

        let result = service.shot("https://example.com/", &ShotOptions::default()).await;
        assert!(matches!(result, Err(Error::Render(RenderError::Timeout(20)))));
    }

    #[tokio::test]
    async fn test_ttl_defaults_and_overrides() {
        let f = fixture();
        let mut opts = ShotOptions::default();

        f.service.shot("https://a.example/", &opts).await.unwrap();
        let head = f.backend.head_object(&f.store.link_path(&key_for("https://a.example/", &opts))).await.unwrap();
        assert_eq!(head.metadata.get(META_TTL), Some(&DEFAULT_TTL.as_secs().to_string()));

        opts.cache.ttl = Some(Duration::from_secs(600));
        f.service.shot("https://b.example/", &opts).await.unwrap();
        let head = f.backend.head_object(&f.store.link_path(&key_for("https://b.example/", &opts))).await.unwrap();
        assert_eq!(head.metadata.get(META_TTL).map(String::as_str), Some("600"));

        opts.cache.ttl = Some(Duration::ZERO);
        let service = f.service.clone().with_default_ttl(Duration::from_secs(42));
        service.shot("https://c.example/", &opts).await.unwrap();
        let head = f.backend.head_object(&f.store.link_path(&key_for("https://c.example/", &opts))).await.unwrap();
        assert_eq!(head.metadata.get(META_TTL).map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn test_huge_ttl_still_hits() {
        let f = fixture();
        let mut opts = ShotOptions::default();
        opts.cache.ttl = Some(Duration::from_secs(10_000_000_000_000_000_000));

        f.service.shot("https://example.com/", &opts).await.unwrap();
        let again = f.service.shot("https://example.com/", &opts).await.unwrap();

        assert_eq!(again.source, ShotSource::Cache);
        assert_eq!(f.renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_without_storage_always_renders() {
        let renderer = Arc::new(FakeRenderer::default());
        let service = Service::new(renderer.clone());
        let opts = ShotOptions {
            cache: CacheOptions { fresh: false, ttl: Some(Duration::from_secs(5)) },
            ..Default::default()
        };

        for _ in 0..3 {
            let shot = service.shot("https://example.com/", &opts).await.unwrap();
            assert_eq!(shot.source, ShotSource::Render);
        }
        assert_eq!(renderer.calls(), 3);
        assert!(!service.has_storage());
    }

    #[tokio::test]
    async fn test_rejects_bad_input_before_io() {
        let f = fixture();

        let result = f.service.shot("ftp://example.com/", &ShotOptions::default()).await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));

        let result = f.service.shot("", &ShotOptions::default()).await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));

        let mut opts = ShotOptions::default();
        opts.render.clip = Some(ClipRect::new(0.0, 0.0, f64::NAN, 10.0));
        let result = f.service.shot("https://example.com/", &opts).await;
        assert!(matches!(result, Err(Error::InvalidOptions(_))));

        assert_eq!(f.renderer.calls(), 0);
        assert!(f.backend.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_cold_requests_all_succeed() {
        let f = fixture();
        let opts = ShotOptions::default();

        let (a, b) = tokio::join!(
            f.service.shot("https://example.com/", &opts),
            f.service.shot("https://example.com/", &opts),
        );
        assert!(a.is_ok() && b.is_ok());

        let cached = f.service.shot("https://example.com/", &opts).await.unwrap();
        assert_eq!(cached.source, ShotSource::Cache);
        assert!(cached.body == Bytes::from_static(b"render-1") || cached.body == Bytes::from_static(b"render-2"));
    }
}
