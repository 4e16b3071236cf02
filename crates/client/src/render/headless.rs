//! chromiumoxide-driven screenshot capture.

use std::time::Instant;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::handler::Handler;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use url::Url;
use webshot_core::{ImageFormat, RenderError, RenderOptions, Renderer};

use super::ChromeResolver;

/// Scrolls one viewport at a time to the bottom, then back to the top, so
/// lazily loaded content is present at capture time.
const SCROLL_SCRIPT: &str = r#"
(async () => {
  const step = Math.max(window.innerHeight, 1);
  for (let y = 0; y < document.body.scrollHeight; y += step) {
    window.scrollTo(0, y);
    await new Promise((resolve) => setTimeout(resolve, 100));
  }
  window.scrollTo(0, 0);
})()
"#;

/// Settings for a locally launched browser.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// Extra Chromium command line flags.
    pub args: Vec<String>,
}

enum BrowserSource {
    Local { browser: Browser, handler: JoinHandle<()> },
    Remote(ChromeResolver),
}

/// Headless Chrome/Chromium renderer using chromiumoxide.
pub struct HeadlessRenderer {
    source: BrowserSource,
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A tab that gets closed on every exit path.
///
/// If the render future is dropped before [`OpenPage::close`] runs (timeout,
/// client gone), the close is sent from a background task instead. The
/// `keep_alive` handler of a per-render connection is held until then.
struct OpenPage {
    page: Page,
    closed: bool,
    keep_alive: Option<AbortOnDrop>,
}

impl OpenPage {
    async fn close(mut self) {
        self.closed = true;
        self.page.clone().close().await.ok();
    }
}

impl Drop for OpenPage {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let page = self.page.clone();
        let keep_alive = self.keep_alive.take();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            tracing::debug!("render abandoned, closing page in background");
            runtime.spawn(async move {
                page.close().await.ok();
                drop(keep_alive);
            });
        }
    }
}

fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::debug!("browser handler event error: {e}");
                break;
            }
        }
    })
}

impl HeadlessRenderer {
    /// Launch a local headless browser shared by all renders.
    ///
    /// The browser uses a background task to handle Chrome DevTools
    /// Protocol events.
    pub async fn launch(options: &BrowserOptions) -> Result<Self, RenderError> {
        let config = BrowserConfig::builder()
            .args(options.args.iter().cloned())
            .build()
            .map_err(RenderError::BrowserLaunch)?;

        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;

        tracing::info!("launched local browser");
        Ok(Self { source: BrowserSource::Local { browser, handler: spawn_handler(handler) } })
    }

    /// Render on a remote browser, connecting afresh for every render.
    pub fn remote(resolver: ChromeResolver) -> Self {
        Self { source: BrowserSource::Remote(resolver) }
    }

    /// Remote when `browser_addr` is set, local launch otherwise.
    pub async fn from_addr(browser_addr: Option<&str>, options: &BrowserOptions) -> Result<Self, RenderError> {
        match browser_addr {
            Some(addr) => Ok(Self::remote(ChromeResolver::new(addr)?)),
            None => Self::launch(options).await,
        }
    }

    async fn capture(
        browser: &Browser,
        url: &Url,
        opts: &RenderOptions,
        keep_alive: Option<AbortOnDrop>,
    ) -> Result<Vec<u8>, RenderError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Capture(format!("open page: {e}")))?;
        let page = OpenPage { page, closed: false, keep_alive };

        let result = Self::capture_page(&page.page, url, opts).await;
        page.close().await;
        result
    }

    async fn capture_page(page: &Page, url: &Url, opts: &RenderOptions) -> Result<Vec<u8>, RenderError> {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(opts.width()))
            .height(i64::from(opts.height()))
            .device_scale_factor(opts.scale())
            .mobile(false)
            .build()
            .map_err(RenderError::Capture)?;
        page.execute(metrics)
            .await
            .map_err(|e| RenderError::Capture(format!("emulate viewport: {e}")))?;

        let started = Instant::now();
        page.goto(url.as_str())
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        tracing::debug!(%url, took_ms = started.elapsed().as_millis() as u64, "navigated");

        if opts.scroll_page {
            page.evaluate(SCROLL_SCRIPT)
                .await
                .map_err(|e| RenderError::Capture(format!("scroll page: {e}")))?;
        }

        if !opts.delay.is_zero() {
            tokio::time::sleep(opts.delay).await;
        }

        let format = match opts.format {
            ImageFormat::Png => CaptureScreenshotFormat::Png,
            ImageFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
        };
        let mut params = ScreenshotParams::builder().format(format).full_page(opts.full_page);
        if opts.format == ImageFormat::Jpeg && opts.quality() > 0 {
            params = params.quality(i64::from(opts.quality()));
        }
        if let Some(clip) = &opts.clip {
            params = params.clip(Viewport { x: clip.x, y: clip.y, width: clip.width, height: clip.height, scale: 1.0 });
        }

        page.screenshot(params.build())
            .await
            .map_err(|e| RenderError::Capture(format!("screenshot: {e}")))
    }
}

impl Drop for HeadlessRenderer {
    fn drop(&mut self) {
        if let BrowserSource::Local { handler, .. } = &self.source {
            handler.abort();
        }
    }
}

#[async_trait::async_trait]
impl Renderer for HeadlessRenderer {
    async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<Vec<u8>, RenderError> {
        let started = Instant::now();

        let result = match &self.source {
            BrowserSource::Local { browser, .. } => Self::capture(browser, url, opts, None).await,
            BrowserSource::Remote(resolver) => {
                let ws = resolver.resolve().await?;
                tracing::debug!(url = %ws, "use remote browser");
                let (browser, handler) = Browser::connect(ws)
                    .await
                    .map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;
                let handler = AbortOnDrop(spawn_handler(handler));
                Self::capture(&browser, url, opts, Some(handler)).await
            }
        };

        let took = started.elapsed();
        match &result {
            Ok(bytes) => tracing::debug!(
                %url,
                width = opts.width(),
                height = opts.height(),
                scale = opts.scale(),
                format = %opts.format,
                bytes = bytes.len(),
                took_ms = took.as_millis() as u64,
                "screenshot"
            ),
            Err(e) => tracing::warn!(%url, error = %e, took_ms = took.as_millis() as u64, "screenshot failed"),
        }
        result
    }
}
