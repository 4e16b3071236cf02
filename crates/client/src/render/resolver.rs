//! Remote browser address resolution.
//!
//! A remote browser is given either as a DevTools websocket URL, used as-is,
//! or as the browser's HTTP debugging endpoint. The websocket URL changes
//! every time the browser restarts, so HTTP endpoints are resolved through
//! `/json/version` on every render.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use url::Url;
use webshot_core::RenderError;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Finds the websocket URL of a remote browser.
#[derive(Debug, Clone)]
pub enum ChromeResolver {
    /// `ws://` or `wss://` address returned unchanged.
    Static(String),
    /// `http://` or `https://` DevTools endpoint queried on each call.
    DevTools { endpoint: Url, http: Client },
}

impl ChromeResolver {
    /// Pick a resolver from the address scheme.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::BrowserResolve` for unparseable addresses and
    /// schemes other than ws, wss, http and https.
    pub fn new(addr: &str) -> Result<Self, RenderError> {
        let url = Url::parse(addr.trim()).map_err(|e| RenderError::BrowserResolve(format!("invalid addr: {e}")))?;

        match url.scheme() {
            "ws" | "wss" => Ok(Self::Static(url.to_string())),
            "http" | "https" => {
                let http = Client::builder()
                    .timeout(RESOLVE_TIMEOUT)
                    .use_rustls_tls()
                    .build()
                    .map_err(|e| RenderError::BrowserResolve(format!("failed to build HTTP client: {e}")))?;
                Ok(Self::DevTools { endpoint: url, http })
            }
            scheme => Err(RenderError::BrowserResolve(format!("unsupported scheme '{scheme}'"))),
        }
    }

    /// Current websocket debugger URL of the browser.
    pub async fn resolve(&self) -> Result<String, RenderError> {
        match self {
            Self::Static(ws) => Ok(ws.clone()),
            Self::DevTools { endpoint, http } => {
                let base = endpoint.as_str().trim_end_matches('/');
                let lookup = format!("{base}/json/version");

                let response = http
                    .get(&lookup)
                    .send()
                    .await
                    .map_err(|e| RenderError::BrowserResolve(format!("devtools lookup request: {e}")))?;
                if !response.status().is_success() {
                    return Err(RenderError::BrowserResolve(format!(
                        "devtools lookup returned {}",
                        response.status()
                    )));
                }

                let info: VersionInfo = response
                    .json()
                    .await
                    .map_err(|e| RenderError::BrowserResolve(format!("decode devtools lookup response: {e}")))?;
                tracing::debug!(url = %info.web_socket_debugger_url, "resolved remote browser");
                Ok(info.web_socket_debugger_url)
            }
        }
    }
}
