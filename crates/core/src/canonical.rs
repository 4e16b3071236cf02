//! Target URL canonicalization for stable cache keys.
//!
//! `Example.com/a#top`, ` https://example.com/a ` and `https://EXAMPLE.com/a`
//! all name the same page and must land on the same cache entry. Only
//! differences a server could observe survive: scheme, port, path and the
//! query string, which is kept byte for byte.

use url::Url;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse `input` into the URL that is rendered and hashed.
///
/// A bare `host/path` is taken as https. Only http and https are accepted.
/// The fragment never reaches the server, so it is dropped. Host case is
/// folded by the parser for both schemes.
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut url = if input.contains("://") {
        Url::parse(input)
    } else {
        Url::parse(&format!("https://{input}"))
    }
    .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);
    Ok(url)
}
