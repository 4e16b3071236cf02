//! Cache key and storage path derivation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use url::Url;

use crate::options::{ImageFormat, RenderOptions};

static SALT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Compute the digest identifying a (URL, fingerprint) pair.
///
/// The full SHA-256 is kept everywhere it is used; nothing truncates it.
pub fn compute_cache_key(url: &str, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

/// Unique token for one write: unix nanos, process id and a per-process sequence.
pub fn new_salt() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = SALT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}{:06x}{:04x}", std::process::id(), seq & 0xffff)
}

/// Identity of one cache entry: target URL, options fingerprint and output format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    url: Url,
    fingerprint: String,
    format: ImageFormat,
    digest: String,
}

impl CacheKey {
    pub fn new(url: Url, options: &RenderOptions) -> Self {
        Self::from_parts(url, options.fingerprint(), options.format)
    }

    pub fn from_parts(url: Url, fingerprint: String, format: ImageFormat) -> Self {
        let digest = compute_cache_key(url.as_str(), &fingerprint);
        Self { url, fingerprint, format, digest }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Lowercase hex SHA-256 of `url \n fingerprint`.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Hostname segment used to group objects for listing and debugging.
    pub fn host(&self) -> &str {
        self.url.host_str().filter(|h| !h.is_empty()).unwrap_or("_")
    }

    /// Canonical, human-traceable name of the entry: `{host}/{digest}.{ext}`.
    pub fn path(&self) -> String {
        format!("{}/{}.{}", self.host(), self.digest, self.format.extension())
    }

    /// Stable location of the link object.
    pub fn link_path(&self) -> String {
        format!("{}/{}.link", self.host(), self.digest)
    }

    /// Location of one artifact version; `salt` must be unique per write.
    pub fn artifact_path(&self, salt: &str) -> String {
        format!("{}/{}.{}.{}", self.host(), self.digest, salt, self.format.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key(url: &str, options: &RenderOptions) -> CacheKey {
        CacheKey::new(Url::parse(url).unwrap(), options)
    }

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("https://example.com/", "abc");
        let hash2 = compute_cache_key("https://example.com/", "abc");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_separates_fields() {
        let hash1 = compute_cache_key("https://example.com/a", "bc");
        let hash2 = compute_cache_key("https://example.com/ab", "c");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("https://example.com/", "");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_paths_embed_host_and_digest() {
        let key = key("https://docs.example.com/guide?x=1", &RenderOptions::default());
        let digest = key.digest().to_string();

        assert_eq!(key.path(), format!("docs.example.com/{digest}.png"));
        assert_eq!(key.link_path(), format!("docs.example.com/{digest}.link"));
        assert_eq!(key.artifact_path("s1"), format!("docs.example.com/{digest}.s1.png"));
    }

    #[test]
    fn test_format_changes_extension_and_digest() {
        let png = key("https://example.com/", &RenderOptions::default());
        let jpeg = key(
            "https://example.com/",
            &RenderOptions { format: ImageFormat::Jpeg, ..Default::default() },
        );

        assert!(jpeg.path().ends_with(".jpeg"));
        assert_ne!(png.digest(), jpeg.digest());
    }

    #[test]
    fn test_same_host_different_page() {
        let a = key("https://example.com/a", &RenderOptions::default());
        let b = key("https://example.com/b", &RenderOptions::default());
        assert_eq!(a.host(), b.host());
        assert_ne!(a.link_path(), b.link_path());
    }

    #[test]
    fn test_salt_unique() {
        let salts: HashSet<String> = (0..1000).map(|_| new_salt()).collect();
        assert_eq!(salts.len(), 1000);
    }
}
