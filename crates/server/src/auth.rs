//! HMAC request signing.
//!
//! The signed message is every query parameter except the signature itself,
//! sorted by name and joined as `name=value` with `|`. The signature is the
//! hex HMAC-SHA256 of that message.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Query parameter carrying the signature.
pub const SIGN_PARAM: &str = "sign";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("signature is not hex encoded")]
    NotHex,

    #[error("invalid hmac signature")]
    Invalid,
}

/// Verifies request signatures against a shared key.
#[derive(Clone)]
pub struct HmacAuth {
    mac: HmacSha256,
}

impl std::fmt::Debug for HmacAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacAuth").finish_non_exhaustive()
    }
}

impl HmacAuth {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, hmac::digest::InvalidLength> {
        let mac = <HmacSha256 as Mac>::new_from_slice(key.as_ref())?;
        Ok(Self { mac })
    }

    /// Canonical message for a decoded query. Only the first value of a
    /// repeated parameter is signed.
    pub fn message<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
        let mut sorted = BTreeMap::new();
        for (name, value) in params {
            if name != SIGN_PARAM {
                sorted.entry(name).or_insert(value);
            }
        }
        sorted
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Hex signature for a decoded query.
    pub fn sign<'a>(&self, params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
        let mut mac = self.mac.clone();
        mac.update(Self::message(params).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check the `sign` parameter of a raw query string.
    ///
    /// # Errors
    ///
    /// `AuthError::NotHex` when the signature does not decode,
    /// `AuthError::Invalid` when it does not match.
    pub fn verify_query(&self, query: &str) -> Result<(), AuthError> {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes()).into_owned().collect();
        let signature = pairs
            .iter()
            .find(|(name, _)| name == SIGN_PARAM)
            .map(|(_, value)| value.as_str())
            .unwrap_or_default();
        let signature = hex::decode(signature).map_err(|_| AuthError::NotHex)?;

        let mut mac = self.mac.clone();
        mac.update(Self::message(pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))).as_bytes());
        mac.verify_slice(&signature).map_err(|_| AuthError::Invalid)
    }
}
