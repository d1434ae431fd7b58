//! Content addresses for URLs and payloads

use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// SHA-256 content address of a normalized URL or a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint of a URL; callers pass the normalized form
    pub fn of_url(url: &Url) -> Self {
        Self::of_bytes(url.as_str().as_bytes())
    }

    /// Fingerprint of arbitrary bytes, used for payload digests
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Self(digest)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Digest label in the form WARC headers use
    pub fn warc_digest(&self) -> String {
        format!("sha256:{}", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
