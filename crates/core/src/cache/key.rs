//! Request keys for cache entries.
//!
//! A key is the request method plus the canonical URL. Entries are stored
//! under the SHA-256 of both so lookups hit a fixed-width primary key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Compute the content-addressed hash for a method and canonical URL.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// The identity of a cached request within one generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
    pub hash: String,
}

impl RequestKey {
    /// Build a key from a method and an already canonical URL.
    ///
    /// Fragments never reach the network, so they are dropped here as well.
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        let method = method.to_ascii_uppercase();
        let hash = compute_cache_key(&method, url.as_str());
        Self { method, url: url.into(), hash }
    }

    /// Key for a plain `GET`, the only method the strategies ever store.
    pub fn get(url: &Url) -> Self {
        Self::new("GET", url)
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
