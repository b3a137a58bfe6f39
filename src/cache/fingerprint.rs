//! Stable cache keys derived from request parameters

use crate::providers::{ProviderKind, StreamRequest};
use sha2::{Digest, Sha256};
use url::Url;

/// Fingerprint of a catalog request
///
/// The URL should already be normalized so that equivalent URLs share a key.
pub fn catalog_fingerprint(provider: ProviderKind, url: &Url) -> String {
    digest(&format!("catalog|{}|{}", provider, url))
}

/// Fingerprint of a stream request
pub fn stream_fingerprint(request: &StreamRequest) -> String {
    digest(&format!(
        "stream|{}|{}|{}|{}",
        request.provider, request.series_ref, request.season, request.episode
    ))
}

fn digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
