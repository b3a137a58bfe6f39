//! URL handling module
//!
//! This module provides URL normalization for cache fingerprints and host
//! allowlist matching for provider selection.

mod matcher;
mod normalize;

pub use matcher::{matches_host, matches_wildcard, split_port};
pub use normalize::normalize_url;

use url::Url;

/// Returns the key used to group requests by host ("host" or "host:port")
///
/// The default port of the scheme is omitted, so `https://rezka.ag/` and
/// `https://rezka.ag:443/` share one key.
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}
