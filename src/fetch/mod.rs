//! Fetcher module for outbound HTTP retrieval
//!
//! This module contains everything that touches the network:
//! - Building the HTTP client with the configured user agent and headers
//! - Per-attempt timeouts, retries with exponential backoff and jitter
//! - Manual redirect handling with loop detection
//! - Per-host concurrency limiting
//! - Cancellation through a caller-supplied token

mod fetcher;
mod limiter;
mod retry;

pub use fetcher::{build_http_client, Fetcher};
pub use limiter::HostLimiter;
pub use retry::{backoff_base_delay, backoff_delay, with_jitter};

use crate::url::{host_key, matches_host};
use crate::{NetworkError, ResolveError};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A fetched provider page
///
/// Owned by the resolution that fetched it and never shared between requests.
#[derive(Debug, Clone)]
pub struct RawPage {
    /// The URL that was requested
    pub requested_url: Url,

    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status code of the final response
    pub status: u16,

    /// Content-Type header value
    pub content_type: Option<String>,

    /// Response body
    pub body: String,

    /// When the response was received
    pub fetched_at: DateTime<Utc>,
}

impl RawPage {
    /// Wraps already-retrieved content as a page served with HTTP 200
    pub fn new(url: Url, body: impl Into<String>) -> Self {
        Self {
            requested_url: url.clone(),
            final_url: url,
            status: 200,
            content_type: None,
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// Per-request overrides of the fetcher defaults
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Extra headers for this request
    pub headers: HeaderMap,

    /// Per-attempt timeout (defaults to `fetch.timeout-ms`)
    pub timeout: Option<Duration>,

    /// Redirect limit (defaults to `fetch.max-redirects`)
    pub max_redirects: Option<u32>,

    /// Attempt limit (defaults to `fetch.max-attempts`)
    pub max_attempts: Option<u32>,

    /// Host patterns a redirect may lead to, besides the requested host
    ///
    /// `None` follows redirects to any host.
    pub redirect_hosts: Option<Vec<String>>,
}

impl FetchOptions {
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn redirect_hosts(mut self, hosts: Vec<String>) -> Self {
        self.redirect_hosts = Some(hosts);
        self
    }

    /// Returns true if a redirect from `origin` may continue to `next`
    pub fn allows_redirect(&self, origin: &Url, next: &Url) -> bool {
        match &self.redirect_hosts {
            None => true,
            Some(hosts) => {
                host_key(origin) == host_key(next)
                    || hosts.iter().any(|pattern| matches_host(pattern, next))
            }
        }
    }
}

/// Errors returned by [`Fetcher::fetch`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Retries exhausted or a non-retryable network failure
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The provider answered with a 4xx; never retried
    #[error("HTTP {status} from {url}")]
    Rejected { status: u16, url: String },

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns true if the provider definitively reported the page as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Rejected { status: 404 | 410, .. })
    }
}

impl From<FetchError> for ResolveError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Network(e) => ResolveError::Network(e),
            FetchError::Rejected { status, url } => ResolveError::Rejected { url, status },
            FetchError::Cancelled => ResolveError::Cancelled,
        }
    }
}
