//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests made while resolving, including:
//! - Building HTTP clients with the configured user agent string
//! - GET requests with a hard timeout per attempt
//! - Retry logic for transient failures
//! - Redirect handling with a per-request host allowlist
//! - Error classification

use crate::config::FetchConfig;
use crate::fetch::limiter::HostLimiter;
use crate::fetch::retry::{backoff_delay, classify_reqwest_error, AttemptError};
use crate::fetch::{FetchError, FetchOptions, RawPage};
use crate::url::host_key;
use crate::{NetworkError, NetworkErrorKind};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// Redirects are disabled at the client level and followed manually so that
/// loops and chain length can be controlled per request.
///
/// # Example
///
/// ```no_run
/// use reel_resolver::config::FetchConfig;
/// use reel_resolver::fetch::build_http_client;
///
/// let client = build_http_client(&FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        // Invalid entries are rejected by config validation
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .connect_timeout(config.timeout().min(Duration::from_secs(10)))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Outbound HTTP fetcher shared by all resolutions
///
/// The fetcher holds no per-request state; the only shared pieces are the
/// per-host permit map and a request counter.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    limiter: HostLimiter,
    requests: AtomicU64,
}

impl Fetcher {
    /// Creates a fetcher from the fetch configuration
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            config: config.clone(),
            limiter: HostLimiter::new(config.max_concurrent_per_host as usize),
            requests: AtomicU64::new(0),
        })
    }

    /// Number of HTTP requests issued so far (every redirect hop and retry counts)
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Fetches a URL with retry, redirect handling and cancellation
    ///
    /// # Returns
    ///
    /// * `Ok(RawPage)` - A 2xx response body
    /// * `Err(FetchError::Rejected)` - The provider answered with a 4xx (not retried)
    /// * `Err(FetchError::Network)` - Retries exhausted, or a redirect failure
    /// * `Err(FetchError::Cancelled)` - The token was cancelled; the connection is dropped
    pub async fn fetch(
        &self,
        url: &Url,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<RawPage, FetchError> {
        let max_attempts = options
            .max_attempts
            .unwrap_or(self.config.max_attempts)
            .max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let kind = match self.attempt(url, options, cancel).await {
                Ok(page) => {
                    tracing::debug!(
                        "Fetched {} (HTTP {}, {} bytes, attempt {})",
                        page.final_url,
                        page.status,
                        page.body.len(),
                        attempt
                    );
                    return Ok(page);
                }
                Err(AttemptError::Cancelled) => return Err(FetchError::Cancelled),
                Err(AttemptError::Rejected { status, url }) => {
                    tracing::debug!("{} rejected with HTTP {}", url, status);
                    return Err(FetchError::Rejected { status, url });
                }
                Err(AttemptError::Fatal(kind)) => {
                    return Err(self.network_error(kind, attempt, url));
                }
                Err(AttemptError::Transient(kind)) => kind,
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    "Giving up on {} after {} attempt(s): {}",
                    url,
                    attempt,
                    kind
                );
                return Err(self.network_error(kind, attempt, url));
            }

            let delay = backoff_delay(self.config.backoff_base(), attempt);
            tracing::warn!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt,
                max_attempts,
                url,
                kind,
                delay
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn network_error(&self, kind: NetworkErrorKind, attempts: u32, url: &Url) -> FetchError {
        FetchError::Network(NetworkError {
            kind,
            attempts,
            url: url.to_string(),
        })
    }

    /// Runs one attempt under a host permit and the per-attempt timeout
    async fn attempt(
        &self,
        url: &Url,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<RawPage, AttemptError> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
            permit = self.permit(url) => permit?,
        };

        let timeout = options.timeout.unwrap_or_else(|| self.config.timeout());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AttemptError::Cancelled),
            result = tokio::time::timeout(timeout, self.follow_redirects(url, options, permit)) => {
                result.unwrap_or(Err(AttemptError::Transient(NetworkErrorKind::Timeout)))
            }
        }
    }

    async fn permit(&self, url: &Url) -> Result<OwnedSemaphorePermit, AttemptError> {
        self.limiter
            .acquire(url)
            .await
            .map_err(|_| AttemptError::Fatal(NetworkErrorKind::Connection))
    }

    /// Sends GET requests, following redirects by hand
    ///
    /// Each hop runs under a permit for its own host. A redirect to a host the
    /// options do not allow fails the fetch.
    async fn follow_redirects(
        &self,
        url: &Url,
        options: &FetchOptions,
        mut _permit: OwnedSemaphorePermit,
    ) -> Result<RawPage, AttemptError> {
        let max_redirects = options.max_redirects.unwrap_or(self.config.max_redirects);
        let mut current = url.clone();
        let mut visited = HashSet::from([current.to_string()]);

        loop {
            self.requests.fetch_add(1, Ordering::Relaxed);

            let response = self
                .client
                .get(current.clone())
                .headers(options.headers.clone())
                .send()
                .await
                .map_err(|e| classify_reqwest_error(&e))?;

            let status = response.status();

            if status.is_redirection() {
                let next = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|location| current.join(location).ok())
                    .ok_or(AttemptError::Fatal(NetworkErrorKind::Redirect))?;

                if visited.len() > max_redirects as usize {
                    tracing::warn!("Too many redirects from {}", url);
                    return Err(AttemptError::Fatal(NetworkErrorKind::Redirect));
                }

                if !visited.insert(next.to_string()) {
                    tracing::warn!("Redirect loop detected at {}", next);
                    return Err(AttemptError::Fatal(NetworkErrorKind::Redirect));
                }

                if !options.allows_redirect(url, &next) {
                    tracing::warn!("Refusing redirect from {} to unlisted host {}", current, next);
                    return Err(AttemptError::Fatal(NetworkErrorKind::Redirect));
                }

                if host_key(&next) != host_key(&current) {
                    drop(_permit);
                    _permit = self.permit(&next).await?;
                }

                tracing::debug!("Redirect {} -> {}", current, next);
                current = next;
                continue;
            }

            if status.is_client_error() {
                return Err(AttemptError::Rejected {
                    status: status.as_u16(),
                    url: current.to_string(),
                });
            }

            if status.is_server_error() {
                return Err(AttemptError::Transient(NetworkErrorKind::HttpStatus(
                    status.as_u16(),
                )));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let body = response
                .text()
                .await
                .map_err(|e| classify_reqwest_error(&e))?;

            return Ok(RawPage {
                requested_url: url.clone(),
                final_url: current,
                status: status.as_u16(),
                content_type,
                body,
                fetched_at: Utc::now(),
            });
        }
    }
}
