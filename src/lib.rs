//! Reel-Resolver: video source resolution engine
//!
//! This crate turns third-party catalog page URLs into canonical episode data and
//! resolves `(series, season, episode)` triples into playable stream URLs. It
//! fetches provider pages politely, parses each provider's page grammar, normalizes
//! the results into one shape, and caches resolutions while collapsing concurrent
//! duplicate requests into a single fetch.

pub mod cache;
pub mod config;
pub mod fetch;
pub mod normalize;
pub mod pipeline;
pub mod providers;
pub mod sink;
pub mod url;

use crate::pipeline::{FailureKind, ResolutionState};
use crate::sink::SinkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Main error type for resolution operations
///
/// Cloneable so one failed resolution can be handed to every caller that was
/// waiting on it.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Provider rejected {url} with HTTP {status}")]
    Rejected { url: String, status: u16 },

    #[error("No provider supports URL: {url}")]
    UnsupportedProvider { url: String },

    #[error("Failed to parse {provider} page {url}: {reason}")]
    Parse {
        provider: ProviderKind,
        url: String,
        reason: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{provider} does not list season {season} episode {episode}")]
    EpisodeNotFound {
        provider: ProviderKind,
        season: u32,
        episode: u32,
    },

    #[error("Resolution cancelled")]
    Cancelled,

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ResolutionState,
        to: ResolutionState,
    },

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Configuration error: {0}")]
    Config(Arc<ConfigError>),

    #[error("HTTP client error: {0}")]
    Client(Arc<reqwest::Error>),

    #[error("Sink error: {0}")]
    Sink(Arc<SinkError>),
}

impl From<ConfigError> for ResolveError {
    fn from(err: ConfigError) -> Self {
        Self::Config(Arc::new(err))
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        Self::Client(Arc::new(err))
    }
}

impl From<SinkError> for ResolveError {
    fn from(err: SinkError) -> Self {
        Self::Sink(Arc::new(err))
    }
}

impl ResolveError {
    /// Builds a parse error for a provider page
    pub fn parse(provider: ProviderKind, url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            provider,
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns the taxonomy bucket this error belongs to
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Network(_) | Self::Rejected { .. } | Self::Client(_) => FailureKind::Network,
            Self::UnsupportedProvider { .. } => FailureKind::UnsupportedProvider,
            Self::Parse { .. } => FailureKind::Parse,
            Self::InvalidRequest(_) | Self::Url(_) | Self::EpisodeNotFound { .. } => {
                FailureKind::InvalidRequest
            }
            Self::Cancelled => FailureKind::Cancelled,
            Self::InvalidTransition { .. } | Self::Config(_) | Self::Sink(_) => {
                FailureKind::Internal
            }
        }
    }

    /// Returns true if the caller supplied bad input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.failure_kind(),
            FailureKind::UnsupportedProvider | FailureKind::InvalidRequest
        )
    }

    /// Maps the error to the HTTP status a web layer should answer with
    ///
    /// | Error | Status |
    /// |-------|--------|
    /// | Unsupported provider, invalid request, bad URL | 400 |
    /// | Episode not listed by the provider | 404 |
    /// | Cancelled | 499 |
    /// | Provider answered with a 4xx | 502 |
    /// | Anything else | 500 |
    pub fn status_code(&self) -> u16 {
        match self {
            Self::EpisodeNotFound { .. } => 404,
            _ if self.is_client_error() => 400,
            Self::Cancelled => 499,
            Self::Rejected { .. } => 502,
            _ => 500,
        }
    }
}

/// Classification of an exhausted network failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    /// An attempt exceeded the per-attempt timeout
    Timeout,
    /// Connection refused, reset, DNS or TLS failure
    Connection,
    /// The server kept answering with this status (5xx)
    HttpStatus(u16),
    /// Redirect loop or redirect chain too long
    Redirect,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connection => write!(f, "connection"),
            Self::HttpStatus(code) => write!(f, "http_status {}", code),
            Self::Redirect => write!(f, "redirect"),
        }
    }
}

/// A network failure surfaced after the fetcher gave up retrying
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} fetching {url} after {attempts} attempt(s)")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub attempts: u32,
    pub url: String,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid host pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Clone, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for resolution operations
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use cache::ResolutionCache;
pub use config::Config;
pub use fetch::{FetchError, Fetcher, RawPage};
pub use normalize::{CanonicalEpisode, CatalogResult, Conflict, Warning};
pub use pipeline::{Action, ResolveRequest, ResolveResponse, Resolver, VideoSource};
pub use providers::{ProviderKind, ProviderRegistry};
pub use sink::{CatalogSink, JsonLinesSink};
