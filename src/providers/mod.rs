//! Provider parsers
//!
//! Each supported site implements [`Provider`]: a pure URL grammar test, a
//! catalog extractor, and a stream reference extractor. Stream resolution is
//! expressed as a sequence of hops; a provider returns [`StreamRef::NextHop`]
//! when another page has to be fetched before a playable URL is known, and the
//! pipeline performs that fetch.
//!
//! Adding a provider means adding a [`ProviderKind`] variant and one
//! implementation; the pipeline does not change.

mod kinogo;
mod markup;
mod rezka;
mod vidlink;

pub use kinogo::KinogoProvider;
pub use markup::{
    best_quality_url, expiry_from_url, find_media_url, resolve_link, scan_json_array, ArrayScan,
};
pub use rezka::RezkaProvider;
pub use vidlink::VidLinkProvider;

use crate::config::{ProviderConfig, ProvidersConfig};
use crate::fetch::{FetchOptions, RawPage};
use crate::url::matches_host;
use crate::{ConfigError, ResolveError, UrlError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Kinogo,
    VidLink,
    Rezka,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kinogo => "kinogo",
            Self::VidLink => "vidlink",
            Self::Rezka => "rezka",
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Kinogo, Self::VidLink, Self::Rezka]
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ResolveError::InvalidRequest(format!("unknown provider '{}'", s)))
    }
}

/// A URL that matched exactly one provider's grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUrl {
    /// The URL as supplied (parsed)
    pub url: Url,

    /// The provider whose grammar matched
    pub provider: ProviderKind,

    /// Provider-specific series reference (id, slug, or path)
    pub series_ref: String,

    /// Season carried by the URL itself, if any
    pub season: Option<u32>,

    /// Episode carried by the URL itself, if any
    pub episode: Option<u32>,
}

/// Season/episode ordinals as they appear on a provider page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOrdinal {
    /// Separate season and episode values ("2", "Сезон 2", "second")
    Split { season: String, episode: String },

    /// One label carrying both ("S1E2", "1x02", "1 сезон 2 серия")
    Combined(String),
}

/// One episode as extracted from a provider page, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEpisodeRecord {
    pub provider: ProviderKind,
    pub ordinal: RawOrdinal,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Absolute thumbnail URL
    pub thumbnail: Option<String>,
    /// Duration as printed by the provider
    pub duration: Option<String>,
    /// Provider stream locator (id, direct URL, or embed URL)
    pub stream_ref: Option<String>,
    /// Position in document order
    pub position: usize,
}

/// Everything a catalog extraction produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogExtraction {
    /// Records in document order
    pub records: Vec<ExtractedEpisodeRecord>,

    /// Items skipped because they carried no season/episode ordinal
    pub rejected: usize,

    /// Set when a malformed block stopped extraction partway
    pub truncated: Option<String>,
}

/// A validated request for one episode's stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamRequest {
    pub provider: ProviderKind,
    pub series_ref: String,
    pub season: u32,
    pub episode: u32,
}

impl StreamRequest {
    /// Validates raw identifiers; all three must be present and positive
    pub fn new(
        provider: ProviderKind,
        series_ref: Option<&str>,
        season: Option<i64>,
        episode: Option<i64>,
    ) -> Result<Self, ResolveError> {
        let series_ref = series_ref
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ResolveError::InvalidRequest("series reference is required".into()))?;

        Ok(Self {
            provider,
            series_ref: series_ref.to_string(),
            season: positive("season number", season)?,
            episode: positive("episode number", episode)?,
        })
    }
}

fn positive(name: &str, value: Option<i64>) -> Result<u32, ResolveError> {
    let value = value.ok_or_else(|| ResolveError::InvalidRequest(format!("{} is required", name)))?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            ResolveError::InvalidRequest(format!("{} must be positive, got {}", name, value))
        })
}

/// Result of one stream extraction hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRef {
    /// A playable URL
    Direct {
        url: String,
        expires_at: Option<DateTime<Utc>>,
    },

    /// Another page must be fetched
    NextHop(Url),
}

impl StreamRef {
    /// Builds a direct reference, reading an expiry hint from the URL
    pub fn direct(url: impl Into<String>) -> Self {
        let url = url.into();
        let expires_at = expiry_from_url(&url);
        Self::Direct { url, expires_at }
    }
}

/// Capability set every provider implements
///
/// All methods are synchronous: parsing never waits on the network. Fetching
/// is the pipeline's job.
pub trait Provider: Send + Sync {
    /// Which provider this is
    fn kind(&self) -> ProviderKind;

    /// Tests host allowlist and path grammar; pure
    fn matches(&self, url: &Url) -> Option<ProviderUrl>;

    /// Extracts catalog records from a series page
    ///
    /// Fails with a parse error when the page's episode list container is
    /// missing, because an empty result would otherwise look like a series
    /// without episodes.
    fn extract_catalog(&self, page: &RawPage) -> Result<CatalogExtraction, ResolveError>;

    /// First page to fetch when resolving a stream
    fn stream_entry_url(&self, request: &StreamRequest) -> Result<Url, ResolveError>;

    /// Extra request options for a stream hop
    fn stream_fetch_options(&self, _hop: usize, _referer: Option<&Url>) -> FetchOptions {
        FetchOptions::default()
    }

    /// Extracts the stream reference from the page fetched for hop `hop`
    fn extract_stream_ref(
        &self,
        page: &RawPage,
        request: &StreamRequest,
        hop: usize,
    ) -> Result<StreamRef, ResolveError>;
}

/// The set of enabled providers
pub struct ProviderRegistry {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderRegistry {
    /// Creates a registry from explicit provider implementations
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// Builds the built-in providers enabled in the configuration
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ConfigError> {
        let mut providers: Vec<Box<dyn Provider>> = Vec::new();

        for (kind, provider_config) in config.entries() {
            if !provider_config.enabled {
                tracing::debug!("Provider {} disabled", kind);
                continue;
            }

            let provider_config = provider_config.clone();
            let provider: Box<dyn Provider> = match kind {
                ProviderKind::Kinogo => Box::new(KinogoProvider::new(provider_config)?),
                ProviderKind::VidLink => Box::new(VidLinkProvider::new(provider_config)?),
                ProviderKind::Rezka => Box::new(RezkaProvider::new(provider_config)?),
            };
            providers.push(provider);
        }

        Ok(Self::new(providers))
    }

    /// Kinds of all registered providers
    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    /// Returns the provider of the given kind
    pub fn get(&self, kind: ProviderKind) -> Result<&dyn Provider, ResolveError> {
        self.providers
            .iter()
            .find(|p| p.kind() == kind)
            .map(|p| p.as_ref())
            .ok_or_else(|| ResolveError::InvalidRequest(format!("provider {} is disabled", kind)))
    }

    /// Selects the single provider whose grammar matches the URL
    pub fn select(&self, url: &str) -> Result<(&dyn Provider, ProviderUrl), ResolveError> {
        let parsed = Url::parse(url.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

        let mut matched = self
            .providers
            .iter()
            .filter_map(|p| p.matches(&parsed).map(|m| (p.as_ref(), m)));

        let first = matched.next().ok_or_else(|| ResolveError::UnsupportedProvider {
            url: url.to_string(),
        })?;

        if let Some((other, _)) = matched.next() {
            return Err(ResolveError::InvalidRequest(format!(
                "URL {} matches both {} and {}",
                url,
                first.0.kind(),
                other.kind()
            )));
        }

        Ok(first)
    }
}

/// Shared construction state for the built-in providers
#[derive(Debug, Clone)]
struct ProviderBase {
    kind: ProviderKind,
    config: ProviderConfig,
    base_url: Url,
}

impl ProviderBase {
    fn new(kind: ProviderKind, config: ProviderConfig) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid base_url for {}: {}", kind, e))
        })?;
        Ok(Self {
            kind,
            config,
            base_url,
        })
    }

    fn host_allowed(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && self.config.hosts.iter().any(|p| matches_host(p, url))
    }

    fn marker<'a>(&'a self, default: &'a str) -> &'a str {
        self.config.catalog_marker.as_deref().unwrap_or(default)
    }

    fn join(&self, path: &str) -> Result<Url, ResolveError> {
        self.base_url
            .join(path)
            .map_err(|e| ResolveError::InvalidRequest(format!("cannot build URL '{}': {}", path, e)))
    }

    fn parse_error(&self, page: &RawPage, reason: impl Into<String>) -> ResolveError {
        let reason = reason.into();
        tracing::error!(
            "{} layout check failed for {}: {}",
            self.kind,
            page.final_url,
            reason
        );
        ResolveError::parse(self.kind, page.final_url.as_str(), reason)
    }
}
