//! Resolution pipeline
//!
//! The [`Resolver`] ties the pieces together:
//! - Selects the provider whose URL grammar matches
//! - Consults the cache, collapsing concurrent identical requests
//! - Fetches, parses and normalizes on a miss
//! - Follows embed hops for two-hop stream providers

mod request;
mod state;

pub use request::{Action, ErrorBody, ResolveRequest, ResolveResponse, VideoSource};
pub use state::{FailureKind, ResolutionState, StateTracker};

use crate::cache::{catalog_fingerprint, stream_fingerprint, CachedValue, ResolutionCache};
use crate::config::{validate, Config};
use crate::fetch::{FetchOptions, Fetcher};
use crate::normalize::{CatalogResult, CatalogSource, Normalizer};
use crate::providers::{Provider, ProviderKind, ProviderRegistry, ProviderUrl, StreamRef, StreamRequest};
use crate::sink::CatalogSink;
use crate::url::normalize_url;
use crate::ResolveError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Upper bound on page fetches for one stream resolution
pub const MAX_STREAM_HOPS: usize = 2;

/// Entry point for catalog and stream resolution
///
/// A resolver is shared by all concurrent requests. The cache is the only
/// state that outlives a single resolution.
pub struct Resolver {
    config: Arc<Config>,
    fetcher: Fetcher,
    registry: ProviderRegistry,
    normalizer: Normalizer,
    cache: Arc<ResolutionCache>,
}

impl Resolver {
    /// Creates a resolver with the built-in providers enabled in `config`
    ///
    /// # Returns
    ///
    /// * `Ok(Resolver)` - Ready to serve requests
    /// * `Err(ResolveError::Config)` - The configuration failed validation
    /// * `Err(ResolveError::Client)` - The HTTP client could not be built
    pub fn new(config: Config) -> Result<Self, ResolveError> {
        validate(&config)?;
        let registry = ProviderRegistry::from_config(&config.providers)?;
        Self::with_registry(config, registry)
    }

    /// Creates a resolver with an explicit provider set
    pub fn with_registry(config: Config, registry: ProviderRegistry) -> Result<Self, ResolveError> {
        let fetcher = Fetcher::new(&config.fetch)?;
        let normalizer = Normalizer::new(&config.normalize);

        tracing::debug!("Resolver ready with providers {:?}", registry.kinds());

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            registry,
            normalizer,
            cache: Arc::new(ResolutionCache::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    /// Starts sweeping expired cache entries every `cache.sweep-interval-secs`
    ///
    /// The task runs until `cancel` fires.
    pub fn start_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let interval = self.config.cache.sweep_interval();
        tracing::debug!("Sweeping the cache every {:?}", interval);
        self.cache.spawn_sweeper(interval, cancel)
    }

    /// Options for fetching a provider's own pages
    ///
    /// Redirects may only lead to the provider's configured hosts.
    fn provider_options(&self, kind: ProviderKind, options: FetchOptions) -> FetchOptions {
        options.redirect_hosts(self.config.providers.get(kind).hosts.clone())
    }

    /// Resolves a catalog page URL into canonical episodes
    ///
    /// Repeated calls within the catalog TTL return the cached result without
    /// touching the network. A page whose episode list is partially malformed
    /// yields the parsed prefix plus a `truncated` warning.
    pub async fn resolve_catalog(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<CatalogResult, ResolveError> {
        let mut tracker = StateTracker::new(format!("catalog {}", url));

        match self.catalog(url, &mut tracker, cancel).await {
            Ok(catalog) => {
                tracing::info!(
                    "Resolved {} episodes from {} ({} warnings)",
                    catalog.episodes.len(),
                    url,
                    catalog.warnings.len()
                );
                Ok(catalog)
            }
            Err(e) => Err(self.failed(&mut tracker, url, e)),
        }
    }

    /// Resolves one episode into a playable stream URL
    ///
    /// Identifiers must be present and positive; otherwise the call fails
    /// with `InvalidRequest` before any network access.
    pub async fn resolve_stream_url(
        &self,
        provider: ProviderKind,
        series_ref: Option<&str>,
        season: Option<i64>,
        episode: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<VideoSource, ResolveError> {
        let subject = format!(
            "stream {}/{}/{}/{}",
            provider,
            series_ref.unwrap_or("?"),
            season.map_or_else(|| "?".to_string(), |s| s.to_string()),
            episode.map_or_else(|| "?".to_string(), |e| e.to_string())
        );
        let mut tracker = StateTracker::new(subject.clone());

        let result = match StreamRequest::new(provider, series_ref, season, episode) {
            Ok(request) => self.stream(&request, &mut tracker, cancel).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(source) => {
                tracing::info!("Resolved {} to {}", subject, source.stream_url);
                Ok(source)
            }
            Err(e) => Err(self.failed(&mut tracker, &subject, e)),
        }
    }

    /// Dispatches a boundary request by its action
    ///
    /// For `video-url`, identifiers missing from the request are taken from
    /// the URL when its grammar carries them (e.g. `/tv/{id}/{s}/{e}`).
    pub async fn handle(
        &self,
        request: &ResolveRequest,
        cancel: &CancellationToken,
    ) -> Result<ResolveResponse, ResolveError> {
        match request.action {
            Action::Catalog => self
                .resolve_catalog(&request.url, cancel)
                .await
                .map(ResolveResponse::Catalog),
            Action::VideoUrl => {
                let (provider, matched) = self.registry.select(&request.url)?;
                let kind = provider.kind();
                let (series_ref, season, episode) = stream_identifiers(request, matched);

                let source = self
                    .resolve_stream_url(kind, series_ref.as_deref(), season, episode, cancel)
                    .await?;
                Ok(ResolveResponse::Video {
                    video_url: source.stream_url,
                })
            }
        }
    }

    /// Resolves a catalog and hands it to a sink
    pub async fn ingest_catalog(
        &self,
        url: &str,
        sink: &dyn CatalogSink,
        cancel: &CancellationToken,
    ) -> Result<CatalogResult, ResolveError> {
        let (provider, _) = self.registry.select(url)?;
        let kind = provider.kind();

        let catalog = self.resolve_catalog(url, cancel).await?;
        sink.ingest(kind, &catalog).await?;
        Ok(catalog)
    }

    async fn catalog(
        &self,
        url: &str,
        tracker: &mut StateTracker,
        cancel: &CancellationToken,
    ) -> Result<CatalogResult, ResolveError> {
        let (provider, matched) = self.registry.select(url)?;
        tracker.advance(ResolutionState::ProviderMatched)?;

        let normalized = normalize_url(url)?;
        let fingerprint = catalog_fingerprint(provider.kind(), &normalized);

        let matched = &matched;
        let flight = &mut *tracker;
        let value = self
            .cache
            .get_or_compute(&fingerprint, cancel, move || {
                self.compute_catalog(provider, matched, flight, cancel)
            })
            .await?;

        tracker.advance(ResolutionState::Done)?;
        value.into_catalog().ok_or_else(|| {
            ResolveError::InvalidRequest(format!("cache entry for {} is not a catalog", url))
        })
    }

    async fn compute_catalog(
        &self,
        provider: &dyn Provider,
        matched: &ProviderUrl,
        tracker: &mut StateTracker,
        cancel: &CancellationToken,
    ) -> Result<(CachedValue, Option<Duration>), ResolveError> {
        tracker.advance(ResolutionState::Fetching)?;
        let options = self.provider_options(provider.kind(), FetchOptions::default());
        let page = self.fetcher.fetch(&matched.url, &options, cancel).await?;

        tracker.advance(ResolutionState::Parsing)?;
        let extraction = provider.extract_catalog(&page)?;

        tracker.advance(ResolutionState::Normalizing)?;
        let source = CatalogSource {
            provider: provider.kind(),
            series_ref: &matched.series_ref,
            page_url: &page.final_url,
        };
        let catalog = self.normalizer.normalize(&source, extraction);

        tracker.advance(ResolutionState::Cached)?;
        Ok((
            CachedValue::Catalog(catalog),
            Some(self.config.cache.catalog_ttl()),
        ))
    }

    async fn stream(
        &self,
        request: &StreamRequest,
        tracker: &mut StateTracker,
        cancel: &CancellationToken,
    ) -> Result<VideoSource, ResolveError> {
        let provider = self.registry.get(request.provider)?;
        tracker.advance(ResolutionState::ProviderMatched)?;

        let fingerprint = stream_fingerprint(request);
        let flight = &mut *tracker;
        let value = self
            .cache
            .get_or_compute(&fingerprint, cancel, move || {
                self.compute_stream(provider, request, flight, cancel)
            })
            .await?;

        tracker.advance(ResolutionState::Done)?;
        value.into_stream().ok_or_else(|| {
            ResolveError::InvalidRequest(format!(
                "cache entry for {} S{}E{} is not a stream",
                request.series_ref, request.season, request.episode
            ))
        })
    }

    /// Follows the provider's hops until a direct stream URL appears
    async fn compute_stream(
        &self,
        provider: &dyn Provider,
        request: &StreamRequest,
        tracker: &mut StateTracker,
        cancel: &CancellationToken,
    ) -> Result<(CachedValue, Option<Duration>), ResolveError> {
        let mut url = provider.stream_entry_url(request)?;
        let mut referer: Option<Url> = None;

        for hop in 0..MAX_STREAM_HOPS {
            tracker.advance(if hop == 0 {
                ResolutionState::Fetching
            } else {
                ResolutionState::EmbedFetching
            })?;

            let mut options = provider.stream_fetch_options(hop, referer.as_ref());
            if hop == 0 {
                options = self.provider_options(request.provider, options);
            }

            let page = match self.fetcher.fetch(&url, &options, cancel).await {
                Ok(page) => page,
                // The provider has no page for this episode
                Err(e) if hop == 0 && e.is_not_found() => {
                    return Err(ResolveError::EpisodeNotFound {
                        provider: request.provider,
                        season: request.season,
                        episode: request.episode,
                    });
                }
                Err(e) => return Err(e.into()),
            };

            tracker.advance(ResolutionState::Parsing)?;
            match provider.extract_stream_ref(&page, request, hop)? {
                StreamRef::Direct {
                    url: stream_url,
                    expires_at,
                } => {
                    tracker.advance(ResolutionState::Cached)?;
                    let ttl = self.stream_ttl(expires_at);
                    let source = VideoSource {
                        provider: request.provider,
                        stream_url,
                        expires_at,
                    };
                    return Ok((CachedValue::Stream(source), ttl));
                }
                StreamRef::NextHop(next) => {
                    tracing::debug!("{} hop {} leads to {}", request.provider, hop, next);
                    referer = Some(page.final_url);
                    url = next;
                }
            }
        }

        Err(ResolveError::parse(
            request.provider,
            url.as_str(),
            format!("no playable stream within {} hops", MAX_STREAM_HOPS),
        ))
    }

    /// Cache lifetime of a stream, bounded by its expiry
    ///
    /// Returns None for an already-expired stream, which is returned to the
    /// caller but not cached.
    fn stream_ttl(&self, expires_at: Option<chrono::DateTime<Utc>>) -> Option<Duration> {
        let ttl = self.config.cache.stream_ttl();
        let Some(expires_at) = expires_at else {
            return Some(ttl);
        };

        match (expires_at - Utc::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => Some(remaining.min(ttl)),
            _ => {
                tracing::debug!("Stream expired at {}, not caching", expires_at);
                None
            }
        }
    }

    fn failed(&self, tracker: &mut StateTracker, subject: &str, error: ResolveError) -> ResolveError {
        let error = tracker.fail(error);
        match error {
            ResolveError::Cancelled => tracing::debug!("{} cancelled", subject),
            ref e => tracing::info!("{} failed: {}", subject, e),
        }
        error
    }
}

/// Fills missing stream identifiers from the matched URL
fn stream_identifiers(
    request: &ResolveRequest,
    matched: ProviderUrl,
) -> (Option<String>, Option<i64>, Option<i64>) {
    let series_ref = request
        .series_ref
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or(Some(matched.series_ref));
    let season = request.season.or(matched.season.map(i64::from));
    let episode = request.episode.or(matched.episode.map(i64::from));
    (series_ref, season, episode)
}
