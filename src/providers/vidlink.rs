//! VidLink provider
//!
//! TV pages are Next.js documents at `/tv/{tmdb_id}[/{season}[/{episode}]]`.
//! The season list is embedded in `script#__NEXT_DATA__` under
//! `props.pageProps.seasons`, each season carrying TMDB-style episodes.

use super::markup::{find_media_url, parse_selector};
use super::{
    CatalogExtraction, ExtractedEpisodeRecord, Provider, ProviderBase, ProviderKind, ProviderUrl,
    RawOrdinal, StreamRef, StreamRequest,
};
use crate::config::ProviderConfig;
use crate::fetch::RawPage;
use crate::{ConfigError, ResolveError};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use url::Url;

const DEFAULT_MARKER: &str = "script#__NEXT_DATA__";
const SEASONS_POINTER: &str = "/props/pageProps/seasons";

static PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/tv/(\d+)(?:/(\d+)(?:/(\d+))?)?/?$").unwrap());
static PLAYER_MARKER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#player, script#__NEXT_DATA__").unwrap());

pub struct VidLinkProvider {
    base: ProviderBase,
}

impl VidLinkProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            base: ProviderBase::new(ProviderKind::VidLink, config)?,
        })
    }

    fn thumbnail(&self, still_path: &str) -> String {
        if still_path.starts_with("http://") || still_path.starts_with("https://") {
            return still_path.to_string();
        }
        match self.base.config.image_base.as_deref() {
            Some(image_base) => format!(
                "{}/{}",
                image_base.trim_end_matches('/'),
                still_path.trim_start_matches('/')
            ),
            None => still_path.to_string(),
        }
    }

    fn episode_record(
        &self,
        episode: &Map<String, Value>,
        season_number: Option<&Value>,
        position: usize,
    ) -> Option<ExtractedEpisodeRecord> {
        let season = episode
            .get("season_number")
            .or(season_number)
            .and_then(scalar_text)?;
        let number = episode.get("episode_number").and_then(scalar_text)?;

        Some(ExtractedEpisodeRecord {
            provider: ProviderKind::VidLink,
            ordinal: RawOrdinal::Split {
                season,
                episode: number,
            },
            title: episode.get("name").and_then(scalar_text),
            description: episode.get("overview").and_then(scalar_text),
            thumbnail: episode
                .get("still_path")
                .and_then(scalar_text)
                .map(|path| self.thumbnail(&path)),
            duration: episode.get("runtime").and_then(scalar_text),
            stream_ref: episode.get("id").and_then(scalar_text),
            position,
        })
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Provider for VidLinkProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::VidLink
    }

    fn matches(&self, url: &Url) -> Option<ProviderUrl> {
        if !self.base.host_allowed(url) {
            return None;
        }
        let caps = PATH_RE.captures(url.path())?;
        let ordinal = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

        Some(ProviderUrl {
            url: url.clone(),
            provider: ProviderKind::VidLink,
            series_ref: caps[1].to_string(),
            season: ordinal(2),
            episode: ordinal(3),
        })
    }

    fn extract_catalog(&self, page: &RawPage) -> Result<CatalogExtraction, ResolveError> {
        let document = Html::parse_document(&page.body);
        let marker_css = self.base.marker(DEFAULT_MARKER);
        let marker = parse_selector(ProviderKind::VidLink, marker_css)?;

        let data = document
            .select(&marker)
            .next()
            .map(|element| element.text().collect::<String>())
            .ok_or_else(|| {
                self.base.parse_error(
                    page,
                    format!("episode list container '{}' not found", marker_css),
                )
            })?;

        let data: Value = serde_json::from_str(&data)
            .map_err(|e| self.base.parse_error(page, format!("page data is not JSON: {}", e)))?;

        let seasons = data
            .pointer(SEASONS_POINTER)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                self.base
                    .parse_error(page, format!("page data has no {} array", SEASONS_POINTER))
            })?;

        let mut extraction = CatalogExtraction::default();
        let mut position = 0;

        'seasons: for (season_index, season) in seasons.iter().enumerate() {
            let Some(season) = season.as_object() else {
                extraction.truncated =
                    Some(format!("season #{} is not an object", season_index + 1));
                break;
            };

            let episodes = match season.get("episodes") {
                Some(Value::Array(episodes)) => episodes,
                None | Some(Value::Null) => continue,
                Some(_) => {
                    extraction.truncated =
                        Some(format!("season #{} has a malformed episode list", season_index + 1));
                    break;
                }
            };

            for (episode_index, episode) in episodes.iter().enumerate() {
                let Some(episode) = episode.as_object() else {
                    extraction.truncated = Some(format!(
                        "episode #{} of season #{} is not an object",
                        episode_index + 1,
                        season_index + 1
                    ));
                    break 'seasons;
                };

                match self.episode_record(episode, season.get("season_number"), position) {
                    Some(record) => extraction.records.push(record),
                    None => {
                        tracing::debug!("Skipping VidLink episode without season/episode number");
                        extraction.rejected += 1;
                    }
                }
                position += 1;
            }
        }

        Ok(extraction)
    }

    fn stream_entry_url(&self, request: &StreamRequest) -> Result<Url, ResolveError> {
        if !request.series_ref.chars().all(|c| c.is_ascii_digit()) {
            return Err(ResolveError::InvalidRequest(format!(
                "'{}' is not a VidLink series id",
                request.series_ref
            )));
        }
        self.base.join(&format!(
            "/tv/{}/{}/{}",
            request.series_ref, request.season, request.episode
        ))
    }

    fn extract_stream_ref(
        &self,
        page: &RawPage,
        _request: &StreamRequest,
        hop: usize,
    ) -> Result<StreamRef, ResolveError> {
        if hop > 0 {
            return Err(self.base.parse_error(page, format!("unexpected stream hop {}", hop)));
        }

        let document = Html::parse_document(&page.body);
        if let Some(url) = find_media_url(&document, &page.body, &page.final_url) {
            return Ok(StreamRef::direct(url));
        }

        if document.select(&PLAYER_MARKER).next().is_some() {
            return Ok(StreamRef::direct(page.final_url.to_string()));
        }

        Err(self.base.parse_error(page, "player not found on episode page"))
    }
}
