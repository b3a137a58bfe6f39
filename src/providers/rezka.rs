//! Rezka provider
//!
//! Series pages list episodes per season inside `#simple-episodes-tabs`:
//!
//! ```text
//! <ul id="simple-episodes-list-1" class="b-simple_episodes__list">
//!   <li class="b-simple_episode__item" data-id="646" data-season_id="1"
//!       data-episode_id="1">Серия 1</li>
//! </ul>
//! ```
//!
//! The playable URL comes from the CDN endpoint, which answers with JSON
//! listing every quality the translator offers.

use super::markup::{attr, best_quality_url, parse_selector, resolve_link};
use super::{
    CatalogExtraction, ExtractedEpisodeRecord, Provider, ProviderBase, ProviderKind, ProviderUrl,
    RawOrdinal, StreamRef, StreamRequest,
};
use crate::config::ProviderConfig;
use crate::fetch::{FetchOptions, RawPage};
use crate::normalize::resolve_ordinal;
use crate::{ConfigError, ResolveError};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue, REFERER};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use url::Url;

const DEFAULT_MARKER: &str = "#simple-episodes-tabs";
const ITEM_CLASS: &str = "b-simple_episode__item";

static PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/((?:films|series|cartoons|animation)/[\w-]+/\d+-[\w-]+)\.html$").unwrap()
});
static SERIES_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:films|series|cartoons|animation)/[\w-]+/\d+-[\w-]+$").unwrap()
});
static CDN_EVENTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"initCDNSeriesEvents\(\s*(\d+)\s*,\s*(\d+)").unwrap());
static EPISODE_LISTS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.b-simple_episodes__list").unwrap());
static ACTIVE_TRANSLATOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#translators-list .active[data-translator_id]").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());

/// Episode list entry with the attributes stream resolution needs
#[derive(Debug, Clone)]
struct RezkaItem {
    record: ExtractedEpisodeRecord,
    id: Option<String>,
    translator: Option<String>,
}

#[derive(Debug, Default)]
struct EpisodeList {
    items: Vec<RezkaItem>,
    rejected: usize,
    truncated: Option<String>,
}

/// Response of the CDN endpoint
#[derive(Debug, Deserialize)]
struct CdnResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub struct RezkaProvider {
    base: ProviderBase,
}

impl RezkaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            base: ProviderBase::new(ProviderKind::Rezka, config)?,
        })
    }

    fn episode_list(&self, page: &RawPage, document: &Html) -> Result<EpisodeList, ResolveError> {
        let marker_css = self.base.marker(DEFAULT_MARKER);
        let marker = parse_selector(ProviderKind::Rezka, marker_css)?;

        let container = document.select(&marker).next().ok_or_else(|| {
            self.base.parse_error(
                page,
                format!("episode list container '{}' not found", marker_css),
            )
        })?;

        let mut list = EpisodeList::default();

        'lists: for (list_index, ul) in container.select(&EPISODE_LISTS).enumerate() {
            for (item_index, child) in ul.children().filter_map(ElementRef::wrap).enumerate() {
                let is_item = child.value().name() == "li"
                    && child.value().classes().any(|class| class == ITEM_CLASS);
                if !is_item {
                    list.truncated = Some(format!(
                        "entry #{} of episode list #{} is not an episode item",
                        item_index + 1,
                        list_index + 1
                    ));
                    break 'lists;
                }

                self.push_item(&child, page, &mut list);
            }
        }

        Ok(list)
    }

    fn push_item(&self, li: &ElementRef<'_>, page: &RawPage, list: &mut EpisodeList) {
        let (Some(season), Some(episode)) =
            (attr(li, "data-season_id"), attr(li, "data-episode_id"))
        else {
            tracing::debug!("Skipping Rezka episode item without season/episode ids");
            list.rejected += 1;
            return;
        };

        let thumbnail = attr(li, "data-thumb")
            .or_else(|| li.select(&IMG).next().and_then(|img| attr(&img, "src")))
            .and_then(|src| resolve_link(&src, &page.final_url));
        let id = attr(li, "data-id");

        let record = ExtractedEpisodeRecord {
            provider: ProviderKind::Rezka,
            ordinal: RawOrdinal::Split { season, episode },
            title: attr(li, "data-title").or_else(|| attr(li, "title")),
            description: None,
            thumbnail,
            duration: attr(li, "data-duration"),
            stream_ref: id.clone(),
            position: list.items.len() + list.rejected,
        };

        list.items.push(RezkaItem {
            record,
            id,
            translator: attr(li, "data-translator_id"),
        });
    }

    /// Builds the CDN request for the selected episode
    fn cdn_url(
        &self,
        page: &RawPage,
        document: &Html,
        item: &RezkaItem,
        request: &StreamRequest,
    ) -> Result<Url, ResolveError> {
        let events = CDN_EVENTS_RE.captures(&page.body);

        let id = item
            .id
            .clone()
            .or_else(|| events.as_ref().map(|caps| caps[1].to_string()))
            .ok_or_else(|| self.base.parse_error(page, "episode has no content id"))?;

        let translator = item
            .translator
            .clone()
            .or_else(|| {
                document
                    .select(&ACTIVE_TRANSLATOR)
                    .next()
                    .and_then(|el| attr(&el, "data-translator_id"))
            })
            .or_else(|| events.as_ref().map(|caps| caps[2].to_string()))
            .ok_or_else(|| self.base.parse_error(page, "no translator selected"))?;

        let mut url = self.base.join("/ajax/get_cdn_series/")?;
        url.query_pairs_mut()
            .append_pair("id", &id)
            .append_pair("translator_id", &translator)
            .append_pair("season", &request.season.to_string())
            .append_pair("episode", &request.episode.to_string())
            .append_pair("action", "get_stream");
        Ok(url)
    }
}

impl Provider for RezkaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Rezka
    }

    fn matches(&self, url: &Url) -> Option<ProviderUrl> {
        if !self.base.host_allowed(url) {
            return None;
        }
        let caps = PATH_RE.captures(url.path())?;

        Some(ProviderUrl {
            url: url.clone(),
            provider: ProviderKind::Rezka,
            series_ref: caps[1].to_string(),
            season: None,
            episode: None,
        })
    }

    fn extract_catalog(&self, page: &RawPage) -> Result<CatalogExtraction, ResolveError> {
        let document = Html::parse_document(&page.body);
        let list = self.episode_list(page, &document)?;

        Ok(CatalogExtraction {
            records: list.items.into_iter().map(|item| item.record).collect(),
            rejected: list.rejected,
            truncated: list.truncated,
        })
    }

    fn stream_entry_url(&self, request: &StreamRequest) -> Result<Url, ResolveError> {
        if !SERIES_REF_RE.is_match(&request.series_ref) {
            return Err(ResolveError::InvalidRequest(format!(
                "'{}' is not a Rezka series reference",
                request.series_ref
            )));
        }
        self.base.join(&format!("/{}.html", request.series_ref))
    }

    fn stream_fetch_options(&self, hop: usize, referer: Option<&Url>) -> FetchOptions {
        if hop == 0 {
            return FetchOptions::default();
        }

        let mut options = FetchOptions::default().header(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        if let Some(value) = referer.and_then(|r| HeaderValue::from_str(r.as_str()).ok()) {
            options = options.header(REFERER, value);
        }
        options
    }

    fn extract_stream_ref(
        &self,
        page: &RawPage,
        request: &StreamRequest,
        hop: usize,
    ) -> Result<StreamRef, ResolveError> {
        match hop {
            0 => {
                let document = Html::parse_document(&page.body);
                let list = self.episode_list(page, &document)?;
                let item = list
                    .items
                    .iter()
                    .find(|item| {
                        resolve_ordinal(&item.record.ordinal)
                            == Some((request.season, request.episode))
                    })
                    .ok_or(ResolveError::EpisodeNotFound {
                        provider: ProviderKind::Rezka,
                        season: request.season,
                        episode: request.episode,
                    })?;

                Ok(StreamRef::NextHop(self.cdn_url(page, &document, item, request)?))
            }
            1 => {
                let response: CdnResponse = serde_json::from_str(&page.body).map_err(|e| {
                    self.base.parse_error(page, format!("CDN response is not JSON: {}", e))
                })?;

                if !response.success {
                    let message = response.message.unwrap_or_else(|| "no message".to_string());
                    return Err(self
                        .base
                        .parse_error(page, format!("CDN refused the stream: {}", message)));
                }

                response
                    .url
                    .as_deref()
                    .and_then(best_quality_url)
                    .map(StreamRef::direct)
                    .ok_or_else(|| self.base.parse_error(page, "CDN response has no stream URL"))
            }
            _ => Err(self.base.parse_error(page, format!("unexpected stream hop {}", hop))),
        }
    }
}
