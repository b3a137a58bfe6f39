//! Kinogo provider
//!
//! Series pages live at `/{id}-{slug}.html`. The episode list is the playlist
//! handed to the Playerjs player in an inline script:
//!
//! ```text
//! new Playerjs({id:"player", file:[
//!   {"title":"Сезон 1","folder":[
//!     {"title":"Серия 1","file":"https://cdn/s1e1.m3u8","poster":"/img/1.jpg"},
//!     {"title":"Серия 2","embed":"https://kinogo.biz/embed/2"}
//!   ]}
//! ]});
//! ```
//!
//! A movie page passes a single `file:"..."` string instead of an array and
//! has no episodes.

use super::markup::{
    best_quality_url, find_media_url, find_script_array, parse_selector, resolve_link,
    scan_json_array,
};
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
use reqwest::header::{HeaderValue, REFERER};
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use url::Url;

const DEFAULT_MARKER: &str = "#player";

static PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/(\d+-[\w-]+)\.html$").unwrap());
static SERIES_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+-[\w-]+$").unwrap());
static PLAYERJS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Playerjs\s*\(\s*\{").unwrap());
static FILE_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["']?\bfile["']?\s*:\s*"#).unwrap());
static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());

/// Playlist entry with the links needed for stream resolution
#[derive(Debug, Clone)]
struct KinogoItem {
    record: ExtractedEpisodeRecord,
    file: Option<String>,
    embed: Option<String>,
}

#[derive(Debug, Default)]
struct Playlist {
    items: Vec<KinogoItem>,
    rejected: usize,
    truncated: Option<String>,
}

pub struct KinogoProvider {
    base: ProviderBase,
}

impl KinogoProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            base: ProviderBase::new(ProviderKind::Kinogo, config)?,
        })
    }

    /// Reads the Playerjs playlist from a series page
    fn playlist(&self, page: &RawPage) -> Result<Playlist, ResolveError> {
        let document = Html::parse_document(&page.body);
        let marker_css = self.base.marker(DEFAULT_MARKER);
        let marker = parse_selector(ProviderKind::Kinogo, marker_css)?;

        if document.select(&marker).next().is_none() {
            return Err(self.base.parse_error(
                page,
                format!("episode list container '{}' not found", marker_css),
            ));
        }

        let script = document
            .select(&SCRIPT)
            .map(|s| s.text().collect::<String>())
            .find(|text| PLAYERJS_RE.is_match(text))
            .ok_or_else(|| self.base.parse_error(page, "Playerjs configuration not found"))?;

        let config_start = PLAYERJS_RE.find(&script).map(|m| m.end()).unwrap_or(0);
        let config = &script[config_start..];

        let Some(array) = find_script_array(config, &FILE_KEY_RE) else {
            if FILE_KEY_RE.is_match(config) {
                tracing::debug!("{} has a single file, no episodes", page.final_url);
                return Ok(Playlist::default());
            }
            return Err(self.base.parse_error(page, "Playerjs configuration has no file"));
        };

        let scan = scan_json_array(array);
        let mut playlist = Playlist {
            truncated: scan.stopped,
            ..Playlist::default()
        };

        for (index, element) in scan.elements.iter().enumerate() {
            let Some(object) = element.as_object() else {
                playlist.truncated = Some(format!("playlist element #{} is not an object", index + 1));
                break;
            };

            match object.get("folder") {
                Some(Value::Array(folder)) => {
                    let season = string_field(object, "title");
                    if let Err(reason) = self.read_folder(folder, season.as_deref(), &mut playlist) {
                        playlist.truncated = Some(reason);
                        break;
                    }
                }
                Some(_) => {
                    playlist.truncated =
                        Some(format!("playlist element #{} has a malformed folder", index + 1));
                    break;
                }
                None => self.push_item(object, None, &mut playlist),
            }
        }

        Ok(playlist)
    }

    fn read_folder(
        &self,
        folder: &[Value],
        season: Option<&str>,
        playlist: &mut Playlist,
    ) -> Result<(), String> {
        for (index, item) in folder.iter().enumerate() {
            let object = item.as_object().ok_or_else(|| {
                format!(
                    "item #{} of folder '{}' is not an object",
                    index + 1,
                    season.unwrap_or("?")
                )
            })?;
            self.push_item(object, season, playlist);
        }
        Ok(())
    }

    fn push_item(&self, item: &Map<String, Value>, season: Option<&str>, playlist: &mut Playlist) {
        let title = string_field(item, "title");
        let ordinal = match (string_field(item, "season"), string_field(item, "episode")) {
            (Some(season), Some(episode)) => Some(RawOrdinal::Split { season, episode }),
            _ => match (season, title) {
                (Some(season), Some(episode)) => Some(RawOrdinal::Split {
                    season: season.to_string(),
                    episode,
                }),
                (None, Some(label)) => Some(RawOrdinal::Combined(label)),
                _ => None,
            },
        };

        let Some(ordinal) = ordinal else {
            tracing::debug!("Skipping Kinogo playlist item without a season/episode label");
            playlist.rejected += 1;
            return;
        };

        let file = string_field(item, "file");
        let embed = string_field(item, "embed");
        let stream_ref = file
            .clone()
            .or_else(|| embed.clone())
            .or_else(|| string_field(item, "id"));

        let record = ExtractedEpisodeRecord {
            provider: ProviderKind::Kinogo,
            ordinal,
            title: string_field(item, "name"),
            description: string_field(item, "description"),
            thumbnail: string_field(item, "poster"),
            duration: string_field(item, "duration"),
            stream_ref,
            position: playlist.items.len() + playlist.rejected,
        };

        playlist.items.push(KinogoItem {
            record,
            file,
            embed,
        });
    }
}

/// Reads a string or number field as trimmed text
fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Provider for KinogoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Kinogo
    }

    fn matches(&self, url: &Url) -> Option<ProviderUrl> {
        if !self.base.host_allowed(url) {
            return None;
        }
        let caps = PATH_RE.captures(url.path())?;

        Some(ProviderUrl {
            url: url.clone(),
            provider: ProviderKind::Kinogo,
            series_ref: caps[1].to_string(),
            season: None,
            episode: None,
        })
    }

    fn extract_catalog(&self, page: &RawPage) -> Result<CatalogExtraction, ResolveError> {
        let playlist = self.playlist(page)?;

        Ok(CatalogExtraction {
            records: playlist.items.into_iter().map(|item| item.record).collect(),
            rejected: playlist.rejected,
            truncated: playlist.truncated,
        })
    }

    fn stream_entry_url(&self, request: &StreamRequest) -> Result<Url, ResolveError> {
        if !SERIES_REF_RE.is_match(&request.series_ref) {
            return Err(ResolveError::InvalidRequest(format!(
                "'{}' is not a Kinogo series reference",
                request.series_ref
            )));
        }
        self.base.join(&format!("/{}.html", request.series_ref))
    }

    /// Embed players refuse requests without the series page as referer
    fn stream_fetch_options(&self, _hop: usize, referer: Option<&Url>) -> FetchOptions {
        match referer.and_then(|r| HeaderValue::from_str(r.as_str()).ok()) {
            Some(value) => FetchOptions::default().header(REFERER, value),
            None => FetchOptions::default(),
        }
    }

    fn extract_stream_ref(
        &self,
        page: &RawPage,
        request: &StreamRequest,
        hop: usize,
    ) -> Result<StreamRef, ResolveError> {
        match hop {
            0 => {
                let playlist = self.playlist(page)?;
                let item = playlist
                    .items
                    .iter()
                    .find(|item| {
                        resolve_ordinal(&item.record.ordinal)
                            == Some((request.season, request.episode))
                    })
                    .ok_or(ResolveError::EpisodeNotFound {
                        provider: ProviderKind::Kinogo,
                        season: request.season,
                        episode: request.episode,
                    })?;

                if let Some(url) = item
                    .file
                    .as_deref()
                    .and_then(best_quality_url)
                    .and_then(|file| resolve_link(&file, &page.final_url))
                {
                    return Ok(StreamRef::direct(url));
                }

                let embed = item
                    .embed
                    .as_deref()
                    .and_then(|embed| resolve_link(embed, &page.final_url))
                    .ok_or_else(|| self.base.parse_error(page, "episode has no playable link"))?;
                let embed = Url::parse(&embed)
                    .map_err(|e| self.base.parse_error(page, format!("bad embed link: {}", e)))?;

                Ok(StreamRef::NextHop(embed))
            }
            1 => {
                let document = Html::parse_document(&page.body);
                find_media_url(&document, &page.body, &page.final_url)
                    .map(StreamRef::direct)
                    .ok_or_else(|| self.base.parse_error(page, "embed page has no media source"))
            }
            _ => Err(self.base.parse_error(page, format!("unexpected stream hop {}", hop))),
        }
    }
}
