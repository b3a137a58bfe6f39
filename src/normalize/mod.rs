//! Normalizer module
//!
//! Turns provider-specific extracted records into the canonical episode shape:
//! - Ordinal parsing across numeric, keyword and spelled-out forms
//! - Title and description cleanup
//! - Thumbnail resolution and duration conversion
//! - Deduplication by `(season, episode)` and stable ordering

mod ordinal;
mod text;

pub use ordinal::{parse_ordinal, parse_ordinal_pair, resolve_ordinal};
pub use text::{parse_duration_minutes, TextCleaner};

use crate::config::NormalizeConfig;
use crate::providers::{resolve_link, CatalogExtraction, ProviderKind, RawOrdinal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// A provider-independent episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEpisode {
    pub season_number: u32,
    pub episode_number: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub source_provider: ProviderKind,
    pub source_ref: String,
}

/// Two records claimed the same `(season, episode)`; the first one was kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub season_number: u32,
    pub episode_number: u32,
    pub kept_ref: String,
    pub discarded_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discarded_title: Option<String>,
}

/// Non-fatal issues reported alongside a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Warning {
    /// A later record duplicated an earlier `(season, episode)`
    Duplicate(Conflict),

    /// Extraction stopped at a malformed block; `kept` records precede it
    Truncated {
        provider: ProviderKind,
        reason: String,
        kept: usize,
    },

    /// A record's ordinal could not be parsed
    DroppedRecord {
        provider: ProviderKind,
        position: usize,
        label: String,
    },

    /// Records that carried no ordinal at all
    RejectedRecords { provider: ProviderKind, count: usize },
}

/// Episodes plus side-channel warnings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogResult {
    pub episodes: Vec<CanonicalEpisode>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

/// Where a batch of records came from
#[derive(Debug, Clone)]
pub struct CatalogSource<'a> {
    pub provider: ProviderKind,
    pub series_ref: &'a str,
    /// Final URL of the page, for resolving relative links
    pub page_url: &'a Url,
}

/// Normalizes extracted records with a fixed configuration
#[derive(Debug, Clone)]
pub struct Normalizer {
    cleaner: TextCleaner,
}

impl Normalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            cleaner: TextCleaner::new(&config.title_blocklist),
        }
    }

    /// Normalizes one page's extraction into a catalog
    ///
    /// Records with unparseable ordinals are dropped with a warning, never
    /// failing the batch. The first record for a `(season, episode)` wins.
    /// The output is sorted by `(season, episode)`.
    pub fn normalize(&self, source: &CatalogSource<'_>, extraction: CatalogExtraction) -> CatalogResult {
        let extracted = extraction.records.len();
        let mut episodes: Vec<CanonicalEpisode> = Vec::with_capacity(extracted);
        let mut index: HashMap<(u32, u32), usize> = HashMap::new();
        let mut warnings = Vec::new();

        for record in extraction.records {
            let Some((season, episode)) = resolve_ordinal(&record.ordinal) else {
                let label = ordinal_label(&record.ordinal);
                tracing::warn!(
                    "Dropping {} record #{}: unparseable ordinal '{}'",
                    source.provider,
                    record.position,
                    label
                );
                warnings.push(Warning::DroppedRecord {
                    provider: source.provider,
                    position: record.position,
                    label,
                });
                continue;
            };

            let source_ref = record
                .stream_ref
                .clone()
                .unwrap_or_else(|| format!("{}#s{}e{}", source.series_ref, season, episode));

            if let Some(&kept) = index.get(&(season, episode)) {
                let conflict = Conflict {
                    season_number: season,
                    episode_number: episode,
                    kept_ref: episodes[kept].source_ref.clone(),
                    discarded_ref: source_ref,
                    discarded_title: record.title.as_deref().and_then(|t| self.cleaner.clean(t)),
                };
                tracing::warn!(
                    "Duplicate S{}E{} from {}: keeping {}, discarding {}",
                    season,
                    episode,
                    source.provider,
                    conflict.kept_ref,
                    conflict.discarded_ref
                );
                warnings.push(Warning::Duplicate(conflict));
                continue;
            }

            let title = record
                .title
                .as_deref()
                .and_then(|t| self.cleaner.clean(t))
                .unwrap_or_else(|| format!("Episode {}", episode));

            index.insert((season, episode), episodes.len());
            episodes.push(CanonicalEpisode {
                season_number: season,
                episode_number: episode,
                title,
                description: record.description.as_deref().and_then(|d| self.cleaner.clean(d)),
                thumbnail_url: record
                    .thumbnail
                    .as_deref()
                    .and_then(|t| resolve_link(t, source.page_url)),
                duration_minutes: record.duration.as_deref().and_then(parse_duration_minutes),
                source_provider: source.provider,
                source_ref,
            });
        }

        episodes.sort_by_key(|e| (e.season_number, e.episode_number));

        if extraction.rejected > 0 {
            warnings.push(Warning::RejectedRecords {
                provider: source.provider,
                count: extraction.rejected,
            });
        }

        if let Some(reason) = extraction.truncated {
            tracing::warn!(
                "Partial {} catalog from {}: {} ({} records kept)",
                source.provider,
                source.page_url,
                reason,
                extracted
            );
            warnings.push(Warning::Truncated {
                provider: source.provider,
                reason,
                kept: extracted,
            });
        }

        CatalogResult { episodes, warnings }
    }
}

/// Normalizes records with a one-off [`Normalizer`]
pub fn normalize(
    source: &CatalogSource<'_>,
    extraction: CatalogExtraction,
    config: &NormalizeConfig,
) -> CatalogResult {
    Normalizer::new(config).normalize(source, extraction)
}

fn ordinal_label(ordinal: &RawOrdinal) -> String {
    match ordinal {
        RawOrdinal::Split { season, episode } => format!("{} / {}", season, episode),
        RawOrdinal::Combined(label) => label.clone(),
    }
}
