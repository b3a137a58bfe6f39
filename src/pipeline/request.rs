//! Boundary request and response shapes

use crate::normalize::CatalogResult;
use crate::providers::ProviderKind;
use crate::ResolveError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the caller wants from a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Full episode list
    #[serde(rename = "catalog", alias = "scrape")]
    Catalog,

    /// Playable URL for one episode
    #[serde(rename = "video-url")]
    VideoUrl,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog => write!(f, "catalog"),
            Self::VideoUrl => write!(f, "video-url"),
        }
    }
}

impl FromStr for Action {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "catalog" | "scrape" => Ok(Self::Catalog),
            "video-url" | "video_url" | "videourl" => Ok(Self::VideoUrl),
            other => Err(ResolveError::InvalidRequest(format!("unknown action '{}'", other))),
        }
    }
}

/// An inbound request at the action-dispatching boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub url: String,
    pub action: Action,
    #[serde(default)]
    pub series_ref: Option<String>,
    #[serde(default)]
    pub season: Option<i64>,
    #[serde(default)]
    pub episode: Option<i64>,
}

impl ResolveRequest {
    pub fn catalog(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            action: Action::Catalog,
            series_ref: None,
            season: None,
            episode: None,
        }
    }

    pub fn video_url(url: impl Into<String>, season: Option<i64>, episode: Option<i64>) -> Self {
        Self {
            url: url.into(),
            action: Action::VideoUrl,
            series_ref: None,
            season,
            episode,
        }
    }
}

/// Response to a [`ResolveRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolveResponse {
    Catalog(CatalogResult),
    Video {
        #[serde(rename = "videoUrl")]
        video_url: String,
    },
}

/// Error payload returned at the boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<&ResolveError> for ErrorBody {
    fn from(error: &ResolveError) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

/// A playable stream for one episode; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSource {
    pub provider: ProviderKind,
    pub stream_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}
