use crate::providers::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Reel-Resolver
///
/// Every section is optional in the TOML file; missing sections fall back to
/// the defaults below.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Outbound HTTP behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Hard timeout for a single attempt (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Total attempts per fetch, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between attempts (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Maximum number of redirects followed per attempt
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Maximum in-flight requests against one host
    #[serde(
        rename = "max-concurrent-per-host",
        default = "default_max_concurrent_per_host"
    )]
    pub max_concurrent_per_host: u32,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Extra headers sent with every request
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            max_redirects: default_max_redirects(),
            max_concurrent_per_host: default_max_concurrent_per_host(),
            user_agent: default_user_agent(),
            headers: default_headers(),
        }
    }
}

/// Cache lifetimes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Lifetime of a resolved catalog (seconds)
    #[serde(rename = "catalog-ttl-secs", default = "default_catalog_ttl_secs")]
    pub catalog_ttl_secs: u64,

    /// Lifetime of a resolved stream URL when the provider gives no expiry (seconds)
    #[serde(rename = "stream-ttl-secs", default = "default_stream_ttl_secs")]
    pub stream_ttl_secs: u64,

    /// Interval between sweeps of expired entries (seconds)
    #[serde(rename = "sweep-interval-secs", default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }

    pub fn stream_ttl(&self) -> Duration {
        Duration::from_secs(self.stream_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            catalog_ttl_secs: default_catalog_ttl_secs(),
            stream_ttl_secs: default_stream_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Text normalization settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NormalizeConfig {
    /// Substrings stripped from titles and descriptions (case-insensitive)
    #[serde(rename = "title-blocklist", default = "default_title_blocklist")]
    pub title_blocklist: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            title_blocklist: default_title_blocklist(),
        }
    }
}

/// Per-provider settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default = "ProviderConfig::kinogo")]
    pub kinogo: ProviderConfig,
    #[serde(default = "ProviderConfig::vidlink")]
    pub vidlink: ProviderConfig,
    #[serde(default = "ProviderConfig::rezka")]
    pub rezka: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            kinogo: ProviderConfig::kinogo(),
            vidlink: ProviderConfig::vidlink(),
            rezka: ProviderConfig::rezka(),
        }
    }
}

/// Settings for one provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Disabled providers never match a URL
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Host allowlist (e.g., "rezka.ag", "*.rezka.ag", "127.0.0.1:8080")
    pub hosts: Vec<String>,

    /// Base URL used to build per-episode URLs
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// CSS selector whose presence marks an intact catalog page
    #[serde(rename = "catalog-marker", default)]
    pub catalog_marker: Option<String>,

    /// Base URL for relative thumbnail paths
    #[serde(rename = "image-base", default)]
    pub image_base: Option<String>,
}

impl ProviderConfig {
    pub fn kinogo() -> Self {
        Self {
            enabled: true,
            hosts: vec!["kinogo.biz".to_string(), "*.kinogo.biz".to_string()],
            base_url: "https://kinogo.biz".to_string(),
            catalog_marker: None,
            image_base: None,
        }
    }

    pub fn vidlink() -> Self {
        Self {
            enabled: true,
            hosts: vec!["vidlink.pro".to_string(), "*.vidlink.pro".to_string()],
            base_url: "https://vidlink.pro".to_string(),
            catalog_marker: None,
            image_base: Some("https://image.tmdb.org/t/p/w300".to_string()),
        }
    }

    pub fn rezka() -> Self {
        Self {
            enabled: true,
            hosts: vec!["rezka.ag".to_string(), "*.rezka.ag".to_string()],
            base_url: "https://rezka.ag".to_string(),
            catalog_marker: None,
            image_base: None,
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_max_redirects() -> u32 {
    5
}

fn default_max_concurrent_per_host() -> u32 {
    4
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".to_string()
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "accept-language".to_string(),
        "ru-RU,ru;q=0.9,en;q=0.8".to_string(),
    )])
}

fn default_catalog_ttl_secs() -> u64 {
    6 * 60 * 60
}

fn default_stream_ttl_secs() -> u64 {
    10 * 60
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_title_blocklist() -> Vec<String> {
    vec![
        "смотреть онлайн".to_string(),
        "в хорошем качестве".to_string(),
        "бесплатно".to_string(),
        "watch online".to_string(),
        "HDrezka".to_string(),
        "kinogo".to_string(),
    ]
}

fn default_enabled() -> bool {
    true
}

impl ProvidersConfig {
    /// Returns every provider's settings paired with its kind
    pub fn entries(&self) -> [(ProviderKind, &ProviderConfig); 3] {
        [
            (ProviderKind::Kinogo, &self.kinogo),
            (ProviderKind::VidLink, &self.vidlink),
            (ProviderKind::Rezka, &self.rezka),
        ]
    }

    /// Returns the settings of one provider
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Kinogo => &self.kinogo,
            ProviderKind::VidLink => &self.vidlink,
            ProviderKind::Rezka => &self.rezka,
        }
    }
}
