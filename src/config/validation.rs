use crate::config::types::{CacheConfig, Config, FetchConfig, ProviderConfig, ProvidersConfig};
use crate::providers::ProviderKind;
use crate::url::{matches_host, matches_wildcard, split_port};
use crate::ConfigError;
use reqwest::header::{HeaderName, HeaderValue};
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_cache_config(&config.cache)?;
    validate_providers(&config.providers)?;
    Ok(())
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "timeout_ms must be greater than 0".to_string(),
        ));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.max_concurrent_per_host < 1 || config.max_concurrent_per_host > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_per_host must be between 1 and 64, got {}",
            config.max_concurrent_per_host
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    for (name, value) in &config.headers {
        HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            ConfigError::Validation(format!("Invalid header name '{}'", name))
        })?;
        HeaderValue::from_str(value).map_err(|_| {
            ConfigError::Validation(format!("Invalid value for header '{}'", name))
        })?;
    }

    Ok(())
}

/// Validates cache configuration
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.catalog_ttl_secs == 0 || config.stream_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "cache TTLs must be greater than 0".to_string(),
        ));
    }

    if config.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sweep_interval_secs must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates every enabled provider and checks that no host is claimed twice
fn validate_providers(providers: &ProvidersConfig) -> Result<(), ConfigError> {
    let enabled: Vec<(ProviderKind, &ProviderConfig)> = providers
        .entries()
        .into_iter()
        .filter(|(_, config)| config.enabled)
        .collect();

    for (kind, config) in &enabled {
        validate_provider(*kind, config)?;
    }

    for (i, (kind_a, config_a)) in enabled.iter().enumerate() {
        for (kind_b, config_b) in enabled.iter().skip(i + 1) {
            for a in &config_a.hosts {
                for b in &config_b.hosts {
                    if patterns_overlap(a, b) {
                        return Err(ConfigError::Validation(format!(
                            "Host pattern '{}' of {} overlaps '{}' of {}",
                            a, kind_a, b, kind_b
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Validates the settings of one provider
fn validate_provider(kind: ProviderKind, config: &ProviderConfig) -> Result<(), ConfigError> {
    if config.hosts.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Provider {} must list at least one host",
            kind
        )));
    }

    for pattern in &config.hosts {
        validate_host_pattern(pattern)?;
    }

    let base = Url::parse(&config.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid base_url for {}: {}", kind, e))
    })?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url for {} must be HTTP(S), got '{}'",
            kind, config.base_url
        )));
    }

    if !config.hosts.iter().any(|pattern| matches_host(pattern, &base)) {
        return Err(ConfigError::Validation(format!(
            "base_url '{}' is not covered by the host allowlist of {}",
            config.base_url, kind
        )));
    }

    if let Some(marker) = &config.catalog_marker {
        Selector::parse(marker).map_err(|_| {
            ConfigError::Validation(format!(
                "catalog_marker '{}' of {} is not a valid CSS selector",
                marker, kind
            ))
        })?;
    }

    if let Some(image_base) = &config.image_base {
        Url::parse(image_base).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid image_base for {}: {}", kind, e))
        })?;
    }

    Ok(())
}

/// Returns true if some host could be matched by both patterns
fn patterns_overlap(a: &str, b: &str) -> bool {
    let (host_a, port_a) = split_port(a).map_or((a, None), |(h, p)| (h, Some(p)));
    let (host_b, port_b) = split_port(b).map_or((b, None), |(h, p)| (h, Some(p)));

    if let (Some(pa), Some(pb)) = (port_a, port_b) {
        if pa != pb {
            return false;
        }
    }

    let bare_a = host_a.strip_prefix("*.").unwrap_or(host_a);
    let bare_b = host_b.strip_prefix("*.").unwrap_or(host_b);
    matches_wildcard(host_a, bare_b) || matches_wildcard(host_b, bare_a)
}

/// Validates a host pattern (supports wildcards and an optional port)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    let host = match pattern.rsplit_once(':') {
        Some(_) => match split_port(pattern) {
            Some((host, _)) => host,
            None => {
                return Err(ConfigError::InvalidPattern(format!(
                    "Host pattern '{}' has an invalid port",
                    pattern
                )))
            }
        },
        None => pattern,
    };

    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    match host.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None if host == "localhost" => Ok(()),
        None => validate_domain_string(host),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'rezka.ag')",
            domain
        )));
    }

    Ok(())
}
