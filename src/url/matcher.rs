use url::Url;

/// Checks if a host matches a wildcard pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "rezka.ag" matches only "rezka.ag"
/// 2. Wildcard match: "*.rezka.ag" matches:
///    - "rezka.ag" (the bare domain)
///    - "hd.rezka.ag" (single subdomain)
///    - "a.b.rezka.ag" (nested subdomains)
///
/// # Examples
///
/// ```
/// use reel_resolver::url::matches_wildcard;
///
/// assert!(matches_wildcard("rezka.ag", "rezka.ag"));
/// assert!(!matches_wildcard("rezka.ag", "kinogo.biz"));
///
/// assert!(matches_wildcard("*.rezka.ag", "rezka.ag"));
/// assert!(matches_wildcard("*.rezka.ag", "hd.rezka.ag"));
/// assert!(!matches_wildcard("*.rezka.ag", "notrezka.ag"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Checks if a URL's host is covered by an allowlist pattern
///
/// Patterns without a port match on the host alone, whatever port the URL uses.
/// Patterns with a port ("127.0.0.1:8080") only match that exact host and port.
pub fn matches_host(pattern: &str, url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    let pattern = pattern.to_lowercase();

    match split_port(&pattern) {
        Some((pattern_host, port)) => {
            url.port_or_known_default() == Some(port) && matches_wildcard(pattern_host, &host)
        }
        None => matches_wildcard(&pattern, &host),
    }
}

/// Splits "host:port" into its parts; returns None when no valid port is present
pub fn split_port(pattern: &str) -> Option<(&str, u16)> {
    let (host, port) = pattern.rsplit_once(':')?;
    port.parse().ok().map(|port| (host, port))
}
