//! Shared helpers for reading provider pages
//!
//! Provider pages mix HTML structure with player configuration embedded in
//! scripts. These helpers cover both: selector parsing, link resolution, media
//! URL discovery, and tolerant scanning of JSON arrays embedded in scripts.

use crate::providers::ProviderKind;
use crate::ResolveError;
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Quoted absolute URL pointing at an HLS playlist or MP4 file
static MEDIA_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["'](https?:(?:\\?/){2}[^"'\s]+?\.(?:m3u8|mp4)(?:\?[^"'\s]*)?)["']"#).unwrap()
});

/// One `[label]url or url` segment of a quality list
static QUALITY_SEGMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]([^\[]+)").unwrap());

static VIDEO_SOURCE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("video source[src], video[src]").unwrap());

/// Parses a CSS selector coming from configuration
pub fn parse_selector(provider: ProviderKind, css: &str) -> Result<Selector, ResolveError> {
    Selector::parse(css).map_err(|_| {
        ResolveError::InvalidRequest(format!(
            "catalog marker '{}' for {} is not a valid selector",
            css, provider
        ))
    })
}

/// Returns a non-blank attribute value
pub fn attr(element: &ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolves a link against a base URL
///
/// Returns None if the link should be ignored:
/// - javascript:, data:, mailto: schemes
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("data:")
        || href.starts_with("mailto:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string())
}

/// Finds a playable media URL in a player page
///
/// Checks `<video>`/`<source>` elements first, then quoted `.m3u8`/`.mp4`
/// URLs anywhere in the page.
pub fn find_media_url(document: &Html, body: &str, base_url: &Url) -> Option<String> {
    document
        .select(&VIDEO_SOURCE)
        .filter_map(|element| element.value().attr("src"))
        .find_map(|src| resolve_link(src, base_url))
        .or_else(|| {
            MEDIA_URL_RE
                .captures(body)
                .map(|caps| caps[1].replace("\\/", "/"))
        })
}

/// Reads an expiry hint (`expires` or `exp`, unix seconds) from a stream URL
pub fn expiry_from_url(url: &str) -> Option<DateTime<Utc>> {
    let url = Url::parse(url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "expires" || key == "exp")
        .and_then(|(_, value)| value.parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Picks the best variant from a quality list like
/// `[360p]https://a/360.mp4,[1080p]https://a/1080.m3u8 or https://a/1080.mp4`
///
/// The highest labelled quality wins. Among its alternatives, one without a
/// `:hls:` suffix is preferred. A plain URL without labels is returned as is.
pub fn best_quality_url(list: &str) -> Option<String> {
    let list = list.trim();
    if !list.starts_with('[') {
        return first_alternative(list);
    }

    QUALITY_SEGMENT_RE
        .captures_iter(list)
        .filter_map(|caps| {
            let url = first_alternative(caps[2].trim().trim_end_matches(','))?;
            Some((quality_rank(&caps[1]), url))
        })
        .max_by_key(|(rank, _)| *rank)
        .map(|(_, url)| url)
}

fn first_alternative(variants: &str) -> Option<String> {
    let alternatives: Vec<&str> = variants
        .split(" or ")
        .map(str::trim)
        .filter(|v| v.starts_with("http"))
        .collect();

    alternatives
        .iter()
        .find(|v| !v.contains(":hls:"))
        .or_else(|| alternatives.first())
        .map(|v| v.to_string())
}

/// Vertical resolution named by a label such as `1080p 60fps` or `4K`
///
/// Only the first number counts; a `K` right after it means thousands of
/// horizontal pixels.
fn quality_rank(label: &str) -> u32 {
    let label = label.to_ascii_lowercase();
    let Some(start) = label.find(|c: char| c.is_ascii_digit()) else {
        return 0;
    };
    let rest = &label[start..];
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let value = rest[..end].parse::<u32>().unwrap_or(0);

    if rest[end..].starts_with('k') && value < 10 {
        return value * 540;
    }
    value
}

/// Result of scanning a JSON array element by element
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayScan {
    /// Elements that parsed, in document order
    pub elements: Vec<serde_json::Value>,

    /// Why scanning stopped early, if it did
    pub stopped: Option<String>,
}

/// Scans the JSON array starting at `text[0] == '['`, one element at a time
///
/// A malformed or unterminated element stops the scan; everything before it
/// is kept.
pub fn scan_json_array(text: &str) -> ArrayScan {
    let mut elements = Vec::new();
    let bytes = text.as_bytes();

    if bytes.first() != Some(&b'[') {
        return ArrayScan {
            elements,
            stopped: Some("expected '['".to_string()),
        };
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 1;

    for (i, &b) in bytes.iter().enumerate().skip(1) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' if depth > 0 => depth -= 1,
            b',' | b']' if depth == 0 => {
                let raw = text[start..i].trim();
                if !(raw.is_empty() && b == b']' && elements.is_empty()) {
                    match serde_json::from_str::<serde_json::Value>(raw) {
                        Ok(value) => elements.push(value),
                        Err(e) => {
                            let reason =
                                format!("malformed element #{}: {}", elements.len() + 1, e);
                            return ArrayScan {
                                elements,
                                stopped: Some(reason),
                            };
                        }
                    }
                }
                if b == b']' {
                    return ArrayScan {
                        elements,
                        stopped: None,
                    };
                }
                start = i + 1;
            }
            _ => {}
        }
    }

    ArrayScan {
        elements,
        stopped: Some("unterminated array".to_string()),
    }
}

/// Locates a script array assigned to `key` (e.g. `file: [...]`) and returns
/// the text starting at its opening bracket
pub fn find_script_array<'a>(body: &'a str, key: &Regex) -> Option<&'a str> {
    let m = key.find(body)?;
    let rest = body[m.end()..].trim_start();
    rest.starts_with('[').then_some(rest)
}
