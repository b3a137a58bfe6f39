//! Title, description and duration cleanup

use once_cell::sync::Lazy;
use regex::Regex;

static ISO_DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^pt(?:(\d+)h)?(?:(\d+)m)?(?:(\d+(?:\.\d+)?)s)?$").unwrap()
});
static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}):(\d{2})(?::(\d{2}))?$").unwrap());
static HOURS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:hours?|hrs?|h|час[а-я]*|ч)\b").unwrap());
static MINUTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:minutes?|mins?|m|мин[а-я]*|м)\b").unwrap());

/// Characters trimmed from the ends of cleaned text
const SEPARATORS: &[char] = &['-', '|', ':', '—', '–', '·', ','];

/// Strips blocklisted marketing phrases and stray separators from text
#[derive(Debug, Clone)]
pub struct TextCleaner {
    blocklist: Option<Regex>,
}

impl TextCleaner {
    pub fn new(blocklist: &[String]) -> Self {
        let alternatives: Vec<String> = blocklist
            .iter()
            .map(|phrase| phrase.trim())
            .filter(|phrase| !phrase.is_empty())
            .map(regex::escape)
            .collect();

        let blocklist = if alternatives.is_empty() {
            None
        } else {
            match Regex::new(&format!("(?i){}", alternatives.join("|"))) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("Title blocklist ignored: {}", e);
                    None
                }
            }
        };

        Self { blocklist }
    }

    /// Returns cleaned text, or None when nothing meaningful is left
    pub fn clean(&self, raw: &str) -> Option<String> {
        let stripped = match &self.blocklist {
            Some(re) => re.replace_all(raw, " "),
            None => raw.into(),
        };

        let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        let trimmed = collapsed.trim_matches(|c: char| c.is_whitespace() || SEPARATORS.contains(&c));

        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Converts a provider duration into whole minutes
///
/// Accepts `45`, `45 мин`, `45 min`, `1h 5m`, `1 ч 5 мин`, `01:05:00`,
/// `42:10` (minutes:seconds) and ISO-8601 `PT45M`. Seconds are rounded.
pub fn parse_duration_minutes(raw: &str) -> Option<u32> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    let minutes = if let Ok(value) = text.parse::<u32>() {
        value
    } else if let Some(caps) = ISO_DURATION_RE.captures(&text) {
        if caps.get(1).is_none() && caps.get(2).is_none() && caps.get(3).is_none() {
            return None;
        }
        let hours = number(caps.get(1).map(|m| m.as_str()));
        let minutes = number(caps.get(2).map(|m| m.as_str()));
        let seconds = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0);
        total_minutes(hours, minutes, round_seconds(seconds as u32))?
    } else if let Some(caps) = CLOCK_RE.captures(&text) {
        let first = number(Some(&caps[1]));
        let second = number(Some(&caps[2]));
        match caps.get(3) {
            Some(third) => {
                total_minutes(first, second, round_seconds(number(Some(third.as_str()))))?
            }
            None => first.checked_add(round_seconds(second))?,
        }
    } else {
        let hours = HOURS_RE.captures(&text).map(|c| number(Some(&c[1])));
        let minutes = MINUTES_RE.captures(&text).map(|c| number(Some(&c[1])));
        if hours.is_none() && minutes.is_none() {
            return None;
        }
        total_minutes(hours.unwrap_or(0), minutes.unwrap_or(0), 0)?
    };

    (minutes > 0).then_some(minutes)
}

fn number(text: Option<&str>) -> u32 {
    text.and_then(|t| t.parse().ok()).unwrap_or(0)
}

/// `hours * 60 + minutes + extra`, or None when it does not fit
fn total_minutes(hours: u32, minutes: u32, extra: u32) -> Option<u32> {
    hours.checked_mul(60)?.checked_add(minutes)?.checked_add(extra)
}

fn round_seconds(seconds: u32) -> u32 {
    u32::from(seconds >= 30)
}
