//! Season/episode ordinal parsing
//!
//! Providers print ordinals in many shapes: `S1E2`, `1x02`, `Season 1 Episode
//! 2`, `1 сезон 2 серия`, `Сезон 1 Серия 2`, transliterated `sezon`/`seriya`,
//! and spelled-out numbers ("second", "вторая", "vtoraya").

use crate::providers::RawOrdinal;
use once_cell::sync::Lazy;
use regex::Regex;

static SXE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bs(\d{1,3})\s*[._-]?\s*e(\d{1,4})\b").unwrap());
static NXN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d{1,3})\s*x\s*(\d{1,4})\b").unwrap());
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

const ENGLISH_CARDINALS: [&str; 12] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
    "twelve",
];

const ENGLISH_ORDINALS: [&str; 12] = [
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth", "tenth",
    "eleventh", "twelfth",
];

/// Russian ordinal stems and their transliterations, indexed by value - 1
const RUSSIAN_STEMS: [(&str, &str); 10] = [
    ("перв", "perv"),
    ("втор", "vtor"),
    ("трет", "tret"),
    ("четв", "chetv"),
    ("пят", "pyat"),
    ("шест", "shest"),
    ("седьм", "sedm"),
    ("восьм", "vosm"),
    ("девят", "devyat"),
    ("десят", "desyat"),
];

const SEASON_WORDS: [&str; 3] = ["season", "сезон", "sezon"];
const EPISODE_WORDS: [&str; 5] = ["episod", "эпизод", "сери", "seri", "ep"];

/// Parses a single ordinal ("2", "Сезон 2", "second", "вторая")
///
/// Returns None for anything below 1.
pub fn parse_ordinal(label: &str) -> Option<u32> {
    let label = label.trim().to_lowercase();

    if let Some(m) = DIGITS_RE.find(&label) {
        return m.as_str().parse::<u32>().ok().filter(|n| *n >= 1);
    }

    words(&label).into_iter().find_map(ordinal_word)
}

/// Parses a label carrying both season and episode
pub fn parse_ordinal_pair(label: &str) -> Option<(u32, u32)> {
    let label = label.trim().to_lowercase();

    let numeric = SXE_RE.captures(&label).or_else(|| NXN_RE.captures(&label));
    if let Some(caps) = numeric {
        return positive_pair(caps[1].parse().ok()?, caps[2].parse().ok()?);
    }

    let words = words(&label);
    let season_at = words.iter().position(|w| is_keyword(w, &SEASON_WORDS))?;
    let episode_at = words.iter().position(|w| is_keyword(w, &EPISODE_WORDS))?;

    // "Season 1 Episode 2" puts numbers after keywords, "1 сезон 2 серия" before
    let after = season_at == 0 || episode_at == 0;
    let season = value_near(&words, season_at, after)?;
    let episode = value_near(&words, episode_at, after)?;

    positive_pair(season, episode)
}

/// Resolves a raw ordinal to `(season, episode)`
pub fn resolve_ordinal(ordinal: &RawOrdinal) -> Option<(u32, u32)> {
    match ordinal {
        RawOrdinal::Split { season, episode } => Some((parse_ordinal(season)?, parse_ordinal(episode)?)),
        RawOrdinal::Combined(label) => parse_ordinal_pair(label),
    }
}

fn positive_pair(season: u32, episode: u32) -> Option<(u32, u32)> {
    (season >= 1 && episode >= 1).then_some((season, episode))
}

/// Splits into alphanumeric words, dropping one-letter suffixes like "-й"
fn words(label: &str) -> Vec<&str> {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .filter(|w| w.chars().count() > 1 || w.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

fn is_keyword(word: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| word.starts_with(k))
}

fn value_near(words: &[&str], keyword_at: usize, after: bool) -> Option<u32> {
    let neighbor = if after {
        words.get(keyword_at + 1)
    } else {
        keyword_at.checked_sub(1).and_then(|i| words.get(i))
    };
    neighbor.and_then(|w| ordinal_word(w))
}

fn ordinal_word(word: &str) -> Option<u32> {
    if word.chars().all(|c| c.is_ascii_digit()) {
        return word.parse::<u32>().ok().filter(|n| *n >= 1);
    }

    let english = ENGLISH_CARDINALS
        .iter()
        .position(|w| *w == word)
        .or_else(|| ENGLISH_ORDINALS.iter().position(|w| *w == word));
    if let Some(index) = english {
        return Some(index as u32 + 1);
    }

    RUSSIAN_STEMS
        .iter()
        .position(|(cyrillic, latin)| word.starts_with(cyrillic) || word.starts_with(latin))
        .map(|index| index as u32 + 1)
}
