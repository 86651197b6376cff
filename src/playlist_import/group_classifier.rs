//! Derives a location code and a cleaned group title from the raw
//! `group-title` attribute found in IPTV playlists.
//!
//! Rules are applied in order and the first match wins:
//! 1. `XX| title` and `XX - title` prefixes, so `WT| title` yields `WT`
//! 2. known country or language names at the start of the title
//! 3. `PT/BR -`, then `MENA` and `EU` anywhere in the title
//! 4. Arabic script
//! 5. adult content marker
//! 6. worldwide brand keywords, otherwise `OTHER`

use regex::Regex;
use std::sync::LazyLock;

const LOCATION_NAMES: &[(&str, &str)] = &[
    ("ESPAÑA", "ES"),
    ("GERMANY", "DE"),
    ("FRANCE", "FR"),
    ("ITALY", "IT"),
    ("ENGLISH", "EN"),
    ("NORDIC", "ND"),
    ("TURKISH", "TR"),
    ("TURKSIH", "TR"),
    ("ÍSLANDS", "IS"),
    ("HEBREW", "IL"),
    ("QUÉBEC", "QC"),
    ("POLSKA", "PL"),
    ("SUOMEN", "FI"),
    ("SUOMI", "FI"),
    ("SVENSK", "SE"),
    ("SVENSKA", "SE"),
    ("NORGE", "NO"),
    ("NORSK", "NO"),
    ("INDIA", "IN"),
    ("INDIAN", "IN"),
    ("KOREAN", "KO"),
    ("KURDISH", "KU"),
    ("LATINO", "LA"),
    ("MALTA", "MT"),
    ("PAKISTAN", "PK"),
    ("PERSIAN", "IR"),
    ("PHILIPPINES", "PH"),
    ("RUSSAIN", "RU"),
    ("SOUTH AFRICA", "ZA"),
    ("VIDEOLAND", "NL"),
];

const WORLDWIDE_KEYWORDS: &[&str] = &[
    "NETFLIX",
    "DISNEY+",
    "AMAZON PRIME",
    "APPLE TV+",
    "PARAMOUNT",
    "HBO MAX",
    "SHOWTIME",
    "UNIVERSAL",
    "PEACOCK",
    "DREAMWORKS",
    "MARVEL",
    "STAR WARS",
    "SOCCER",
    "VIAPLAY",
    "SKY",
];

pub const FALLBACK_GROUP: &str = "Uncategorized";

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("group classifier pattern is a valid constant regex")
}

static PREFIX_PIPE: LazyLock<Regex> = LazyLock::new(|| pattern(r"^([A-Z]{2})\|\s*(.*)$"));
static PREFIX_DASH: LazyLock<Regex> = LazyLock::new(|| pattern(r"^([A-Z]{2})\s+-\s+(.*)$"));
static PT_BR: LazyLock<Regex> = LazyLock::new(|| pattern(r"^PT/BR\s*-\s*(.*)$"));
static MENA: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)MENA"));
static EU: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)EU"));
static ARABIC: LazyLock<Regex> = LazyLock::new(|| pattern(r"[\u{0600}-\u{06FF}]"));
static ADULT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)FOR ADULTS"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub location_code: String,
    pub group_title: String,
}

pub fn classify_group(raw: &str) -> GroupInfo {
    let (code, cleaned) = match_rules(raw);
    let location_code = code
        .or_else(|| worldwide_code(raw))
        .unwrap_or_else(|| "OTHER".to_string());

    let group_title = if !cleaned.is_empty() {
        cleaned
    } else if !raw.is_empty() {
        raw.to_string()
    } else {
        FALLBACK_GROUP.to_string()
    };

    GroupInfo {
        location_code,
        group_title,
    }
}

fn match_rules(raw: &str) -> (Option<String>, String) {
    if let Some(caps) = PREFIX_PIPE
        .captures(raw)
        .or_else(|| PREFIX_DASH.captures(raw))
    {
        return (Some(caps[1].to_string()), caps[2].trim().to_string());
    }

    let upper = raw.to_uppercase();
    for (name, code) in LOCATION_NAMES {
        if upper.starts_with(&format!("{} ", name)) {
            let rest: String = raw.chars().skip(name.chars().count()).collect();
            let rest = rest.trim();
            let rest = rest.strip_prefix('-').map_or(rest, str::trim);
            return (Some(code.to_string()), rest.to_string());
        }
    }

    if let Some(caps) = PT_BR.captures(raw) {
        return (Some("BR".to_string()), caps[1].trim().to_string());
    }

    let code = if MENA.is_match(raw) {
        Some("AR")
    } else if EU.is_match(raw) {
        Some("EU")
    } else if ARABIC.is_match(raw) {
        Some("AR")
    } else if ADULT.is_match(raw) {
        Some("XXX")
    } else {
        None
    };
    (code.map(String::from), raw.to_string())
}

fn worldwide_code(raw: &str) -> Option<String> {
    let upper = raw.to_uppercase();
    WORLDWIDE_KEYWORDS
        .iter()
        .any(|keyword| upper.contains(keyword))
        .then(|| "WW".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(raw: &str, code: &str, title: &str) {
        let info = classify_group(raw);
        assert_eq!(info.location_code, code, "code for {:?}", raw);
        assert_eq!(info.group_title, title, "title for {:?}", raw);
    }

    #[test]
    fn two_letter_prefixes() {
        check("FR| NEWS", "FR", "NEWS");
        check("DE - Sport", "DE", "Sport");
        check("UK|", "UK", "UK|");
    }

    #[test]
    fn known_names() {
        check("FRANCE - Cinema", "FR", "Cinema");
        check("España Deportes", "ES", "Deportes");
        check("south africa Music", "ZA", "Music");
    }

    #[test]
    fn keyword_rules() {
        check("PT/BR - Filmes", "BR", "Filmes");
        check("WT| Docs", "WT", "Docs");
        check("Mena Sports", "AR", "Mena Sports");
        check("Euro Channels", "EU", "Euro Channels");
        check("قنوات", "AR", "قنوات");
        check("Movies FOR ADULTS", "XXX", "Movies FOR ADULTS");
    }

    #[test]
    fn worldwide_and_fallbacks() {
        check("Netflix Series", "WW", "Netflix Series");
        check("Random", "OTHER", "Random");
        check("", "OTHER", "Uncategorized");
    }
}
