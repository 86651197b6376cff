//! Extended M3U playlist parsing.
//!
//! Only the subset used by IPTV playlists is understood: an `#EXTINF` line
//! carrying `key="value"` attributes and a display title, followed by the
//! entry address on the next non-directive line.

use log::{debug, warn};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z0-9_-]+)=(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is a valid constant regex")
});

/// One playable entry read from a playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub name: String,
    /// Raw `group-title` attribute, before classification
    pub group_title: Option<String>,
    pub tvg_id: Option<String>,
    pub tvg_logo: Option<String>,
    pub url: String,
}

#[derive(Debug, Default)]
pub struct ParsedPlaylist {
    pub entries: Vec<PlaylistEntry>,
    /// `#EXTINF` records seen, including skipped ones
    pub parsed: usize,
    /// Records dropped because they had no address
    pub skipped: usize,
}

struct EntryInfo {
    attributes: HashMap<String, String>,
    title: Option<String>,
}

/// Parses playlist text into entries.
pub fn parse_playlist(content: &str) -> ParsedPlaylist {
    let mut playlist = ParsedPlaylist::default();
    let mut pending: Option<EntryInfo> = None;

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            if let Some(previous) = pending.take() {
                warn!(
                    "Entry '{}' has no address, skipping",
                    display_name(&previous)
                );
                playlist.skipped += 1;
            }
            playlist.parsed += 1;
            pending = Some(parse_extinf(rest));
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        match pending.take() {
            Some(info) => playlist.entries.push(PlaylistEntry {
                name: display_name(&info),
                group_title: non_empty(info.attributes.get("group-title")),
                tvg_id: info.attributes.get("tvg-id").cloned(),
                tvg_logo: info.attributes.get("tvg-logo").cloned(),
                url: line.to_string(),
            }),
            None => debug!("Line {} is an address without #EXTINF, ignoring", index + 1),
        }
    }

    if let Some(last) = pending {
        warn!("Entry '{}' has no address, skipping", display_name(&last));
        playlist.skipped += 1;
    }

    debug!(
        "Parsed playlist: {} records, {} entries, {} skipped",
        playlist.parsed,
        playlist.entries.len(),
        playlist.skipped
    );
    playlist
}

fn parse_extinf(rest: &str) -> EntryInfo {
    let mut attributes = HashMap::new();
    for caps in ATTRIBUTE_RE.captures_iter(rest) {
        let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
        attributes.insert(caps[1].to_lowercase(), value.to_string());
    }

    let title = last_unquoted_comma(rest)
        .map(|pos| rest[pos + 1..].trim().to_string())
        .filter(|t| !t.is_empty());

    EntryInfo { attributes, title }
}

/// Byte offset of the last comma that is not inside a quoted attribute value.
fn last_unquoted_comma(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut last = None;
    for (pos, c) in s.char_indices() {
        match (quote, c) {
            (None, '"') | (None, '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => last = Some(pos),
            _ => {}
        }
    }
    last
}

fn display_name(info: &EntryInfo) -> String {
    non_empty(info.attributes.get("tvg-name"))
        .or_else(|| info.title.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}
