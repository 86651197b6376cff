use log::info;
use serde::Serialize;
use std::path::Path;

use crate::catalog::types::NewChannel;
use crate::catalog::Catalog;
use crate::error_handling::types::ImportError;
use crate::playlist_import::group_classifier::{classify_group, FALLBACK_GROUP};
use crate::playlist_import::m3u_parser::{parse_playlist, PlaylistEntry};

/// Counters reported at the end of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub parsed: usize,
    pub skipped: usize,
    pub inserted: u64,
    pub duplicates: u64,
}

/// Reads the playlist at `path` and replaces the catalog content with it.
pub async fn import_playlist_file<P: AsRef<Path>>(
    path: P,
    catalog: &dyn Catalog,
) -> Result<ImportSummary, ImportError> {
    let path = path.as_ref();
    info!("Reading playlist from {}", path.display());
    let content = tokio::fs::read_to_string(path).await?;
    import_playlist(&content, catalog).await
}

/// Parses `content`, classifies each entry's group and stores the result.
///
/// The catalog is left untouched when the playlist holds no entry at all.
pub async fn import_playlist(
    content: &str,
    catalog: &dyn Catalog,
) -> Result<ImportSummary, ImportError> {
    let playlist = parse_playlist(content);
    if playlist.entries.is_empty() {
        return Err(ImportError::EmptyPlaylist);
    }

    let channels: Vec<NewChannel> = playlist.entries.into_iter().map(to_new_channel).collect();
    info!("Prepared {} channels for insertion", channels.len());

    let stored = catalog.replace_channels(channels).await?;
    let summary = ImportSummary {
        parsed: playlist.parsed,
        skipped: playlist.skipped,
        inserted: stored.inserted,
        duplicates: stored.duplicates,
    };
    info!(
        "Playlist import complete: parsed={} skipped={} inserted={} duplicates={}",
        summary.parsed, summary.skipped, summary.inserted, summary.duplicates
    );
    Ok(summary)
}

fn to_new_channel(entry: PlaylistEntry) -> NewChannel {
    let raw_group = entry.group_title.as_deref().unwrap_or(FALLBACK_GROUP);
    let group = classify_group(raw_group);
    NewChannel {
        name: entry.name,
        location_code: Some(group.location_code),
        group_title: Some(group.group_title),
        tvg_id: entry.tvg_id,
        tvg_logo: entry.tvg_logo,
        url: entry.url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::{ChannelFilter, SourceId};
    use crate::catalog::MemoryCatalog;
    use tempfile::TempDir;

    const PLAYLIST: &str = "#EXTM3U
#EXTINF:-1 tvg-name=\"Arte\" group-title=\"FR| CULTURE\",Arte
http://example.com/arte
#EXTINF:-1,No group
http://example.com/nogroup
#EXTINF:-1 group-title=\"FR| CULTURE\",Arte again
http://example.com/arte
#EXTINF:-1,Missing address
";

    #[tokio::test]
    async fn imports_classified_entries() {
        let catalog = MemoryCatalog::new();
        let summary = import_playlist(PLAYLIST, &catalog).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                parsed: 4,
                skipped: 1,
                inserted: 2,
                duplicates: 1,
            }
        );

        let arte = catalog.get_channel(SourceId(1)).await.unwrap().unwrap();
        assert_eq!(arte.location_code.as_deref(), Some("FR"));
        assert_eq!(arte.group_title.as_deref(), Some("CULTURE"));

        let other = catalog.get_channel(SourceId(2)).await.unwrap().unwrap();
        assert_eq!(other.name, "No group");
        assert_eq!(other.location_code.as_deref(), Some("OTHER"));
        assert_eq!(other.group_title.as_deref(), Some("Uncategorized"));
    }

    #[tokio::test]
    async fn empty_playlist_keeps_catalog() {
        let catalog = MemoryCatalog::new();
        import_playlist(PLAYLIST, &catalog).await.unwrap();

        let result = import_playlist("#EXTM3U\n", &catalog).await;
        assert!(matches!(result, Err(ImportError::EmptyPlaylist)));
        let page = catalog.list_channels(&ChannelFilter::default()).await.unwrap();
        assert_eq!(page.pagination.total_items, 2);
    }

    #[tokio::test]
    async fn reads_playlist_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("list.m3u");
        std::fs::write(&path, PLAYLIST).unwrap();

        let catalog = MemoryCatalog::new();
        let summary = import_playlist_file(&path, &catalog).await.unwrap();
        assert_eq!(summary.inserted, 2);

        let missing = import_playlist_file(dir.path().join("nope.m3u"), &catalog).await;
        assert!(matches!(missing, Err(ImportError::IoError(_))));
    }
}
