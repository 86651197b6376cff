//! Playlist ingestion.
//!
//! Turns an extended M3U playlist into catalog entries: `m3u_parser` reads
//! the records, `group_classifier` derives location codes from group titles
//! and `importer` stores the result through the `Catalog` trait.

pub mod group_classifier;
pub mod importer;
pub mod m3u_parser;

pub use importer::{import_playlist, import_playlist_file, ImportSummary};
