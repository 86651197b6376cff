//! Catalog subsystem
//!
//! The catalog maps numeric source ids to remote stream addresses and backs
//! the browsing API.
//!
//! Components:
//! - `catalog_trait`: the Catalog trait defining a uniform API.
//! - `types`: shared data types (ids, entries, filters, pages).
//! - `database_catalog`: SQLite implementation using SeaORM.
//! - `memory_catalog`: in-process implementation seeded from a playlist.
//! - `db_entities`: SeaORM entity model for the database backend.

pub mod catalog_trait;
pub mod database_catalog;
pub mod db_entities;
pub mod memory_catalog;
pub mod types;

pub use catalog_trait::Catalog;
pub use database_catalog::DatabaseCatalog;
pub use memory_catalog::MemoryCatalog;
pub use types::{Channel, ChannelFilter, ChannelPage, NewChannel, SourceId};
