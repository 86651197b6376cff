//! Catalog Trait
//!
//! This module defines the `Catalog` trait, the interface the relay core and
//! the web layer use to reach the list of playable sources.
//!
//! Implementors are responsible for:
//! - Resolving a source id to its remote address
//! - Listing and filtering entries for browsing clients
//! - Replacing the whole content when a playlist is imported

use async_trait::async_trait;

use crate::catalog::types::{Channel, ChannelFilter, ChannelPage, NewChannel, ReplaceSummary, SourceId};
use crate::error_handling::types::CatalogError;

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns a single entry, or `None` when the id is unknown.
    async fn get_channel(&self, id: SourceId) -> Result<Option<Channel>, CatalogError>;

    /// Resolves the remote address the relay should ingest for `id`.
    async fn lookup_source_address(&self, id: SourceId) -> Result<Option<String>, CatalogError> {
        Ok(self.get_channel(id).await?.map(|channel| channel.url))
    }

    /// Lists entries matching `filter`, ordered by name, one page at a time.
    async fn list_channels(&self, filter: &ChannelFilter) -> Result<ChannelPage, CatalogError>;

    /// Distinct, non-empty group titles in ascending order.
    async fn list_groups(&self) -> Result<Vec<String>, CatalogError>;

    /// Clears the catalog and stores `channels`, skipping duplicate URLs.
    async fn replace_channels(&self, channels: Vec<NewChannel>) -> Result<ReplaceSummary, CatalogError>;
}

/// Shared validation for paginated listings.
pub fn validate_filter(filter: &ChannelFilter) -> Result<(), CatalogError> {
    if filter.page == 0 || filter.limit == 0 {
        return Err(CatalogError::InvalidFilter(
            "Page and limit must be positive integers.".to_string(),
        ));
    }
    Ok(())
}
