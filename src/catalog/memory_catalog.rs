use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use log::{debug, info};

use crate::catalog::catalog_trait::{validate_filter, Catalog};
use crate::catalog::types::{
    Channel, ChannelFilter, ChannelPage, NewChannel, Pagination, ReplaceSummary, SourceId,
};
use crate::error_handling::types::CatalogError;

/// In-process catalog, used when no database is configured and the server
/// is started directly from a playlist file.
pub struct MemoryCatalog {
    channels: RwLock<BTreeMap<SourceId, Channel>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<SourceId, Channel>>, CatalogError> {
        self.channels
            .read()
            .map_err(|_| CatalogError::ReadFailed("catalog lock poisoned".to_string()))
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(channel: &Channel, filter: &ChannelFilter) -> bool {
    if let Some(group) = &filter.group {
        if channel.group_title.as_deref() != Some(group.as_str()) {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        if !channel.name.to_lowercase().contains(&search.to_lowercase()) {
            return false;
        }
    }
    if !filter.location_codes.is_empty() {
        match &channel.location_code {
            Some(code) if filter.location_codes.contains(code) => {}
            _ => return false,
        }
    }
    true
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get_channel(&self, id: SourceId) -> Result<Option<Channel>, CatalogError> {
        Ok(self.read()?.get(&id).cloned())
    }

    async fn list_channels(&self, filter: &ChannelFilter) -> Result<ChannelPage, CatalogError> {
        validate_filter(filter)?;
        let channels = self.read()?;

        let mut selected: Vec<&Channel> = channels.values().filter(|c| matches(c, filter)).collect();
        selected.sort_by(|a, b| a.name.cmp(&b.name));

        let total_items = selected.len() as u64;
        let offset = ((filter.page - 1) * filter.limit) as usize;
        let data = selected
            .into_iter()
            .skip(offset)
            .take(filter.limit as usize)
            .cloned()
            .collect();

        Ok(ChannelPage {
            data,
            pagination: Pagination::new(total_items, filter.page, filter.limit),
        })
    }

    async fn list_groups(&self) -> Result<Vec<String>, CatalogError> {
        let groups: BTreeSet<String> = self
            .read()?
            .values()
            .filter_map(|c| c.group_title.clone())
            .filter(|g| !g.is_empty())
            .collect();
        Ok(groups.into_iter().collect())
    }

    async fn replace_channels(
        &self,
        entries: Vec<NewChannel>,
    ) -> Result<ReplaceSummary, CatalogError> {
        let mut channels = self
            .channels
            .write()
            .map_err(|_| CatalogError::WriteFailed("catalog lock poisoned".to_string()))?;
        channels.clear();

        let mut seen_urls = HashSet::new();
        let mut summary = ReplaceSummary::default();
        let mut next_id = 1;
        for entry in entries {
            if !seen_urls.insert(entry.url.clone()) {
                debug!("Skipping duplicate url {}", entry.url);
                summary.duplicates += 1;
                continue;
            }
            let id = SourceId(next_id);
            next_id += 1;
            channels.insert(
                id,
                Channel {
                    id,
                    name: entry.name,
                    location_code: entry.location_code,
                    group_title: entry.group_title,
                    tvg_id: entry.tvg_id,
                    tvg_logo: entry.tvg_logo,
                    url: entry.url,
                },
            );
            summary.inserted += 1;
        }

        info!(
            "In-memory catalog replaced: {} inserted, {} duplicate urls skipped",
            summary.inserted, summary.duplicates
        );
        Ok(summary)
    }
}
