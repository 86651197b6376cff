use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error_handling::types::RelayError;

/// Identifier of a catalog entry.
///
/// Identifiers are positive integers assigned by the catalog backend. Parsing
/// from a request path is strict: anything that is not a positive decimal
/// integer is an `InvalidRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub i32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceId {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RelayError::InvalidRequest(format!(
                "'{}' is not a valid source id",
                s
            )));
        }
        match trimmed.parse::<i32>() {
            Ok(id) if id > 0 => Ok(SourceId(id)),
            _ => Err(RelayError::InvalidRequest(format!(
                "'{}' is not a valid source id",
                s
            ))),
        }
    }
}

/// A catalog entry as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: SourceId,
    pub name: String,
    pub location_code: Option<String>,
    pub group_title: Option<String>,
    pub tvg_id: Option<String>,
    pub tvg_logo: Option<String>,
    pub url: String,
}

/// An entry waiting to be stored; the backend assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChannel {
    pub name: String,
    pub location_code: Option<String>,
    pub group_title: Option<String>,
    pub tvg_id: Option<String>,
    pub tvg_logo: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelFilter {
    pub group: Option<String>,
    pub search: Option<String>,
    pub location_codes: Vec<String>,
    pub page: u64,
    pub limit: u64,
}

impl Default for ChannelFilter {
    fn default() -> Self {
        Self {
            group: None,
            search: None,
            location_codes: Vec::new(),
            page: 1,
            limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_items: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub page_size: u64,
}

impl Pagination {
    pub fn new(total_items: u64, current_page: u64, page_size: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_items.div_ceil(page_size)
        };
        Self {
            total_items,
            total_pages,
            current_page,
            page_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelPage {
    pub data: Vec<Channel>,
    pub pagination: Pagination,
}

/// Counters reported after replacing the catalog content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceSummary {
    pub inserted: u64,
    pub duplicates: u64,
}
