use serde::{Deserialize, Serialize};

use crate::catalog::types::ChannelFilter;
use crate::error_handling::types::CatalogError;

const BAD_PAGINATION: &str = "Page and limit must be positive integers.";

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Query string of `GET /channels`.
///
/// Everything is kept as raw text so malformed numbers become a `400`
/// instead of a rejected route.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelQuery {
    pub group: Option<String>,
    pub search: Option<String>,
    /// Comma separated location codes
    pub language_group_prefixes: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ChannelQuery {
    pub fn into_filter(self) -> Result<ChannelFilter, CatalogError> {
        let defaults = ChannelFilter::default();
        let location_codes = self
            .language_group_prefixes
            .map(|raw| {
                raw.split(',')
                    .map(|code| code.trim().to_uppercase())
                    .filter(|code| !code.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ChannelFilter {
            group: non_blank(self.group),
            search: non_blank(self.search),
            location_codes,
            page: positive_or(self.page, defaults.page)?,
            limit: positive_or(self.limit, defaults.limit)?,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn positive_or(raw: Option<String>, default: u64) -> Result<u64, CatalogError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => match value.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(CatalogError::InvalidFilter(BAD_PAGINATION.to_string())),
        },
    }
}
