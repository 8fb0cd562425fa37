use serde::Deserialize;
use utoipa::IntoParams;

use crate::shared::types::PaginationQuery;

/// Filters for listing and exporting the activity log
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct LogQuery {
    /// Only entries with this action (upload, download, cleanup, error, security, settings)
    pub action: Option<String>,

    /// Page number (1-indexed, default: 1)
    pub page: Option<i64>,

    /// Number of items per page (default: 20, max: 100)
    pub page_size: Option<i64>,
}

impl LogQuery {
    pub fn pagination(&self) -> PaginationQuery {
        let defaults = PaginationQuery::default();
        PaginationQuery {
            page: self.page.unwrap_or(defaults.page),
            page_size: self.page_size.unwrap_or(defaults.page_size),
        }
    }

    pub fn action_filter(&self) -> Option<&str> {
        self.action.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }
}
