use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outcome of one scheduled sweep
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SweepReportDto {
    /// Expired uploads removed (blob and record)
    pub processed: u64,
    /// Uploads whose blob could not be deleted; their records are kept
    pub failed: u64,
    /// Stale staging files removed
    pub staging_removed: usize,
    /// A full batch was processed and more expired uploads may remain
    pub more_pending: bool,
}
