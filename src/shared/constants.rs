/// Default page size for pagination
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum page size allowed
pub const MAX_PAGE_SIZE: i64 = 100;

// =============================================================================
// ROLE CONSTANTS
// =============================================================================

/// Administrator role - manages settings, cleanup and logs; default download role
pub const ROLE_ADMINISTRATOR: &str = "administrator";

// =============================================================================
// FILE PROCESSING
// =============================================================================

/// Default chunk size for chunked encryption (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Smallest chunk size an administrator may configure (64 KiB)
pub const MIN_CHUNK_SIZE: usize = 64 * 1024;

/// Largest chunk size an administrator may configure (16 MiB)
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Staging leftovers of finished or abandoned tasks older than this are removed by the sweeper
pub const STAGING_MAX_AGE_SECS: u64 = 60 * 60;

/// Interval of the background cleanup worker
pub const CLEANUP_WORKER_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Largest file accepted by the direct multipart upload endpoint (64 MiB)
pub const MAX_UPLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Fallback MIME type when detection fails
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

// =============================================================================
// ACTIVITY LOG ACTIONS
// =============================================================================

pub const LOG_ACTION_UPLOAD: &str = "upload";
pub const LOG_ACTION_DOWNLOAD: &str = "download";
pub const LOG_ACTION_CLEANUP: &str = "cleanup";
pub const LOG_ACTION_ERROR: &str = "error";
pub const LOG_ACTION_SECURITY: &str = "security";
pub const LOG_ACTION_SETTINGS: &str = "settings";
