mod activity_log_service;

pub use activity_log_service::{to_csv, ActivityLogService};
