mod cleanup_service;

pub use cleanup_service::{cleanup_cutoff, is_due, manual_cutoff, CleanupService};
