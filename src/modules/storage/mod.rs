//! Storage module for encrypted blobs
//!
//! Keeps uploads in a private, non-web-accessible directory with owner-only
//! permissions and a staging area for chunked processing.

mod private_dir;

pub use private_dir::{
    exists, generate_stored_name, move_file, read_range, relocate_blobs, remove_if_exists,
    resolve_within, truncate_to, PrivateStorage, RelocationReport, StagedFile, StagedKind,
    STAGING_DIR,
};
