use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::features::files::handlers::{
    get_submission_files, intercept_uploads, list_files, upload_file,
};
use crate::features::files::services::{FileService, UploadService};
use crate::shared::constants::MAX_UPLOAD_SIZE;

#[derive(Clone)]
pub struct FilesState {
    pub uploads: Arc<UploadService>,
    pub files: Arc<FileService>,
}

/// Create routes for the files feature
pub fn routes(uploads: Arc<UploadService>, files: Arc<FileService>) -> Router {
    let state = FilesState { uploads, files };

    Router::new()
        .route("/api/uploads/intercept", post(intercept_uploads))
        .route(
            "/api/files/upload",
            // Allow body size up to MAX_UPLOAD_SIZE + buffer for multipart overhead
            post(upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE + 1024 * 1024)),
        )
        .route("/api/files", get(list_files))
        .route("/api/files/submission", get(get_submission_files))
        .with_state(state)
}
