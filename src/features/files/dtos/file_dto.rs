use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::features::downloads::dtos::DownloadLinkDto;
use crate::features::files::models::{CipherMode, SecureFile};
use crate::features::tasks::dtos::QueuedTaskDto;

/// One path or a list of paths, as the form builder reports a field's uploads.
///
/// The same shape is returned with each path replaced by its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum UploadedPaths {
    One(String),
    Many(Vec<String>),
}

impl UploadedPaths {
    pub fn len(&self) -> usize {
        match self {
            UploadedPaths::One(_) => 1,
            UploadedPaths::Many(paths) => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Request body of the upload interceptor
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InterceptUploadDto {
    /// Field name to the uploaded path(s) inside the incoming directory
    pub files: BTreeMap<String, UploadedPaths>,
    pub form_id: Option<i64>,
    pub submission_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InterceptResponseDto {
    /// Field name to download URL, task id, or the untouched original path
    pub files: BTreeMap<String, UploadedPaths>,
    /// Large files queued for chunked encryption
    pub queued: Vec<QueuedTaskDto>,
}

/// Multipart form of the direct upload endpoint.
/// Note: This struct is for Swagger UI documentation only.
/// The actual handler uses axum's Multipart extractor directly.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadFileDto {
    /// The file to upload
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    pub form_id: Option<i64>,
    pub submission_id: Option<i64>,
}

/// Result of a direct upload: either a finished link or a queued task
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResultDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<DownloadLinkDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<QueuedTaskDto>,
}

/// A stored upload with a download link for the viewing user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SecureFileDto {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub upload_user_login: Option<String>,
    pub form_id: Option<i64>,
    pub submission_id: Option<i64>,
    pub cipher_mode: CipherMode,
    pub upload_time: DateTime<Utc>,
    pub link: DownloadLinkDto,
}

impl SecureFileDto {
    pub fn new(file: SecureFile, link: DownloadLinkDto) -> Self {
        Self {
            id: file.id,
            filename: file.filename,
            original_name: file.original_name,
            mime_type: file.mime_type,
            file_size: file.file_size,
            upload_user_login: file.upload_user_login,
            form_id: file.form_id,
            submission_id: file.submission_id,
            cipher_mode: file.cipher_mode,
            upload_time: file.upload_time,
            link,
        }
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct SubmissionFilesQuery {
    pub submission_id: i64,
    pub form_id: Option<i64>,
}
