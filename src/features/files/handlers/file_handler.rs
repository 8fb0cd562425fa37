use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppJson, ClientIp};
use crate::features::auth::guards::RequireAdministrator;
use crate::features::auth::model::AuthenticatedUser;
use crate::features::files::dtos::{
    InterceptResponseDto, InterceptUploadDto, SecureFileDto, SubmissionFilesQuery, UploadFileDto,
    UploadResultDto,
};
use crate::features::files::routes::FilesState;
use crate::features::files::services::UploadContext;
use crate::shared::constants::MAX_UPLOAD_SIZE;
use crate::shared::types::{ApiResponse, Meta, PaginationQuery};

/// Protect the uploads of a form submission
///
/// Each path is replaced by a download URL (small files), a task id (files
/// queued for chunked encryption) or, when the file could not be protected,
/// the original path.
#[utoipa::path(
    post,
    path = "/api/uploads/intercept",
    request_body = InterceptUploadDto,
    responses(
        (status = 200, description = "Uploads processed", body = ApiResponse<InterceptResponseDto>),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "files",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn intercept_uploads(
    user: AuthenticatedUser,
    ClientIp(ip): ClientIp,
    State(state): State<FilesState>,
    AppJson(dto): AppJson<InterceptUploadDto>,
) -> Result<Json<ApiResponse<InterceptResponseDto>>> {
    if dto.files.is_empty() {
        return Err(AppError::Validation("files must not be empty".to_string()));
    }

    let response = state.uploads.intercept(dto, &user, &ip).await;
    Ok(Json(ApiResponse::success(Some(response), None, None)))
}

/// Upload and encrypt a file
///
/// Accepts multipart/form-data with:
/// - `file`: The file to upload (required)
/// - `form_id`, `submission_id`: Optional submission linkage
#[utoipa::path(
    post,
    path = "/api/files/upload",
    request_body(
        content = UploadFileDto,
        content_type = "multipart/form-data",
        description = "File upload form with optional form and submission ids",
    ),
    responses(
        (status = 201, description = "File encrypted or queued", body = ApiResponse<UploadResultDto>),
        (status = 400, description = "Invalid file or validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "File too large")
    ),
    tag = "files",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upload_file(
    user: AuthenticatedUser,
    ClientIp(ip): ClientIp,
    State(state): State<FilesState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<UploadResultDto>>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut form_id: Option<i64> = None;
    let mut submission_id: Option<i64> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        debug!("Failed to read multipart field: {}", e);
        AppError::BadRequest(format!("Failed to read multipart data: {}", e))
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let name = field.file_name().unwrap_or("unnamed").to_string();
                let data = field.bytes().await.map_err(|e| {
                    debug!("Failed to read file bytes: {}", e);
                    AppError::BadRequest(format!("Failed to read file data: {}", e))
                })?;
                file = Some((name, data.to_vec()));
            }
            "form_id" => form_id = parse_id_field(field, "form_id").await?,
            "submission_id" => submission_id = parse_id_field(field, "submission_id").await?,
            _ => {
                debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    let (name, data) = file.ok_or_else(|| AppError::BadRequest("File is required".to_string()))?;
    if data.len() > MAX_UPLOAD_SIZE {
        return Err(AppError::BadRequest(format!(
            "File too large. Maximum size is {} MB",
            MAX_UPLOAD_SIZE / 1024 / 1024
        )));
    }

    let ctx = UploadContext {
        form_id,
        submission_id,
        user: &user,
        ip: &ip,
    };
    let result = state.uploads.upload(&name, &data, &ctx).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(Some(result), None, None)),
    ))
}

async fn parse_id_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<Option<i64>> {
    let text = field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read {} field: {}", name, e)))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<i64>()
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("{} must be an integer", name)))
}

/// List encrypted uploads with fresh download links
#[utoipa::path(
    get,
    path = "/api/files",
    params(PaginationQuery),
    responses(
        (status = 200, description = "Active uploads", body = ApiResponse<Vec<SecureFileDto>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required")
    ),
    tag = "files",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_files(
    RequireAdministrator(user): RequireAdministrator,
    State(state): State<FilesState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ApiResponse<Vec<SecureFileDto>>>> {
    let (items, total) = state.files.list_files(&user, &query).await?;
    Ok(Json(ApiResponse::success(
        Some(items),
        None,
        Some(Meta::paged(total, &query)),
    )))
}

/// Files attached to one form submission
#[utoipa::path(
    get,
    path = "/api/files/submission",
    params(SubmissionFilesQuery),
    responses(
        (status = 200, description = "Submission files", body = ApiResponse<Vec<SecureFileDto>>),
        (status = 400, description = "Missing submission_id"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Role not allowed")
    ),
    tag = "files",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_submission_files(
    user: AuthenticatedUser,
    State(state): State<FilesState>,
    Query(query): Query<SubmissionFilesQuery>,
) -> Result<Json<ApiResponse<Vec<SecureFileDto>>>> {
    let items = state
        .files
        .submission_files(&user, query.submission_id, query.form_id)
        .await?;
    let total = items.len() as i64;
    Ok(Json(ApiResponse::success(
        Some(items),
        None,
        Some(Meta::total(total)),
    )))
}
