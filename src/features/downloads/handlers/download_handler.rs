use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Response,
    Json,
};
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppJson, ClientIp};
use crate::features::auth::guards::MaybeUser;
use crate::features::auth::model::AuthenticatedUser;
use crate::features::downloads::dtos::{DownloadLinkDto, DownloadQuery, IssueTokenDto};
use crate::features::downloads::services::DownloadService;
use crate::shared::types::ApiResponse;

/// Download a decrypted file
///
/// Requires a signed-in user holding one of the allowed roles, plus either a valid
/// `file` + `token` pair or an encrypted `ref`.
#[utoipa::path(
    get,
    path = "/download",
    params(DownloadQuery),
    responses(
        (status = 200, description = "Decrypted file content", content_type = "application/octet-stream"),
        (status = 400, description = "Invalid or missing file parameter"),
        (status = 403, description = "Role not allowed or invalid token"),
        (status = 404, description = "File not found"),
        (status = 410, description = "Download link expired"),
        (status = 500, description = "Decryption failed")
    ),
    tag = "downloads",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn download_file(
    MaybeUser(user): MaybeUser,
    ClientIp(ip): ClientIp,
    State(service): State<Arc<DownloadService>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    service.handle_download(user.as_ref(), &query, &ip).await
}

/// Issue a download token and link for a stored file
#[utoipa::path(
    post,
    path = "/api/files/download-token",
    request_body = IssueTokenDto,
    responses(
        (status = 200, description = "Download link issued", body = ApiResponse<DownloadLinkDto>),
        (status = 400, description = "Invalid file parameter"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Role not allowed"),
        (status = 404, description = "File not found")
    ),
    tag = "downloads",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn issue_download_token(
    user: AuthenticatedUser,
    State(service): State<Arc<DownloadService>>,
    AppJson(dto): AppJson<IssueTokenDto>,
) -> Result<Json<ApiResponse<DownloadLinkDto>>> {
    dto.validate()
        .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))?;

    let link = service.issue_token(&user, &dto.file).await?;
    Ok(Json(ApiResponse::success(Some(link), None, None)))
}
