use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::core::error::Result;
use crate::features::auth::guards::RequireAdministrator;
use crate::features::cleanup::services::CleanupService;
use crate::features::tasks::dtos::TaskStatusDto;
use crate::shared::types::ApiResponse;

/// Start an on-demand cleanup of expired uploads
///
/// Creates a `cleanup_<timestamp>` task whose total is the number of expired files.
/// Drive it with `POST /api/admin/cleanup/{task_id}` until it completes.
#[utoipa::path(
    post,
    path = "/api/admin/cleanup",
    responses(
        (status = 200, description = "Cleanup task started", body = ApiResponse<TaskStatusDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required")
    ),
    tag = "cleanup",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn start_cleanup(
    RequireAdministrator(user): RequireAdministrator,
    State(service): State<Arc<CleanupService>>,
) -> Result<Json<ApiResponse<TaskStatusDto>>> {
    let status = service.start(&user).await?;
    Ok(Json(ApiResponse::success(Some(status), None, None)))
}

/// Process the next batch of a cleanup task
#[utoipa::path(
    post,
    path = "/api/admin/cleanup/{task_id}",
    params(
        ("task_id" = String, Path, description = "Cleanup task ID")
    ),
    responses(
        (status = 200, description = "Task status after this batch", body = ApiResponse<TaskStatusDto>),
        (status = 400, description = "Not a cleanup task"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required"),
        (status = 404, description = "Task not found")
    ),
    tag = "cleanup",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn continue_cleanup(
    RequireAdministrator(user): RequireAdministrator,
    State(service): State<Arc<CleanupService>>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<TaskStatusDto>>> {
    let status = service.continue_task(&task_id, &user).await?;
    Ok(Json(ApiResponse::success(Some(status), None, None)))
}
