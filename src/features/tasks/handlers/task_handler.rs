use axum::{
    extract::{Path, State},
    Json,
};

use crate::core::error::Result;
use crate::core::extractor::AppJson;
use crate::features::auth::model::AuthenticatedUser;
use crate::features::tasks::dtos::{ProcessChunkDto, TaskStatusDto};
use crate::features::tasks::routes::TaskState;
use crate::shared::types::ApiResponse;

/// Encrypt the next chunk of a queued file
#[utoipa::path(
    post,
    path = "/api/tasks/{task_id}/chunks",
    params(
        ("task_id" = String, Path, description = "Task ID")
    ),
    request_body = ProcessChunkDto,
    responses(
        (status = 200, description = "Task status after this chunk", body = ApiResponse<TaskStatusDto>),
        (status = 400, description = "Chunk out of order or not a file task"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Task belongs to another user"),
        (status = 404, description = "Task not found"),
        (status = 500, description = "Encryption failed")
    ),
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn process_chunk(
    user: AuthenticatedUser,
    State(state): State<TaskState>,
    Path(task_id): Path<String>,
    AppJson(dto): AppJson<ProcessChunkDto>,
) -> Result<Json<ApiResponse<TaskStatusDto>>> {
    let status = state
        .processor
        .process_chunk(&task_id, dto.chunk, &user)
        .await?;
    Ok(Json(ApiResponse::success(Some(status), None, None)))
}

/// Poll a task's status
#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}",
    params(
        ("task_id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task status (`unknown` for missing tasks)", body = ApiResponse<TaskStatusDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Task belongs to another user")
    ),
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_task_status(
    user: AuthenticatedUser,
    State(state): State<TaskState>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<TaskStatusDto>>> {
    let status = state.tasks.get_status(&task_id, &user).await?;
    Ok(Json(ApiResponse::success(Some(status), None, None)))
}

/// Cancel a running task
#[utoipa::path(
    post,
    path = "/api/tasks/{task_id}/cancel",
    params(
        ("task_id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task status after cancellation", body = ApiResponse<TaskStatusDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Task belongs to another user"),
        (status = 404, description = "Task not found")
    ),
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn cancel_task(
    user: AuthenticatedUser,
    State(state): State<TaskState>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<TaskStatusDto>>> {
    let status = state.tasks.cancel(&task_id, &user).await?;
    Ok(Json(ApiResponse::success(
        Some(status),
        Some("Task cancelled".to_string()),
        None,
    )))
}
