use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::core::error::Result;
use crate::features::activity_logs::dtos::LogQuery;
use crate::features::activity_logs::models::ActivityLog;
use crate::features::activity_logs::services::ActivityLogService;
use crate::features::auth::guards::RequireAdministrator;
use crate::shared::types::{ApiResponse, Meta};

/// List activity log entries (paginated, newest first)
#[utoipa::path(
    get,
    path = "/api/admin/logs",
    params(LogQuery),
    responses(
        (status = 200, description = "Activity log entries", body = ApiResponse<Vec<ActivityLog>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required")
    ),
    tag = "logs",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_logs(
    RequireAdministrator(_user): RequireAdministrator,
    State(service): State<Arc<ActivityLogService>>,
    Query(query): Query<LogQuery>,
) -> Result<Json<ApiResponse<Vec<ActivityLog>>>> {
    let pagination = query.pagination();
    let (items, total) = service
        .list(query.action_filter(), pagination.offset(), pagination.limit())
        .await?;

    Ok(Json(ApiResponse::success(
        Some(items),
        None,
        Some(Meta::paged(total, &pagination)),
    )))
}

/// Export activity log entries as CSV
#[utoipa::path(
    get,
    path = "/api/admin/logs/export",
    params(LogQuery),
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required")
    ),
    tag = "logs",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn export_logs(
    RequireAdministrator(user): RequireAdministrator,
    State(service): State<Arc<ActivityLogService>>,
    Query(query): Query<LogQuery>,
) -> Result<impl IntoResponse> {
    let csv = service.export_csv(query.action_filter()).await?;
    let filename = format!(
        "activity-logs-{}.csv",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    );
    tracing::info!("Activity log exported by {}", user.display_login());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        csv,
    ))
}
