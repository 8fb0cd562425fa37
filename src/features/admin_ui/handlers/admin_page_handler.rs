use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Html,
};

use crate::core::error::Result;
use crate::features::activity_logs::dtos::LogQuery;
use crate::features::admin_ui::services::AdminPageService;
use crate::features::auth::guards::RequireAdministrator;
use crate::shared::types::PaginationQuery;

/// Settings page
#[utoipa::path(
    get,
    path = "/admin/settings",
    responses(
        (status = 200, description = "HTML page", content_type = "text/html"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required")
    ),
    tag = "admin",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn settings_page(
    RequireAdministrator(_user): RequireAdministrator,
    State(service): State<Arc<AdminPageService>>,
) -> Result<Html<String>> {
    Ok(Html(service.settings_page().await?))
}

/// Uploaded files page
#[utoipa::path(
    get,
    path = "/admin/files",
    params(PaginationQuery),
    responses(
        (status = 200, description = "HTML page", content_type = "text/html"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required")
    ),
    tag = "admin",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn files_page(
    RequireAdministrator(user): RequireAdministrator,
    State(service): State<Arc<AdminPageService>>,
    Query(query): Query<PaginationQuery>,
) -> Result<Html<String>> {
    Ok(Html(service.files_page(&user, &query).await?))
}

/// Activity log page
#[utoipa::path(
    get,
    path = "/admin/logs",
    params(LogQuery),
    responses(
        (status = 200, description = "HTML page", content_type = "text/html"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required")
    ),
    tag = "admin",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logs_page(
    RequireAdministrator(_user): RequireAdministrator,
    State(service): State<Arc<AdminPageService>>,
    Query(query): Query<LogQuery>,
) -> Result<Html<String>> {
    Ok(Html(service.logs_page(&query).await?))
}

/// Integration instructions page
#[utoipa::path(
    get,
    path = "/admin/instructions",
    responses(
        (status = 200, description = "HTML page", content_type = "text/html"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required")
    ),
    tag = "admin",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn instructions_page(
    RequireAdministrator(_user): RequireAdministrator,
    State(service): State<Arc<AdminPageService>>,
) -> Result<Html<String>> {
    Ok(Html(service.instructions_page().await?))
}
