use crate::core::error::Result;
use crate::features::auth::dto::MeResponseDto;
use crate::features::auth::model::AuthenticatedUser;
use crate::features::settings::SettingsService;
use crate::shared::types::ApiResponse;
use axum::{extract::State, Json};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user retrieved successfully", body = ApiResponse<MeResponseDto>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_me(
    user: AuthenticatedUser,
    State(settings): State<Arc<SettingsService>>,
) -> Result<Json<ApiResponse<MeResponseDto>>> {
    let current = settings.current().await;
    let dto = MeResponseDto::new(user, &current.allowed_roles);
    Ok(Json(ApiResponse::success(Some(dto), None, None)))
}
