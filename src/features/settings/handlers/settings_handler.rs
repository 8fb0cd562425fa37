use axum::extract::State;
use axum::Json;

use crate::core::error::Result;
use crate::core::extractor::{AppJson, ClientIp};
use crate::features::activity_logs::CreateActivityLog;
use crate::features::auth::guards::RequireAdministrator;
use crate::features::settings::dtos::{SettingsSaveResultDto, UpdateSettingsDto};
use crate::features::settings::models::Settings;
use crate::features::settings::routes::SettingsState;
use crate::shared::constants::LOG_ACTION_SETTINGS;
use crate::shared::types::ApiResponse;

/// Get current settings
#[utoipa::path(
    get,
    path = "/api/admin/settings",
    responses(
        (status = 200, description = "Current settings", body = ApiResponse<Settings>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required")
    ),
    tag = "settings",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_settings(
    RequireAdministrator(_user): RequireAdministrator,
    State(state): State<SettingsState>,
) -> Result<Json<ApiResponse<Settings>>> {
    let settings = state.settings.current().await;
    Ok(Json(ApiResponse::success(Some(settings), None, None)))
}

/// Replace all settings
#[utoipa::path(
    put,
    path = "/api/admin/settings",
    request_body = UpdateSettingsDto,
    responses(
        (status = 200, description = "Settings saved", body = ApiResponse<SettingsSaveResultDto>),
        (status = 400, description = "Invalid settings"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required")
    ),
    tag = "settings",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_settings(
    RequireAdministrator(user): RequireAdministrator,
    ClientIp(ip): ClientIp,
    State(state): State<SettingsState>,
    AppJson(payload): AppJson<UpdateSettingsDto>,
) -> Result<Json<ApiResponse<SettingsSaveResultDto>>> {
    let result = state.settings.save(payload).await?;

    state
        .logs
        .record(
            CreateActivityLog::new(LOG_ACTION_SETTINGS)
                .user(Some(&user))
                .ip(ip)
                .details(describe_save(&result)),
        )
        .await;

    Ok(Json(ApiResponse::success(
        Some(result),
        Some("Settings saved".to_string()),
        None,
    )))
}

/// Restore default settings
#[utoipa::path(
    post,
    path = "/api/admin/settings/reset",
    responses(
        (status = 200, description = "Settings reset", body = ApiResponse<SettingsSaveResultDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Administrator access required")
    ),
    tag = "settings",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn reset_settings(
    RequireAdministrator(user): RequireAdministrator,
    ClientIp(ip): ClientIp,
    State(state): State<SettingsState>,
) -> Result<Json<ApiResponse<SettingsSaveResultDto>>> {
    let result = state.settings.reset().await?;

    state
        .logs
        .record(
            CreateActivityLog::new(LOG_ACTION_SETTINGS)
                .user(Some(&user))
                .ip(ip)
                .details(format!("Settings reset to defaults. {}", describe_save(&result))),
        )
        .await;

    Ok(Json(ApiResponse::success(
        Some(result),
        Some("Settings reset to defaults".to_string()),
        None,
    )))
}

fn describe_save(result: &SettingsSaveResultDto) -> String {
    match &result.migration {
        Some(m) => format!(
            "Upload directory changed from {} to {} ({} moved, {} failed)",
            m.from, m.to, m.moved, m.failed
        ),
        None => "Settings updated".to_string(),
    }
}
