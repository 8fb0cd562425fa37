use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::features::activity_logs::ActivityLogService;
use crate::features::settings::handlers::{get_settings, reset_settings, update_settings};
use crate::features::settings::services::SettingsService;

#[derive(Clone)]
pub struct SettingsState {
    pub settings: Arc<SettingsService>,
    pub logs: Arc<ActivityLogService>,
}

/// Create routes for the settings feature
pub fn routes(settings: Arc<SettingsService>, logs: Arc<ActivityLogService>) -> Router {
    let state = SettingsState { settings, logs };

    Router::new()
        .route("/api/admin/settings", get(get_settings).put(update_settings))
        .route("/api/admin/settings/reset", post(reset_settings))
        .with_state(state)
}
