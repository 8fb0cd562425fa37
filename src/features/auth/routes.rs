use crate::features::auth::handler;
use crate::features::settings::SettingsService;
use axum::{routing::get, Router};
use std::sync::Arc;

/// Protected auth routes (require JWT authentication)
pub fn protected_routes(settings: Arc<SettingsService>) -> Router {
    Router::new()
        .route("/api/auth/me", get(handler::get_me))
        .with_state(settings)
}
