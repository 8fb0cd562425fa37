use axum::{routing::get, Router};
use std::sync::Arc;

use crate::features::activity_logs::handlers::{export_logs, list_logs};
use crate::features::activity_logs::services::ActivityLogService;

/// Create routes for the activity log feature
pub fn routes(service: Arc<ActivityLogService>) -> Router {
    Router::new()
        .route("/api/admin/logs", get(list_logs))
        .route("/api/admin/logs/export", get(export_logs))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::{create_user, with_user};
    use axum::http::StatusCode;
    use axum_test::TestServer;

    fn log_routes() -> Router {
        let pool = crate::core::database::lazy_test_pool();
        routes(Arc::new(ActivityLogService::new(pool)))
    }

    #[tokio::test]
    async fn test_logs_require_authentication() {
        let server = TestServer::new(log_routes()).unwrap();
        server
            .get("/api/admin/logs")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logs_are_administrator_only() {
        let editor = create_user("42", &["editor"]);
        let server = TestServer::new(with_user(log_routes(), editor)).unwrap();

        server
            .get("/api/admin/logs")
            .await
            .assert_status(StatusCode::FORBIDDEN);
        server
            .get("/api/admin/logs/export")
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
