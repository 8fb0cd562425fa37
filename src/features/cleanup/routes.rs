use axum::{routing::post, Router};
use std::sync::Arc;

use crate::features::cleanup::handlers::{continue_cleanup, start_cleanup};
use crate::features::cleanup::services::CleanupService;

/// Create routes for the cleanup feature
pub fn routes(service: Arc<CleanupService>) -> Router {
    Router::new()
        .route("/api/admin/cleanup", post(start_cleanup))
        .route("/api/admin/cleanup/{task_id}", post(continue_cleanup))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProcessingConfig;
    use crate::features::activity_logs::ActivityLogService;
    use crate::features::files::services::FileRepository;
    use crate::features::settings::{Settings, SettingsService};
    use crate::features::tasks::TaskService;
    use crate::shared::test_helpers::{create_user, with_user};
    use axum::http::StatusCode;
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_cleanup_requires_administrator() {
        let pool = crate::core::database::lazy_test_pool();
        let service = Arc::new(CleanupService::new(
            Arc::new(FileRepository::new(pool.clone(), true)),
            Arc::new(TaskService::new(pool.clone())),
            SettingsService::for_tests(Settings::defaults("/tmp/secure-test")),
            Arc::new(ActivityLogService::new(pool)),
            &ProcessingConfig::default(),
        ));
        let editor = create_user("42", &["editor"]);
        let server = TestServer::new(with_user(routes(service), editor)).unwrap();

        server
            .post("/api/admin/cleanup")
            .await
            .assert_status(StatusCode::FORBIDDEN);
        server
            .post("/api/admin/cleanup/cleanup_1")
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
