use axum::{routing::get, Router};
use std::sync::Arc;

use crate::features::admin_ui::handlers::{
    files_page, instructions_page, logs_page, settings_page,
};
use crate::features::admin_ui::services::AdminPageService;

/// Create routes for the administration pages
pub fn routes(service: Arc<AdminPageService>) -> Router {
    Router::new()
        .route("/admin/settings", get(settings_page))
        .route("/admin/files", get(files_page))
        .route("/admin/logs", get(logs_page))
        .route("/admin/instructions", get(instructions_page))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::activity_logs::ActivityLogService;
    use crate::features::downloads::{DownloadService, DownloadTokenSigner};
    use crate::features::files::{FileRepository, FileService};
    use crate::features::settings::{Settings, SettingsService};
    use crate::modules::crypto::{MasterKey, MetadataCipher};
    use crate::shared::test_helpers::{create_user, with_administrator_auth, with_user};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use std::time::Duration;

    fn router() -> Router {
        let pool = crate::core::database::lazy_test_pool();
        let files = Arc::new(FileRepository::new(pool.clone(), true));
        let settings = SettingsService::for_tests(Settings::defaults("/srv/secure"));
        let logs = Arc::new(ActivityLogService::new(pool));
        let downloads = Arc::new(DownloadService::new(
            files.clone(),
            settings.clone(),
            logs.clone(),
            Arc::new(DownloadTokenSigner::new(b"admin-ui-secret", Duration::from_secs(3600)).unwrap()),
            Arc::new(MetadataCipher::new(MasterKey::from_bytes([1u8; 32]), None)),
            "https://forms.example.org",
        ));
        let listing = Arc::new(FileService::new(files, settings.clone(), downloads));
        routes(Arc::new(AdminPageService::new(
            settings,
            listing,
            logs,
            "/srv/secure",
            "https://forms.example.org",
        )))
    }

    #[tokio::test]
    async fn test_settings_page_renders_for_administrator() {
        let server = TestServer::new(with_administrator_auth(router())).unwrap();

        let response = server.get("/admin/settings").await;

        response.assert_status_ok();
        response.assert_header("content-type", "text/html; charset=utf-8");
        assert!(response.text().contains("settings-form"));
    }

    #[tokio::test]
    async fn test_instructions_page_renders() {
        let server = TestServer::new(with_administrator_auth(router())).unwrap();
        let response = server.get("/admin/instructions").await;
        response.assert_status_ok();
        assert!(response.text().contains("Getting started"));
    }

    #[tokio::test]
    async fn test_pages_require_administrator() {
        let server = TestServer::new(with_user(router(), create_user("5", &["editor"]))).unwrap();

        for path in ["/admin/settings", "/admin/files", "/admin/logs", "/admin/instructions"] {
            server.get(path).await.assert_status(StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn test_pages_require_authentication() {
        let server = TestServer::new(router()).unwrap();
        server
            .get("/admin/settings")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
