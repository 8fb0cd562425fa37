use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::features::downloads::handlers::{download_file, issue_download_token};
use crate::features::downloads::services::DownloadService;

/// The download endpoint. Mounted behind optional authentication: the gate answers
/// anonymous callers itself.
pub fn public_routes(service: Arc<DownloadService>) -> Router {
    Router::new()
        .route("/download", get(download_file))
        .with_state(service)
}

/// Token issuance (requires JWT authentication)
pub fn protected_routes(service: Arc<DownloadService>) -> Router {
    Router::new()
        .route("/api/files/download-token", post(issue_download_token))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::activity_logs::ActivityLogService;
    use crate::features::downloads::token::DownloadTokenSigner;
    use crate::features::files::services::FileRepository;
    use crate::features::settings::{Settings, SettingsService};
    use crate::modules::crypto::{MasterKey, MetadataCipher};
    use crate::shared::test_helpers::{create_administrator, create_user, with_user};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use std::time::Duration;

    const FILE_A: &str = "0123456789abcdef0123456789abcdef_1700000000.php";
    const FILE_B: &str = "fedcba9876543210fedcba9876543210_1700000000.php";

    fn signer() -> Arc<DownloadTokenSigner> {
        Arc::new(DownloadTokenSigner::new(b"router-test-secret", Duration::from_secs(86400)).unwrap())
    }

    fn service(signer: Arc<DownloadTokenSigner>) -> Arc<DownloadService> {
        let pool = crate::core::database::lazy_test_pool();
        Arc::new(DownloadService::new(
            Arc::new(FileRepository::new(pool.clone(), true)),
            SettingsService::for_tests(Settings::defaults("/tmp/secure-test")),
            Arc::new(ActivityLogService::new(pool)),
            signer,
            Arc::new(MetadataCipher::new(MasterKey::from_bytes([9u8; 32]), None)),
            "https://forms.example.org",
        ))
    }

    #[tokio::test]
    async fn test_anonymous_download_forbidden() {
        let server = TestServer::new(public_routes(service(signer()))).unwrap();
        let response = server
            .get("/download")
            .add_query_param("file", FILE_A)
            .add_query_param("token", "00")
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_role_not_allowed_forbidden_even_with_valid_token() {
        let signer = signer();
        let token = signer.generate(FILE_A, "42");
        let editor = create_user("42", &["editor"]);
        let server = TestServer::new(with_user(public_routes(service(signer)), editor)).unwrap();

        let response = server
            .get("/download")
            .add_query_param("file", FILE_A)
            .add_query_param("token", token)
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_file_parameter_bad_request() {
        let server =
            TestServer::new(with_user(public_routes(service(signer())), create_administrator()))
                .unwrap();
        server.get("/download").await.assert_status(StatusCode::BAD_REQUEST);

        let response = server
            .get("/download")
            .add_query_param("file", "../../wp-config.php")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_token_for_other_file_forbidden() {
        let signer = signer();
        let admin = create_administrator();
        let token_for_a = signer.generate(FILE_A, &admin.sub);
        let server = TestServer::new(with_user(public_routes(service(signer)), admin)).unwrap();

        let response = server
            .get("/download")
            .add_query_param("file", FILE_B)
            .add_query_param("token", token_for_a)
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unreadable_reference_not_found() {
        let server =
            TestServer::new(with_user(public_routes(service(signer())), create_administrator()))
                .unwrap();
        let response = server
            .get("/download")
            .add_query_param("ref", "bm90LWEtcmVmZXJlbmNl")
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_issue_token_requires_allowed_role() {
        let editor = create_user("42", &["editor"]);
        let server =
            TestServer::new(with_user(protected_routes(service(signer())), editor)).unwrap();
        let response = server
            .post("/api/files/download-token")
            .json(&serde_json::json!({ "file": FILE_A }))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }
}
