use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::features::tasks::handlers::{cancel_task, get_task_status, process_chunk};
use crate::features::tasks::services::{ChunkProcessor, TaskService};

#[derive(Clone)]
pub struct TaskState {
    pub tasks: Arc<TaskService>,
    pub processor: Arc<ChunkProcessor>,
}

/// Create routes for the task tracker (require JWT authentication)
pub fn routes(tasks: Arc<TaskService>, processor: Arc<ChunkProcessor>) -> Router {
    let state = TaskState { tasks, processor };

    Router::new()
        .route("/api/tasks/{task_id}", get(get_task_status))
        .route("/api/tasks/{task_id}/chunks", post(process_chunk))
        .route("/api/tasks/{task_id}/cancel", post(cancel_task))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProcessingConfig;
    use crate::features::activity_logs::ActivityLogService;
    use crate::features::downloads::{DownloadService, DownloadTokenSigner};
    use crate::features::files::FileRepository;
    use crate::features::settings::{Settings, SettingsService};
    use crate::modules::crypto::{MasterKey, MetadataCipher};
    use crate::modules::resources::ResourceProfile;
    use crate::shared::test_helpers::{create_user, with_user};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use std::time::Duration;

    fn task_routes() -> Router {
        let pool = crate::core::database::lazy_test_pool();
        let files = Arc::new(FileRepository::new(pool.clone(), true));
        let settings = SettingsService::for_tests(Settings::defaults("/tmp/secure-test"));
        let logs = Arc::new(ActivityLogService::new(pool.clone()));
        let downloads = Arc::new(DownloadService::new(
            files.clone(),
            settings,
            logs.clone(),
            Arc::new(DownloadTokenSigner::new(b"task-secret", Duration::from_secs(3600)).unwrap()),
            Arc::new(MetadataCipher::new(MasterKey::from_bytes([5u8; 32]), None)),
            "https://forms.example.org",
        ));
        let tasks = Arc::new(TaskService::new(pool));
        let config = ProcessingConfig::default();
        let processor = Arc::new(ChunkProcessor::new(
            tasks.clone(),
            files,
            logs,
            downloads,
            ResourceProfile::from_limit(4 * 1024 * 1024 * 1024, &config),
        ));
        routes(tasks, processor)
    }

    #[tokio::test]
    async fn test_task_routes_require_user() {
        let server = TestServer::new(task_routes()).unwrap();

        server
            .get("/api/tasks/file_abc")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/api/tasks/file_abc/cancel")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chunk_request_requires_chunk_index() {
        let user = create_user("7", &["subscriber"]);
        let server = TestServer::new(with_user(task_routes(), user)).unwrap();

        server
            .post("/api/tasks/file_abc/chunks")
            .json(&json!({ "chunk": "first" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
