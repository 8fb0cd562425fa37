use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::features::activity_logs::{handlers as logs_handlers, models as logs_models};
use crate::features::admin_ui::handlers as admin_ui_handlers;
use crate::features::auth;
use crate::features::cleanup::{dtos as cleanup_dtos, handlers as cleanup_handlers};
use crate::features::downloads::{dtos as downloads_dtos, handlers as downloads_handlers};
use crate::features::files::{
    dtos as files_dtos, handlers as files_handlers, models as files_models,
};
use crate::features::settings::{
    dtos as settings_dtos, handlers as settings_handlers, models as settings_models,
};
use crate::features::tasks::{
    dtos as tasks_dtos, handlers as tasks_handlers, models as tasks_models,
};
use crate::shared::types::{ApiResponse, Meta, TimeUnit};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Auth
        auth::handler::get_me,
        // Files
        files_handlers::intercept_uploads,
        files_handlers::upload_file,
        files_handlers::list_files,
        files_handlers::get_submission_files,
        // Downloads
        downloads_handlers::download_file,
        downloads_handlers::issue_download_token,
        // Tasks
        tasks_handlers::process_chunk,
        tasks_handlers::get_task_status,
        tasks_handlers::cancel_task,
        // Settings (administrator)
        settings_handlers::get_settings,
        settings_handlers::update_settings,
        settings_handlers::reset_settings,
        // Cleanup (administrator)
        cleanup_handlers::start_cleanup,
        cleanup_handlers::continue_cleanup,
        // Activity log (administrator)
        logs_handlers::list_logs,
        logs_handlers::export_logs,
        // Admin pages
        admin_ui_handlers::settings_page,
        admin_ui_handlers::files_page,
        admin_ui_handlers::logs_page,
        admin_ui_handlers::instructions_page,
    ),
    components(
        schemas(
            // Shared
            Meta,
            TimeUnit,
            // Auth
            auth::dto::MeResponseDto,
            auth::model::AuthenticatedUser,
            ApiResponse<auth::dto::MeResponseDto>,
            // Files
            files_dtos::UploadedPaths,
            files_dtos::InterceptUploadDto,
            files_dtos::InterceptResponseDto,
            files_dtos::UploadFileDto,
            files_dtos::UploadResultDto,
            files_dtos::SecureFileDto,
            files_models::CipherMode,
            files_models::FileStatus,
            ApiResponse<files_dtos::InterceptResponseDto>,
            ApiResponse<files_dtos::UploadResultDto>,
            ApiResponse<Vec<files_dtos::SecureFileDto>>,
            // Downloads
            downloads_dtos::IssueTokenDto,
            downloads_dtos::DownloadLinkDto,
            ApiResponse<downloads_dtos::DownloadLinkDto>,
            // Tasks
            tasks_dtos::TaskState,
            tasks_dtos::TaskStatusDto,
            tasks_dtos::ProcessChunkDto,
            tasks_dtos::QueuedTaskDto,
            tasks_models::TaskKind,
            tasks_models::TaskStatus,
            ApiResponse<tasks_dtos::TaskStatusDto>,
            // Settings
            settings_models::Settings,
            settings_models::EnabledForms,
            settings_models::AllForms,
            settings_dtos::UpdateSettingsDto,
            settings_dtos::DirectoryMigrationDto,
            settings_dtos::SettingsSaveResultDto,
            ApiResponse<settings_models::Settings>,
            ApiResponse<settings_dtos::SettingsSaveResultDto>,
            // Cleanup
            cleanup_dtos::SweepReportDto,
            // Activity log
            logs_models::ActivityLog,
            ApiResponse<Vec<logs_models::ActivityLog>>,
        )
    ),
    tags(
        (name = "auth", description = "Current user"),
        (name = "files", description = "Upload interception, direct uploads and file listings"),
        (name = "downloads", description = "Authorized decrypting downloads"),
        (name = "tasks", description = "Chunked encryption tasks"),
        (name = "settings", description = "Plugin settings"),
        (name = "cleanup", description = "Expired upload removal"),
        (name = "logs", description = "Activity log"),
        (name = "admin", description = "Administration pages"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Secure Form Uploads API",
        version = "0.1.0",
        description = "Encrypts form uploads at rest and serves them through authorized downloads",
    )
)]
pub struct ApiDoc;

/// Adds Bearer JWT security scheme to OpenAPI spec
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_download_and_intercept_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/download"));
        assert!(doc.paths.paths.contains_key("/api/uploads/intercept"));
        assert!(doc.paths.paths.contains_key("/api/admin/cleanup/{task_id}"));
    }

    #[test]
    fn test_bearer_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components present");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn test_swagger_info_modifier_overrides_title() {
        let mut doc = ApiDoc::openapi();
        SwaggerInfoModifier {
            title: "Uploads".to_string(),
            version: "9.9.9".to_string(),
            description: "d".to_string(),
        }
        .modify(&mut doc);
        assert_eq!(doc.info.title, "Uploads");
        assert_eq!(doc.info.version, "9.9.9");
    }
}
