use std::sync::Arc;

use minijinja::context;
use serde::Serialize;

use crate::core::error::Result;
use crate::features::activity_logs::dtos::LogQuery;
use crate::features::activity_logs::models::ActivityLog;
use crate::features::activity_logs::ActivityLogService;
use crate::features::auth::model::AuthenticatedUser;
use crate::features::files::dtos::SecureFileDto;
use crate::features::files::FileService;
use crate::features::settings::models::EnabledForms;
use crate::features::settings::{Settings, SettingsService};
use crate::shared::constants::{
    LOG_ACTION_CLEANUP, LOG_ACTION_DOWNLOAD, LOG_ACTION_ERROR, LOG_ACTION_SECURITY,
    LOG_ACTION_SETTINGS, LOG_ACTION_UPLOAD,
};
use crate::shared::templates::render_template;
use crate::shared::types::{PaginationQuery, TimeUnit};

const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const EXTENSION_CATEGORIES: &[(&str, &[&str], bool)] = &[
    ("Images", &["jpg", "jpeg", "png", "gif", "bmp"], false),
    (
        "Documents",
        &[
            "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "pps", "txt", "rtf", "csv", "odt",
            "ods", "odp", "odg", "odc", "odb", "odf", "mdb",
        ],
        false,
    ),
    ("Archives", &["zip", "rar", "7z", "gz", "gzip"], false),
    (
        "Audio",
        &["mp3", "wav", "ogg", "oga", "m4a", "wma", "mka", "ra", "mid", "midi"],
        false,
    ),
    (
        "Video",
        &["mp4", "m4v", "avi", "divx", "mov", "flv", "ogv", "mkv", "mpg", "mpeg", "mpe"],
        false,
    ),
    ("Executable", &["exe"], true),
];

const LOG_ACTIONS: &[&str] = &[
    LOG_ACTION_UPLOAD,
    LOG_ACTION_DOWNLOAD,
    LOG_ACTION_CLEANUP,
    LOG_ACTION_ERROR,
    LOG_ACTION_SECURITY,
    LOG_ACTION_SETTINGS,
];

#[derive(Debug, Serialize)]
struct ExtensionCategory {
    name: &'static str,
    extensions: Vec<String>,
    risky: bool,
}

#[derive(Debug, Serialize)]
struct PageInfo {
    current: i64,
    total: i64,
    total_pages: i64,
    /// Query string carried over to the previous/next links, starting with `&`
    extra_query: String,
}

impl PageInfo {
    fn new(total: i64, query: &PaginationQuery, extra_query: String) -> Self {
        let limit = query.limit();
        Self {
            current: query.page.max(1),
            total,
            total_pages: (total + limit - 1) / limit,
            extra_query,
        }
    }
}

#[derive(Debug, Serialize)]
struct FileRow {
    filename: String,
    original_name: String,
    size: String,
    mime_type: String,
    uploader: String,
    entry: String,
    uploaded_at: String,
    download_url: String,
    expires_at: Option<String>,
}

impl From<&SecureFileDto> for FileRow {
    fn from(file: &SecureFileDto) -> Self {
        let entry = match (file.form_id, file.submission_id) {
            (Some(form), Some(submission)) => format!("{} / {}", form, submission),
            (None, Some(submission)) => submission.to_string(),
            _ => "-".to_string(),
        };
        Self {
            filename: file.filename.clone(),
            original_name: file.original_name.clone(),
            size: human_size(file.file_size),
            mime_type: file.mime_type.clone(),
            uploader: file
                .upload_user_login
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            entry,
            uploaded_at: file.upload_time.format(DISPLAY_TIME_FORMAT).to_string(),
            download_url: file.link.url.clone(),
            expires_at: file
                .link
                .link_expires_at
                .map(|t| t.format(DISPLAY_TIME_FORMAT).to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct LogRow {
    time: String,
    action: String,
    file: String,
    user_login: String,
    ip: String,
    details: String,
}

impl From<&ActivityLog> for LogRow {
    fn from(log: &ActivityLog) -> Self {
        Self {
            time: log.time.format(DISPLAY_TIME_FORMAT).to_string(),
            action: log.action.clone(),
            file: log.file.clone().unwrap_or_default(),
            user_login: log.user_login.clone().unwrap_or_default(),
            ip: log.ip.clone().unwrap_or_default(),
            details: log.details.clone().unwrap_or_default(),
        }
    }
}

/// Server-rendered administration pages
pub struct AdminPageService {
    settings: Arc<SettingsService>,
    files: Arc<FileService>,
    logs: Arc<ActivityLogService>,
    default_upload_dir: String,
    public_base_url: String,
}

impl AdminPageService {
    pub fn new(
        settings: Arc<SettingsService>,
        files: Arc<FileService>,
        logs: Arc<ActivityLogService>,
        default_upload_dir: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            files,
            logs,
            default_upload_dir: default_upload_dir.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub async fn settings_page(&self) -> Result<String> {
        let settings = self.settings.current().await;
        render_settings(&settings, &self.default_upload_dir)
    }

    pub async fn files_page(
        &self,
        user: &AuthenticatedUser,
        query: &PaginationQuery,
    ) -> Result<String> {
        let (files, total) = self.files.list_files(user, query).await?;
        render_files(&files, total, query)
    }

    pub async fn logs_page(&self, query: &LogQuery) -> Result<String> {
        let pagination = query.pagination();
        let (entries, total) = self
            .logs
            .list(query.action_filter(), pagination.offset(), pagination.limit())
            .await?;
        render_logs(&entries, total, query)
    }

    pub async fn instructions_page(&self) -> Result<String> {
        let settings = self.settings.current().await;
        render_instructions(&self.public_base_url, &settings.allowed_roles)
    }
}

pub fn render_settings(settings: &Settings, default_upload_dir: &str) -> Result<String> {
    let mut categories: Vec<ExtensionCategory> = EXTENSION_CATEGORIES
        .iter()
        .map(|&(name, extensions, risky)| ExtensionCategory {
            name,
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            risky,
        })
        .collect();

    // Extensions saved by hand that no category lists
    let other: Vec<String> = settings
        .allowed_extensions
        .iter()
        .filter(|ext| {
            !EXTENSION_CATEGORIES
                .iter()
                .any(|(_, known, _)| known.contains(&ext.as_str()))
        })
        .cloned()
        .collect();
    if !other.is_empty() {
        categories.push(ExtensionCategory {
            name: "Other",
            extensions: other,
            risky: false,
        });
    }

    let enabled_forms = match &settings.enabled_forms {
        EnabledForms::All(_) => "all".to_string(),
        EnabledForms::Only(ids) => ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    };

    Ok(render_template(
        "admin/settings.html.jinja",
        context! {
            title => "Settings",
            active => "settings",
            settings => settings,
            default_upload_dir => default_upload_dir,
            extension_categories => categories,
            units => [TimeUnit::Minutes, TimeUnit::Hours, TimeUnit::Days],
            enabled_forms => enabled_forms,
        },
    )?)
}

fn render_files(files: &[SecureFileDto], total: i64, query: &PaginationQuery) -> Result<String> {
    let rows: Vec<FileRow> = files.iter().map(FileRow::from).collect();
    let page = PageInfo::new(total, query, format!("&page_size={}", query.limit()));

    Ok(render_template(
        "admin/files.html.jinja",
        context! {
            title => "Uploaded Files",
            active => "files",
            files => rows,
            page => page,
        },
    )?)
}

fn render_logs(entries: &[ActivityLog], total: i64, query: &LogQuery) -> Result<String> {
    let rows: Vec<LogRow> = entries.iter().map(LogRow::from).collect();
    let action = query.action_filter();
    let action_query = action
        .map(|a| format!("action={}", urlencoding::encode(a)))
        .unwrap_or_default();

    let pagination = query.pagination();
    let mut extra_query = format!("&page_size={}", pagination.limit());
    if !action_query.is_empty() {
        extra_query.push('&');
        extra_query.push_str(&action_query);
    }
    let export_url = if action_query.is_empty() {
        "/api/admin/logs/export".to_string()
    } else {
        format!("/api/admin/logs/export?{}", action_query)
    };

    Ok(render_template(
        "admin/logs.html.jinja",
        context! {
            title => "Activity Logs",
            active => "logs",
            logs => rows,
            actions => LOG_ACTIONS,
            action => action,
            export_url => export_url,
            page => PageInfo::new(total, &pagination, extra_query),
        },
    )?)
}

fn render_instructions(base_url: &str, allowed_roles: &[String]) -> Result<String> {
    Ok(render_template(
        "admin/instructions.html.jinja",
        context! {
            title => "Instructions",
            active => "instructions",
            base_url => base_url.trim_end_matches('/'),
            allowed_roles => allowed_roles,
        },
    )?)
}

/// Byte count in the largest binary unit that keeps the value at or above 1.
pub fn human_size(bytes: i64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes.max(0), UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::downloads::dtos::DownloadLinkDto;
    use crate::features::files::models::CipherMode;
    use chrono::{TimeZone, Utc};

    fn file_dto() -> SecureFileDto {
        SecureFileDto {
            id: 1,
            filename: "0f1e2d3c4b5a69788796a5b4c3d2e1f0_1700000000.php".to_string(),
            original_name: "<b>cv</b>.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            file_size: 1536,
            upload_user_login: Some("alice".to_string()),
            form_id: Some(3),
            submission_id: Some(99),
            cipher_mode: CipherMode::Cbc,
            upload_time: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            link: DownloadLinkDto {
                file: "0f1e2d3c4b5a69788796a5b4c3d2e1f0_1700000000.php".to_string(),
                token: "abcd".to_string(),
                url: "https://forms.example.org/download?file=x&token=abcd".to_string(),
                reference_url: None,
                token_valid_until: Utc::now(),
                link_expires_at: None,
            },
        }
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(human_size(-1), "0 B");
    }

    #[test]
    fn test_settings_page_marks_allowed_extensions() {
        let mut settings = Settings::defaults("/srv/secure");
        settings.allowed_extensions = vec!["pdf".to_string(), "heic".to_string()];
        settings.enabled_forms = EnabledForms::Only(vec![3, 7]);

        let html = render_settings(&settings, "/srv/secure").unwrap();

        assert!(html.contains(r#"value="pdf""#));
        assert!(html.contains("heic"));
        assert!(html.contains(r#"value="3, 7""#));
        assert!(html.contains("risk of malicious uploads"));
    }

    #[test]
    fn test_files_page_escapes_and_links() {
        let query = PaginationQuery::default();
        let html = render_files(&[file_dto()], 1, &query).unwrap();

        assert!(html.contains("&lt;b&gt;cv&lt;"));
        assert!(html.contains("1.5 KB"));
        // Autoescape encodes the separator slash
        assert!(html.contains("3 &#x2f; 99"));
        assert!(html.contains("2025-01-02 03:04:05"));
        assert!(html.contains("file=x&amp;token=abcd"));
    }

    #[test]
    fn test_empty_files_page() {
        let html = render_files(&[], 0, &PaginationQuery::default()).unwrap();
        assert!(html.contains("No files have been uploaded yet."));
    }

    #[test]
    fn test_logs_page_keeps_filter_in_export_link() {
        let query = LogQuery {
            action: Some("security".to_string()),
            page: Some(2),
            page_size: Some(1),
        };
        let entry = ActivityLog {
            id: 1,
            action: "security".to_string(),
            file: None,
            user_id: None,
            user_login: None,
            ip: Some("10.0.0.1".to_string()),
            time: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            details: Some("Invalid token".to_string()),
        };

        let html = render_logs(&[entry], 3, &query).unwrap();

        assert!(html.contains("export?action=security"));
        assert!(html.contains("Page 2 of 3"));
        assert!(html.contains("Invalid token"));
    }

    #[test]
    fn test_instructions_page_uses_base_url() {
        let html = render_instructions(
            "https://forms.example.org/",
            &["administrator".to_string(), "editor".to_string()],
        )
        .unwrap();
        assert!(html.contains("forms.example.org"));
        assert!(html.contains("intercept"));
        assert!(html.contains("administrator, editor"));
    }
}
