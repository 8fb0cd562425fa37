use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use utoipa::ToSchema;

use crate::features::settings::Settings;

/// How a file's content is encrypted on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "cipher_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CipherMode {
    /// Whole-file AES-256-CBC, base64 blob
    Cbc,
    /// AES-256-GCM sealed chunks
    GcmChunked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "file_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Active,
    /// The physical blob disappeared; the row stays until cleanup
    Missing,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Active => write!(f, "active"),
            FileStatus::Missing => write!(f, "missing"),
        }
    }
}

/// Database model for an encrypted upload
#[derive(Debug, Clone, FromRow)]
pub struct SecureFile {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub file_size: i64,
    pub upload_user_id: Option<String>,
    pub upload_user_login: Option<String>,
    // Absent on deployments without the submission linkage columns
    #[sqlx(default)]
    pub form_id: Option<i64>,
    #[sqlx(default)]
    pub submission_id: Option<i64>,
    pub encryption_key: String,
    pub iv: Option<String>,
    pub cipher_mode: CipherMode,
    pub chunk_size: Option<i32>,
    pub link_created_at: Option<DateTime<Utc>>,
    pub status: FileStatus,
    pub upload_time: DateTime<Utc>,
}

impl SecureFile {
    /// When link expiry is on and a link was issued, the instant it stops working.
    pub fn link_expires_at(&self, settings: &Settings) -> Option<DateTime<Utc>> {
        if !settings.link_expiry_enabled {
            return None;
        }
        self.link_created_at
            .map(|created| created + settings.link_expiry_unit.duration(settings.link_expiry_interval))
    }

    pub fn is_link_expired(&self, settings: &Settings, now: DateTime<Utc>) -> bool {
        self.link_expires_at(settings)
            .is_some_and(|expires| now >= expires)
    }
}

/// Data for creating a new file record
#[derive(Debug, Clone)]
pub struct CreateSecureFile {
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub file_size: i64,
    pub upload_user_id: Option<String>,
    pub upload_user_login: Option<String>,
    pub form_id: Option<i64>,
    pub submission_id: Option<i64>,
    pub encryption_key: String,
    pub iv: Option<String>,
    pub cipher_mode: CipherMode,
    pub chunk_size: Option<i32>,
}

#[cfg(test)]
pub(crate) fn sample_file(link_created_at: Option<DateTime<Utc>>) -> SecureFile {
    SecureFile {
        id: 1,
        filename: "0f1e2d3c4b5a69788796a5b4c3d2e1f0_1700000000.php".to_string(),
        original_name: "report.pdf".to_string(),
        file_path: "/tmp/secure/0f1e2d3c4b5a69788796a5b4c3d2e1f0_1700000000.php".to_string(),
        mime_type: "application/pdf".to_string(),
        file_size: 1024,
        upload_user_id: Some("7".to_string()),
        upload_user_login: Some("alice".to_string()),
        form_id: Some(3),
        submission_id: Some(99),
        encryption_key: "00".repeat(32),
        iv: None,
        cipher_mode: CipherMode::Cbc,
        chunk_size: None,
        link_created_at,
        status: FileStatus::Active,
        upload_time: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::TimeUnit;
    use chrono::Duration;

    fn settings(enabled: bool) -> Settings {
        let mut s = Settings::defaults("/tmp/secure");
        s.link_expiry_enabled = enabled;
        s.link_expiry_interval = 2;
        s.link_expiry_unit = TimeUnit::Hours;
        s
    }

    #[test]
    fn test_link_not_expired_within_interval() {
        let now = Utc::now();
        let file = sample_file(Some(now - Duration::minutes(119)));
        assert!(!file.is_link_expired(&settings(true), now));
    }

    #[test]
    fn test_link_expired_after_interval() {
        let now = Utc::now();
        let file = sample_file(Some(now - Duration::hours(2)));
        assert!(file.is_link_expired(&settings(true), now));
    }

    #[test]
    fn test_expiry_disabled_never_expires() {
        let now = Utc::now();
        let file = sample_file(Some(now - Duration::days(365)));
        assert!(!file.is_link_expired(&settings(false), now));
    }

    #[test]
    fn test_link_never_issued_never_expires() {
        let file = sample_file(None);
        assert!(!file.is_link_expired(&settings(true), Utc::now()));
    }
}
