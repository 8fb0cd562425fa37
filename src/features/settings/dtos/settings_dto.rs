use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::core::error::AppError;
use crate::features::settings::models::{EnabledForms, Settings};
use crate::shared::types::TimeUnit;
use crate::shared::validation::EXTENSION_REGEX;

/// Full settings replacement. Every field is required: a save either replaces the
/// whole blob with a valid one or is rejected.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateSettingsDto {
    #[validate(length(min = 1, max = 4096, message = "upload_dir is required"))]
    pub upload_dir: String,

    #[validate(
        length(min = 1, message = "At least one extension must be allowed"),
        custom(function = "validate_extensions")
    )]
    pub allowed_extensions: Vec<String>,

    #[validate(length(min = 1, message = "At least one role must be allowed"))]
    pub allowed_roles: Vec<String>,

    pub link_expiry_enabled: bool,

    #[validate(range(min = 1, max = 100000, message = "link_expiry_interval must be positive"))]
    pub link_expiry_interval: u32,

    pub link_expiry_unit: TimeUnit,

    pub cleanup_enabled: bool,

    #[validate(range(min = 1, max = 100000, message = "cleanup_interval must be positive"))]
    pub cleanup_interval: u32,

    pub cleanup_unit: TimeUnit,

    #[schema(value_type = Object)]
    pub enabled_forms: EnabledForms,

    /// Chunk size in bytes (64 KiB to 16 MiB)
    #[validate(range(
        min = 65536,
        max = 16777216,
        message = "chunk_size must be between 64 KiB and 16 MiB"
    ))]
    pub chunk_size: usize,
}

fn validate_extensions(extensions: &[String]) -> Result<(), ValidationError> {
    for ext in extensions {
        let normalized = normalize_extension(ext);
        if !EXTENSION_REGEX.is_match(&normalized) {
            let mut err = ValidationError::new("invalid_extension");
            err.message = Some(format!("Invalid extension: {ext}").into());
            return Err(err);
        }
        if matches!(normalized.as_str(), "php" | "phtml" | "phar" | "htaccess") {
            let mut err = ValidationError::new("forbidden_extension");
            err.message = Some(format!("Extension not permitted: {ext}").into());
            return Err(err);
        }
    }
    Ok(())
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn dedup_preserving_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

impl UpdateSettingsDto {
    /// Validate and normalize into a settings blob.
    pub fn into_settings(self) -> Result<Settings, AppError> {
        self.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let upload_dir = self.upload_dir.trim().to_string();
        if Path::new(&upload_dir)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(AppError::Validation(
                "upload_dir must not contain '..'".to_string(),
            ));
        }

        let allowed_roles =
            dedup_preserving_order(self.allowed_roles.iter().map(|r| r.trim().to_string()));
        if allowed_roles.is_empty() {
            return Err(AppError::Validation(
                "At least one role must be allowed".to_string(),
            ));
        }

        let enabled_forms = match self.enabled_forms {
            EnabledForms::Only(mut ids) => {
                ids.sort_unstable();
                ids.dedup();
                EnabledForms::Only(ids)
            }
            all => all,
        };

        Ok(Settings {
            upload_dir,
            allowed_extensions: dedup_preserving_order(
                self.allowed_extensions.iter().map(|e| normalize_extension(e)),
            ),
            allowed_roles,
            link_expiry_enabled: self.link_expiry_enabled,
            link_expiry_interval: self.link_expiry_interval,
            link_expiry_unit: self.link_expiry_unit,
            cleanup_enabled: self.cleanup_enabled,
            cleanup_interval: self.cleanup_interval,
            cleanup_unit: self.cleanup_unit,
            enabled_forms,
            chunk_size: self.chunk_size,
        })
    }
}

/// Outcome of moving blobs to a new upload directory
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DirectoryMigrationDto {
    pub from: String,
    pub to: String,
    pub moved: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettingsSaveResultDto {
    pub settings: Settings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<DirectoryMigrationDto>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dto() -> serde_json::Value {
        json!({
            "upload_dir": " /srv/secure ",
            "allowed_extensions": [".PDF", "jpg", "pdf", " png "],
            "allowed_roles": ["administrator", "editor", "editor"],
            "link_expiry_enabled": true,
            "link_expiry_interval": 48,
            "link_expiry_unit": "hours",
            "cleanup_enabled": true,
            "cleanup_interval": 30,
            "cleanup_unit": "days",
            "enabled_forms": [5, 3, 5],
            "chunk_size": 1048576
        })
    }

    fn parse(value: serde_json::Value) -> UpdateSettingsDto {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_into_settings_normalizes() {
        let settings = parse(dto()).into_settings().unwrap();
        assert_eq!(settings.upload_dir, "/srv/secure");
        assert_eq!(settings.allowed_extensions, vec!["pdf", "jpg", "png"]);
        assert_eq!(settings.allowed_roles, vec!["administrator", "editor"]);
        assert_eq!(settings.enabled_forms, EnabledForms::Only(vec![3, 5]));
    }

    #[test]
    fn test_rejects_php_extension() {
        let mut value = dto();
        value["allowed_extensions"] = json!(["pdf", "php"]);
        assert!(matches!(
            parse(value).into_settings(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_zero_interval_and_tiny_chunks() {
        let mut value = dto();
        value["cleanup_interval"] = json!(0);
        assert!(parse(value).into_settings().is_err());

        let mut value = dto();
        value["chunk_size"] = json!(1024);
        assert!(parse(value).into_settings().is_err());
    }

    #[test]
    fn test_rejects_empty_roles_and_traversal() {
        let mut value = dto();
        value["allowed_roles"] = json!([" "]);
        assert!(parse(value).into_settings().is_err());

        let mut value = dto();
        value["upload_dir"] = json!("/srv/../etc");
        assert!(parse(value).into_settings().is_err());
    }

    #[test]
    fn test_missing_field_fails_to_parse() {
        let mut value = dto();
        value.as_object_mut().unwrap().remove("chunk_size");
        assert!(serde_json::from_value::<UpdateSettingsDto>(value).is_err());
    }

    #[test]
    fn test_bad_unit_fails_to_parse() {
        let mut value = dto();
        value["cleanup_unit"] = json!("weeks");
        assert!(serde_json::from_value::<UpdateSettingsDto>(value).is_err());
    }
}
