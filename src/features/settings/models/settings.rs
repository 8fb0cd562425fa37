use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::features::files::mime::DEFAULT_ALLOWED_EXTENSIONS;
use crate::shared::constants::{
    DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, ROLE_ADMINISTRATOR,
};
use crate::shared::types::TimeUnit;

/// Keyword form of `enabled_forms`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AllForms {
    All,
}

/// Which forms have their uploads intercepted: `"all"` or a list of form ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum EnabledForms {
    All(AllForms),
    Only(Vec<i64>),
}

impl EnabledForms {
    pub fn allows(&self, form_id: Option<i64>) -> bool {
        match self {
            EnabledForms::All(_) => true,
            EnabledForms::Only(ids) => form_id.is_some_and(|id| ids.contains(&id)),
        }
    }
}

impl Default for EnabledForms {
    fn default() -> Self {
        EnabledForms::All(AllForms::All)
    }
}

/// The settings blob, stored as one JSONB row and served from memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Settings {
    /// Private directory holding encrypted blobs
    pub upload_dir: String,
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
    /// Roles allowed to download
    pub allowed_roles: Vec<String>,
    pub link_expiry_enabled: bool,
    pub link_expiry_interval: u32,
    pub link_expiry_unit: TimeUnit,
    pub cleanup_enabled: bool,
    pub cleanup_interval: u32,
    pub cleanup_unit: TimeUnit,
    pub enabled_forms: EnabledForms,
    /// Files larger than this are encrypted in chunks of this size
    pub chunk_size: usize,
}

impl Settings {
    pub fn defaults(upload_dir: impl Into<String>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            allowed_roles: vec![ROLE_ADMINISTRATOR.to_string()],
            link_expiry_enabled: false,
            link_expiry_interval: 24,
            link_expiry_unit: TimeUnit::Hours,
            cleanup_enabled: true,
            cleanup_interval: 30,
            cleanup_unit: TimeUnit::Days,
            enabled_forms: EnabledForms::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn allows_extension(&self, ext: &str) -> bool {
        self.allowed_extensions.iter().any(|e| e == ext)
    }

    pub fn cleanup_max_age(&self) -> chrono::Duration {
        self.cleanup_unit.duration(self.cleanup_interval)
    }

    /// Overlay a stored JSON blob onto these defaults.
    ///
    /// Keys missing from the stored blob keep their default so older rows load after
    /// new settings are introduced. Unknown keys are ignored and an out-of-range
    /// chunk size is clamped.
    pub fn merged_with(&self, stored: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut base = serde_json::to_value(self)?;
        if let (Some(base_obj), serde_json::Value::Object(stored_obj)) =
            (base.as_object_mut(), stored)
        {
            for (key, value) in stored_obj {
                if base_obj.contains_key(&key) {
                    base_obj.insert(key, value);
                }
            }
        }
        let mut merged: Self = serde_json::from_value(base)?;
        merged.chunk_size = merged.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enabled_forms_serde() {
        let all: EnabledForms = serde_json::from_value(json!("all")).unwrap();
        assert_eq!(all, EnabledForms::All(AllForms::All));
        assert_eq!(serde_json::to_value(&all).unwrap(), json!("all"));

        let only: EnabledForms = serde_json::from_value(json!([3, 5])).unwrap();
        assert_eq!(only, EnabledForms::Only(vec![3, 5]));

        assert!(serde_json::from_value::<EnabledForms>(json!("some")).is_err());
    }

    #[test]
    fn test_enabled_forms_allows() {
        assert!(EnabledForms::default().allows(None));
        assert!(EnabledForms::default().allows(Some(9)));

        let only = EnabledForms::Only(vec![3]);
        assert!(only.allows(Some(3)));
        assert!(!only.allows(Some(4)));
        assert!(!only.allows(None));
    }

    #[test]
    fn test_defaults() {
        let s = Settings::defaults("/srv/secure");
        assert_eq!(s.allowed_roles, vec!["administrator"]);
        assert!(s.cleanup_enabled);
        assert_eq!(s.cleanup_max_age(), chrono::Duration::days(30));
        assert_eq!(s.chunk_size, 1024 * 1024);
        assert!(s.allows_extension("pdf"));
        assert!(!s.allows_extension("php"));
    }

    #[test]
    fn test_merged_with_keeps_defaults_for_missing_keys() {
        let defaults = Settings::defaults("/srv/secure");
        let merged = defaults
            .merged_with(json!({
                "link_expiry_enabled": true,
                "allowed_roles": ["editor"],
                "legacy_key": 1
            }))
            .unwrap();

        assert!(merged.link_expiry_enabled);
        assert_eq!(merged.allowed_roles, vec!["editor"]);
        assert_eq!(merged.upload_dir, "/srv/secure");
        assert_eq!(merged.chunk_size, defaults.chunk_size);
    }

    #[test]
    fn test_merged_with_clamps_chunk_size() {
        let defaults = Settings::defaults("/srv/secure");
        let tiny = defaults.merged_with(json!({ "chunk_size": 1 })).unwrap();
        assert_eq!(tiny.chunk_size, MIN_CHUNK_SIZE);

        let huge = defaults
            .merged_with(json!({ "chunk_size": 1024u64 * 1024 * 1024 }))
            .unwrap();
        assert_eq!(huge.chunk_size, MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_merged_with_rejects_bad_types() {
        let defaults = Settings::defaults("/srv/secure");
        assert!(defaults
            .merged_with(json!({ "cleanup_unit": "fortnights" }))
            .is_err());
    }
}
