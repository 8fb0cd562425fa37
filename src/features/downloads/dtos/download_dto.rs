use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Query string of the public download endpoint
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct DownloadQuery {
    /// Stored file name
    pub file: Option<String>,
    /// Download token issued for `file`
    pub token: Option<String>,
    /// Encrypted download reference, used instead of `file` + `token`
    #[serde(rename = "ref")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct IssueTokenDto {
    /// Stored file name
    #[validate(length(min = 1, max = 255, message = "file is required"))]
    pub file: String,
}

/// A ready-to-use download link for the requesting user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DownloadLinkDto {
    pub file: String,
    pub token: String,
    pub url: String,
    /// Token-free link carrying an encrypted reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    /// When the token stops verifying
    pub token_valid_until: DateTime<Utc>,
    /// When the link itself expires (link expiry enabled and link issued)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_expires_at: Option<DateTime<Utc>>,
}

impl DownloadLinkDto {
    /// The link to write back into the form submission. The reference link
    /// outlives the token window and is not bound to the uploader.
    pub fn form_value(&self) -> &str {
        self.reference_url.as_deref().unwrap_or(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(reference_url: Option<&str>) -> DownloadLinkDto {
        DownloadLinkDto {
            file: "a1b2.bin".to_string(),
            token: "tok".to_string(),
            url: "https://forms.example.org/download?file=a1b2.bin&token=tok".to_string(),
            reference_url: reference_url.map(str::to_string),
            token_valid_until: Utc::now(),
            link_expires_at: None,
        }
    }

    #[test]
    fn test_form_value_prefers_reference_link() {
        let dto = link(Some("https://forms.example.org/download?ref=abc"));
        assert_eq!(dto.form_value(), "https://forms.example.org/download?ref=abc");
        assert!(!dto.form_value().contains("token="));
    }

    #[test]
    fn test_form_value_falls_back_to_token_link() {
        let dto = link(None);
        assert!(dto.form_value().contains("token=tok"));
    }
}
