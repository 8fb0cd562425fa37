use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of an encrypted download reference (`/download?ref=...`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReference {
    pub stored_as: String,
    pub original: String,
    pub mime_type: String,
    /// Unix timestamp after which the reference is refused
    pub expires: Option<i64>,
    pub form_id: Option<i64>,
    pub submission_id: Option<i64>,
}

impl DownloadReference {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|ts| now.timestamp() >= ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(expires: Option<i64>) -> DownloadReference {
        DownloadReference {
            stored_as: "0123456789abcdef0123456789abcdef_1700000000.php".to_string(),
            original: "cv.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            expires,
            form_id: Some(2),
            submission_id: None,
        }
    }

    #[test]
    fn test_reference_expiry() {
        let now = Utc::now();
        assert!(!reference(None).is_expired(now));
        assert!(!reference(Some(now.timestamp() + 60)).is_expired(now));
        assert!(reference(Some(now.timestamp())).is_expired(now));
    }
}
