use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::features::auth::model::AuthenticatedUser;

/// Database model for an activity log entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ActivityLog {
    pub id: i64,
    pub action: String,
    pub file: Option<String>,
    pub user_id: Option<String>,
    pub user_login: Option<String>,
    pub ip: Option<String>,
    pub time: DateTime<Utc>,
    pub details: Option<String>,
}

/// Data for appending a log entry
#[derive(Debug, Clone, Default)]
pub struct CreateActivityLog {
    pub action: String,
    pub file: Option<String>,
    pub user_id: Option<String>,
    pub user_login: Option<String>,
    pub ip: Option<String>,
    pub details: Option<String>,
}

impl CreateActivityLog {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            ..Default::default()
        }
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn user(mut self, user: Option<&AuthenticatedUser>) -> Self {
        if let Some(user) = user {
            self.user_id = Some(user.sub.clone());
            self.user_login = Some(user.display_login().to_string());
        }
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
