use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Task kind enum matching database enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "task_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Chunked encryption of one upload
    File,
    /// On-demand cleanup sweep
    Cleanup,
}

/// Task status enum matching database enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "task_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    /// running → completed | error | cancelled; nothing leaves a terminal state.
    pub fn can_transition(&self, to: TaskStatus) -> bool {
        matches!(
            (self, to),
            (
                TaskStatus::Running,
                TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled
            )
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Error => write!(f, "error"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Database model for a client-polled task
#[derive(Debug, Clone, FromRow)]
pub struct Task {
    pub task_id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: i32,
    pub message: String,
    pub total_chunks: i64,
    pub processed_chunks: i64,
    pub paused: bool,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// User who started the task, if recorded
    pub fn owner(&self) -> Option<&str> {
        self.payload.get("user_id").and_then(|v| v.as_str())
    }
}

/// Pending work of a chunked-encryption task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTaskPayload {
    pub stored_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub file_size: u64,
    pub chunk_size: usize,
    /// Hex per-file key; copied onto the record when the task completes
    pub encryption_key: String,
    /// Plaintext in the staging area
    pub source_path: PathBuf,
    /// Blob being assembled in the staging area
    pub partial_path: PathBuf,
    /// Where the finished blob goes
    pub final_path: PathBuf,
    pub form_id: Option<i64>,
    pub submission_id: Option<i64>,
    pub user_id: Option<String>,
    pub user_login: Option<String>,
    pub ip: Option<String>,
}

/// Id of the chunked-encryption task for a stored file
pub fn file_task_id(stored_name: &str) -> String {
    format!("file_{}", stored_name)
}

impl FileTaskPayload {
    pub fn task_id(&self) -> String {
        file_task_id(&self.stored_name)
    }
}

/// Parameters of an on-demand cleanup task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupTaskPayload {
    pub user_id: Option<String>,
    /// Records uploaded before this instant are removed; fixed when the task starts
    pub cutoff: DateTime<Utc>,
}
