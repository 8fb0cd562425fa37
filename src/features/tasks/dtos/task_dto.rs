use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::features::tasks::models::{Task, TaskKind, TaskStatus};

/// Status reported to polling clients. `Unknown` is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Completed,
    Error,
    Cancelled,
    Unknown,
}

impl From<TaskStatus> for TaskState {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Running => TaskState::Running,
            TaskStatus::Completed => TaskState::Completed,
            TaskStatus::Error => TaskState::Error,
            TaskStatus::Cancelled => TaskState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskStatusDto {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<TaskKind>,
    pub status: TaskState,
    pub progress: i32,
    pub message: String,
    pub total_chunks: i64,
    pub processed_chunks: i64,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl TaskStatusDto {
    pub fn unknown(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind: None,
            status: TaskState::Unknown,
            progress: 0,
            message: "Task not found".to_string(),
            total_chunks: 0,
            processed_chunks: 0,
            paused: false,
            result: None,
        }
    }
}

impl From<Task> for TaskStatusDto {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.task_id,
            kind: Some(task.kind),
            status: task.status.into(),
            progress: task.progress,
            message: task.message,
            total_chunks: task.total_chunks,
            processed_chunks: task.processed_chunks,
            paused: task.paused,
            result: task.result,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProcessChunkDto {
    /// Zero-based index of the chunk to process; must equal `processed_chunks`
    pub chunk: u64,
}

/// Returned by the interceptor when a file is queued for chunked encryption
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueuedTaskDto {
    pub task_id: String,
    pub total_chunks: u64,
    pub chunk_size: usize,
}
