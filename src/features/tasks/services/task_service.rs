use sqlx::PgPool;

use crate::core::error::{AppError, Result};
use crate::features::auth::model::AuthenticatedUser;
use crate::features::tasks::dtos::TaskStatusDto;
use crate::features::tasks::models::{Task, TaskKind, TaskStatus};

/// Persisted task status. All counter updates are conditional on the previous value,
/// so concurrent calls for the same task cannot move it backwards.
pub struct TaskService {
    pool: PgPool,
}

/// A conditional progress write
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// `processed_chunks` the caller observed
    pub expected_processed: i64,
    pub processed: i64,
    pub progress: i32,
    pub message: String,
    pub paused: bool,
}

impl TaskService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        task_id: &str,
        kind: TaskKind,
        total_chunks: i64,
        message: &str,
        payload: serde_json::Value,
    ) -> Result<Task> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (task_id, kind, status, progress, message, total_chunks, payload)
            VALUES ($1, $2, 'running', 0, $3, $4, $5)
            ON CONFLICT (task_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(kind)
        .bind(message)
        .bind(total_chunks)
        .bind(payload)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create task {}: {:?}", task_id, e);
            AppError::Database(e)
        })?
        .ok_or_else(|| AppError::Conflict(format!("Task {} already exists", task_id)))?;

        tracing::info!(
            "Task created: id={}, kind={:?}, total_chunks={}",
            task.task_id,
            task.kind,
            task.total_chunks
        );
        Ok(task)
    }

    pub async fn find(&self, task_id: &str) -> Result<Option<Task>> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to get task {}: {:?}", task_id, e);
                AppError::Database(e)
            })
    }

    /// Task visible to `user`, or `NotFound`/`Forbidden`.
    pub async fn find_for(&self, task_id: &str, user: &AuthenticatedUser) -> Result<Task> {
        let task = self
            .find(task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task_id)))?;
        ensure_can_access(&task, user)?;
        Ok(task)
    }

    /// Current status; `unknown` for ids that do not exist.
    pub async fn get_status(&self, task_id: &str, user: &AuthenticatedUser) -> Result<TaskStatusDto> {
        match self.find(task_id).await? {
            Some(task) => {
                ensure_can_access(&task, user)?;
                Ok(task.into())
            }
            None => Ok(TaskStatusDto::unknown(task_id)),
        }
    }

    /// Advance the counter if nobody else did first. Returns whether this call won.
    pub async fn record_progress(&self, task_id: &str, update: &ProgressUpdate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET processed_chunks = $3,
                progress = $4,
                message = $5,
                paused = $6,
                updated_at = NOW()
            WHERE task_id = $1
              AND status = 'running'
              AND processed_chunks = $2
              AND $3 > processed_chunks
            "#,
        )
        .bind(task_id)
        .bind(update.expected_processed)
        .bind(update.processed)
        .bind(update.progress.clamp(0, 100))
        .bind(&update.message)
        .bind(update.paused)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update task {}: {:?}", task_id, e);
            AppError::Database(e)
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Move a running task to a terminal state. Returns false when the task was not
    /// running (already terminal, or missing).
    pub async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: &str,
        result: Option<serde_json::Value>,
    ) -> Result<bool> {
        if !TaskStatus::Running.can_transition(status) {
            return Err(AppError::BadRequest(format!(
                "Tasks cannot be moved to {}",
                status
            )));
        }

        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                message = $3,
                result = COALESCE($4, result),
                progress = CASE WHEN $2 = 'completed'::task_status THEN 100 ELSE progress END,
                processed_chunks = CASE
                    WHEN $2 = 'completed'::task_status THEN GREATEST(processed_chunks, total_chunks)
                    ELSE processed_chunks
                END,
                paused = FALSE,
                updated_at = NOW()
            WHERE task_id = $1 AND status = 'running'
            "#,
        )
        .bind(task_id)
        .bind(status)
        .bind(message)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to set task {} to {}: {:?}", task_id, status, e);
            AppError::Database(e)
        })?;

        let changed = updated.rows_affected() == 1;
        if changed {
            tracing::info!("Task {} -> {}: {}", task_id, status, message);
        }
        Ok(changed)
    }

    pub async fn complete(
        &self,
        task_id: &str,
        message: &str,
        result: Option<serde_json::Value>,
    ) -> Result<bool> {
        self.update_status(task_id, TaskStatus::Completed, message, result)
            .await
    }

    pub async fn fail(&self, task_id: &str, message: &str) -> Result<bool> {
        self.update_status(task_id, TaskStatus::Error, message, None)
            .await
    }

    /// Cancel a running task. Terminal tasks are returned unchanged.
    pub async fn cancel(&self, task_id: &str, user: &AuthenticatedUser) -> Result<TaskStatusDto> {
        let task = self.find_for(task_id, user).await?;
        if task.status.is_terminal() {
            return Ok(task.into());
        }

        self.update_status(task_id, TaskStatus::Cancelled, "Cancelled by user", None)
            .await?;

        let task = self
            .find(task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task_id)))?;
        Ok(task.into())
    }
}

/// Administrators see every task; others only the tasks they started.
pub fn ensure_can_access(task: &Task, user: &AuthenticatedUser) -> Result<()> {
    if user.is_administrator() {
        return Ok(());
    }
    if task.kind == TaskKind::File && task.owner() == Some(user.sub.as_str()) {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "You do not have access to this task".to_string(),
    ))
}

/// Whole-percent progress for `processed` of `total`, held below 100 until completion.
pub fn progress_percent(processed: u64, total: u64) -> i32 {
    if total == 0 {
        return 0;
    }
    let pct = (processed.min(total) * 100 / total) as i32;
    if processed < total {
        pct.min(99)
    } else {
        100
    }
}
