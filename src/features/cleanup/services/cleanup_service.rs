use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::core::config::ProcessingConfig;
use crate::core::error::{AppError, Result};
use crate::features::activity_logs::{ActivityLogService, CreateActivityLog};
use crate::features::auth::model::AuthenticatedUser;
use crate::features::cleanup::dtos::SweepReportDto;
use crate::features::files::services::FileRepository;
use crate::features::settings::{Settings, SettingsService};
use crate::features::tasks::dtos::TaskStatusDto;
use crate::features::tasks::models::{
    file_task_id, CleanupTaskPayload, Task, TaskKind, TaskStatus,
};
use crate::features::tasks::services::{progress_percent, ProgressUpdate, TaskService};
use crate::modules::storage::{remove_if_exists, StagedFile, StagedKind};
use crate::shared::constants::{LOG_ACTION_CLEANUP, STAGING_MAX_AGE_SECS};

/// Instant before which uploads are due for removal, or `None` when cleanup is off.
pub fn cleanup_cutoff(settings: &Settings, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    settings
        .cleanup_enabled
        .then(|| manual_cutoff(settings, now))
}

/// Cutoff for an administrator-started sweep; applies even when scheduled cleanup is off.
pub fn manual_cutoff(settings: &Settings, now: DateTime<Utc>) -> DateTime<Utc> {
    now - settings.cleanup_max_age()
}

pub fn is_due(upload_time: DateTime<Utc>, cutoff: DateTime<Utc>) -> bool {
    upload_time < cutoff
}

fn staging_max_age() -> ChronoDuration {
    ChronoDuration::seconds(STAGING_MAX_AGE_SECS as i64)
}

/// Whether a staging file may be deleted.
///
/// Running tasks keep both files. A failed task keeps its plaintext so an
/// administrator can recover it, but its partial blob goes once stale. Finished
/// tasks age from their last update; files without a task age from their mtime.
pub fn staging_disposable(
    task: Option<&Task>,
    file: &StagedFile,
    now: DateTime<Utc>,
    max_age: ChronoDuration,
) -> bool {
    let last_touched = match task.map(|t| t.status) {
        None => file.modified,
        Some(TaskStatus::Running) => return false,
        Some(TaskStatus::Error) if file.kind == StagedKind::Source => return false,
        Some(_) => task.map_or(file.modified, |t| t.updated_at),
    };
    now - last_touched > max_age
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BatchOutcome {
    fetched: usize,
    removed: u64,
    failed: u64,
}

/// Deletes expired uploads (blob first, then record) in bounded batches.
pub struct CleanupService {
    files: Arc<FileRepository>,
    tasks: Arc<TaskService>,
    settings: Arc<SettingsService>,
    logs: Arc<ActivityLogService>,
    batch_size: i64,
    reschedule_delay: Duration,
}

impl CleanupService {
    pub fn new(
        files: Arc<FileRepository>,
        tasks: Arc<TaskService>,
        settings: Arc<SettingsService>,
        logs: Arc<ActivityLogService>,
        config: &ProcessingConfig,
    ) -> Self {
        Self {
            files,
            tasks,
            settings,
            logs,
            batch_size: config.cleanup_batch_size.max(1),
            reschedule_delay: config.cleanup_reschedule_delay,
        }
    }

    /// One scheduled pass: stale staging files, then up to one batch of expired uploads.
    pub async fn sweep(&self) -> Result<SweepReportDto> {
        let settings = self.settings.current().await;

        let staging_removed = match self.purge_staging().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Failed to purge staging area: {}", e);
                0
            }
        };

        let Some(cutoff) = cleanup_cutoff(&settings, Utc::now()) else {
            tracing::debug!("Scheduled cleanup disabled");
            return Ok(SweepReportDto {
                processed: 0,
                failed: 0,
                staging_removed,
                more_pending: false,
            });
        };

        let outcome = self.sweep_batch(cutoff, None).await?;
        let report = SweepReportDto {
            processed: outcome.removed,
            failed: outcome.failed,
            staging_removed,
            more_pending: outcome.fetched as i64 == self.batch_size && outcome.removed > 0,
        };

        if report.processed > 0 || report.failed > 0 {
            tracing::info!(
                "Cleanup sweep: removed={}, failed={}, staging_removed={}, more_pending={}",
                report.processed,
                report.failed,
                report.staging_removed,
                report.more_pending
            );
        }
        Ok(report)
    }

    /// Remove staging files no task will pick up again.
    async fn purge_staging(&self) -> Result<usize> {
        let staged = self.settings.storage().await.staged_files().await?;
        let max_age = staging_max_age();
        let now = Utc::now();

        let mut removed = 0;
        for file in staged {
            let task = match self.tasks.find(&file_task_id(&file.stored_name)).await {
                Ok(task) => task,
                Err(e) => {
                    tracing::warn!("Keeping {:?}, task lookup failed: {}", file.path, e);
                    continue;
                }
            };
            if !staging_disposable(task.as_ref(), &file, now, max_age) {
                continue;
            }
            match remove_if_exists(&file.path).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to remove staging file {:?}: {}", file.path, e),
            }
        }
        Ok(removed)
    }

    /// Sweep, re-running after the reschedule delay while full batches keep coming back.
    pub async fn sweep_until_drained(&self) -> Result<u64> {
        let mut total = 0;
        loop {
            let report = self.sweep().await?;
            total += report.processed;
            if !report.more_pending {
                return Ok(total);
            }
            tracing::info!(
                "Cleanup batch full, running again in {:?}",
                self.reschedule_delay
            );
            tokio::time::sleep(self.reschedule_delay).await;
        }
    }

    /// Start an on-demand sweep as a task; progress counts files.
    pub async fn start(&self, user: &AuthenticatedUser) -> Result<TaskStatusDto> {
        let settings = self.settings.current().await;
        let now = Utc::now();
        let cutoff = manual_cutoff(&settings, now);
        let expired = self.files.count_expired(cutoff).await?;

        let payload = CleanupTaskPayload {
            user_id: Some(user.sub.clone()),
            cutoff,
        };
        let value = serde_json::to_value(&payload)
            .map_err(|e| AppError::Internal(format!("Failed to serialize task payload: {}", e)))?;

        let task_id = format!("cleanup_{}", now.timestamp_millis());
        let task = self
            .tasks
            .create(
                &task_id,
                TaskKind::Cleanup,
                expired,
                &format!("{} expired files to remove", expired),
                value,
            )
            .await?;

        tracing::info!(
            "Cleanup task {} started by {} ({} files before {})",
            task_id,
            user.display_login(),
            expired,
            cutoff
        );

        if expired == 0 {
            self.tasks
                .complete(&task_id, "No expired files found", None)
                .await?;
            return self.status(&task_id).await;
        }
        Ok(task.into())
    }

    /// Process one batch of an on-demand sweep.
    pub async fn continue_task(
        &self,
        task_id: &str,
        user: &AuthenticatedUser,
    ) -> Result<TaskStatusDto> {
        let task = self.tasks.find_for(task_id, user).await?;
        if task.kind != TaskKind::Cleanup {
            return Err(AppError::BadRequest("Not a cleanup task".to_string()));
        }
        if task.status != TaskStatus::Running {
            return Ok(task.into());
        }

        let payload: CleanupTaskPayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| AppError::Internal(format!("Corrupt payload on {}: {}", task_id, e)))?;

        let outcome = match self.sweep_batch(payload.cutoff, Some(user)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.tasks
                    .fail(task_id, &format!("Cleanup failed: {}", e))
                    .await?;
                return Err(e);
            }
        };

        let total = task.total_chunks.max(0);
        let processed = (task.processed_chunks + outcome.removed as i64).min(total);
        let drained = outcome.fetched < self.batch_size as usize || outcome.removed == 0;

        if drained || processed >= total {
            let mut message = format!("Cleanup finished: {} files removed", processed);
            if outcome.failed > 0 {
                message.push_str(&format!(", {} could not be deleted", outcome.failed));
            }
            if processed > task.processed_chunks {
                self.tasks
                    .record_progress(
                        task_id,
                        &ProgressUpdate {
                            expected_processed: task.processed_chunks,
                            processed,
                            progress: 99,
                            message: message.clone(),
                            paused: false,
                        },
                    )
                    .await?;
            }
            self.tasks.complete(task_id, &message, None).await?;
            return self.status(task_id).await;
        }

        let progress = progress_percent(processed as u64, total as u64);
        let update = ProgressUpdate {
            expected_processed: task.processed_chunks,
            processed,
            progress,
            message: format!("Removed {} of {} expired files", processed, total),
            paused: false,
        };
        self.tasks.record_progress(task_id, &update).await?;
        self.status(task_id).await
    }

    async fn status(&self, task_id: &str) -> Result<TaskStatusDto> {
        Ok(self
            .tasks
            .find(task_id)
            .await?
            .map(TaskStatusDto::from)
            .unwrap_or_else(|| TaskStatusDto::unknown(task_id)))
    }

    async fn sweep_batch(
        &self,
        cutoff: DateTime<Utc>,
        user: Option<&AuthenticatedUser>,
    ) -> Result<BatchOutcome> {
        let batch = self.files.expired_batch(cutoff, self.batch_size).await?;
        let mut outcome = BatchOutcome {
            fetched: batch.len(),
            ..Default::default()
        };

        for file in batch.into_iter().filter(|f| is_due(f.upload_time, cutoff)) {
            // Physical file first; a record without a blob is harmless, the reverse is not
            if let Err(e) = remove_if_exists(Path::new(&file.file_path)).await {
                tracing::warn!("Cleanup could not delete {}: {}", file.file_path, e);
                outcome.failed += 1;
                continue;
            }
            self.files.delete(file.id).await?;
            outcome.removed += 1;

            self.logs
                .record(
                    CreateActivityLog::new(LOG_ACTION_CLEANUP)
                        .file(&file.filename)
                        .user(user)
                        .details(format!(
                            "Removed {} uploaded {}",
                            file.original_name,
                            file.upload_time.format("%Y-%m-%d %H:%M:%S")
                        )),
                )
                .await;
        }

        Ok(outcome)
    }
}
