use std::path::Path;
use std::sync::Arc;

use crate::core::error::{AppError, Result};
use crate::features::activity_logs::{ActivityLogService, CreateActivityLog};
use crate::features::auth::model::AuthenticatedUser;
use crate::features::downloads::DownloadService;
use crate::features::files::models::{CipherMode, CreateSecureFile};
use crate::features::files::services::FileRepository;
use crate::features::tasks::dtos::{QueuedTaskDto, TaskStatusDto};
use crate::features::tasks::models::{FileTaskPayload, Task, TaskKind, TaskStatus};
use crate::features::tasks::services::{progress_percent, ProgressUpdate, TaskService};
use crate::modules::crypto::chunked::{chunk_count, sealed_chunk_len};
use crate::modules::crypto::{ChunkCipher, FileKey, STOP_MARKER};
use crate::modules::resources::{ResourceGuard, ResourceProfile};
use crate::modules::storage::{move_file, read_range, remove_if_exists, truncate_to, PrivateStorage};
use crate::shared::constants::{LOG_ACTION_ERROR, LOG_ACTION_UPLOAD};

const PAUSE_SUFFIX: &str = " (Pausing to prevent server overload)";
const LOW_RESOURCE_PAUSE_SUFFIX: &str =
    " (Low resource mode: Pausing to prevent server overload)";

/// Chunked encryption driven by client polling: each call encrypts exactly one chunk.
pub struct ChunkProcessor {
    tasks: Arc<TaskService>,
    files: Arc<FileRepository>,
    logs: Arc<ActivityLogService>,
    downloads: Arc<DownloadService>,
    profile: ResourceProfile,
}

impl ChunkProcessor {
    pub fn new(
        tasks: Arc<TaskService>,
        files: Arc<FileRepository>,
        logs: Arc<ActivityLogService>,
        downloads: Arc<DownloadService>,
        profile: ResourceProfile,
    ) -> Self {
        Self {
            tasks,
            files,
            logs,
            downloads,
            profile,
        }
    }

    pub fn profile(&self) -> &ResourceProfile {
        &self.profile
    }

    /// Register a staged file for chunked encryption.
    pub async fn enqueue(&self, payload: &FileTaskPayload) -> Result<QueuedTaskDto> {
        let total = chunk_count(payload.file_size, payload.chunk_size as u64);
        let value = serde_json::to_value(payload)
            .map_err(|e| AppError::Internal(format!("Failed to serialize task payload: {}", e)))?;

        let task = self
            .tasks
            .create(
                &payload.task_id(),
                TaskKind::File,
                total as i64,
                &format!("Queued for encryption in {} chunks", total),
                value,
            )
            .await?;

        Ok(QueuedTaskDto {
            task_id: task.task_id,
            total_chunks: total,
            chunk_size: payload.chunk_size,
        })
    }

    /// Encrypt chunk `chunk` of a file task.
    ///
    /// `chunk` must equal the task's `processed_chunks`: an earlier chunk returns the
    /// current status unchanged (a retry), a later one is rejected.
    pub async fn process_chunk(
        &self,
        task_id: &str,
        chunk: u64,
        user: &AuthenticatedUser,
    ) -> Result<TaskStatusDto> {
        let task = self.tasks.find_for(task_id, user).await?;
        if task.kind != TaskKind::File {
            return Err(AppError::BadRequest(
                "This task does not process file chunks".to_string(),
            ));
        }
        let payload: FileTaskPayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| AppError::Internal(format!("Corrupt payload on {}: {}", task_id, e)))?;

        match task.status {
            TaskStatus::Running => {}
            TaskStatus::Cancelled => {
                discard_staging(&payload).await;
                return Ok(task.into());
            }
            TaskStatus::Completed | TaskStatus::Error => return Ok(task.into()),
        }

        let processed = task.processed_chunks.max(0) as u64;
        let total = task.total_chunks.max(0) as u64;
        if chunk < processed || processed >= total {
            return Ok(task.into());
        }
        if chunk > processed {
            return Err(AppError::BadRequest(format!(
                "Chunk {} requested but chunk {} is next",
                chunk, processed
            )));
        }

        let guard = ResourceGuard::start(self.profile.clone());

        if let Err(e) = encrypt_and_append(&payload, chunk).await {
            return Err(self.abort(&task, &payload, e).await);
        }

        let done = chunk + 1;
        if done == total {
            return self.finalize(task, payload, user).await;
        }

        let paused = guard.should_pause();
        let mut message = format!(
            "Processing chunk {} of {} ({:.1}%)",
            done,
            total,
            done as f64 * 100.0 / total as f64
        );
        if paused {
            message.push_str(if guard.is_low_resource() {
                LOW_RESOURCE_PAUSE_SUFFIX
            } else {
                PAUSE_SUFFIX
            });
            tracing::info!("Task {} paused after chunk {}", task_id, done);
        }

        let update = ProgressUpdate {
            expected_processed: processed as i64,
            processed: done as i64,
            progress: progress_percent(done, total),
            message,
            paused,
        };
        if !self.tasks.record_progress(task_id, &update).await? {
            tracing::debug!("Chunk {} of {} already recorded by another call", chunk, task_id);
            return self.current_status(task_id).await;
        }

        let mut status: TaskStatusDto = task.into();
        status.processed_chunks = update.processed;
        status.progress = update.progress;
        status.message = update.message;
        status.paused = update.paused;
        Ok(status)
    }

    /// Last chunk: move the blob into place, write the record, drop the plaintext.
    async fn finalize(
        &self,
        task: Task,
        payload: FileTaskPayload,
        user: &AuthenticatedUser,
    ) -> Result<TaskStatusDto> {
        // Claim the finalization so a concurrent retry of the last chunk backs off
        let claim = ProgressUpdate {
            expected_processed: task.processed_chunks,
            processed: task.total_chunks,
            progress: 99,
            message: "Finalizing encrypted file".to_string(),
            paused: false,
        };
        if !self.tasks.record_progress(&task.task_id, &claim).await? {
            return self.current_status(&task.task_id).await;
        }

        let link = match self.store(&payload, user).await {
            Ok(link) => link,
            Err(e) => return Err(self.abort(&task, &payload, e).await),
        };

        self.tasks
            .complete(&task.task_id, "File encrypted successfully", Some(link))
            .await?;

        self.logs
            .record(
                CreateActivityLog {
                    action: LOG_ACTION_UPLOAD.to_string(),
                    file: Some(payload.stored_name.clone()),
                    user_id: payload.user_id.clone(),
                    user_login: payload.user_login.clone(),
                    ip: payload.ip.clone(),
                    details: Some(format!(
                        "Encrypted {} ({} bytes, {} chunks)",
                        payload.original_name, payload.file_size, task.total_chunks
                    )),
                },
            )
            .await;

        self.current_status(&task.task_id).await
    }

    async fn store(
        &self,
        payload: &FileTaskPayload,
        user: &AuthenticatedUser,
    ) -> Result<serde_json::Value> {
        move_file(&payload.partial_path, &payload.final_path).await?;

        let record = self
            .files
            .insert(&CreateSecureFile {
                filename: payload.stored_name.clone(),
                original_name: payload.original_name.clone(),
                file_path: payload.final_path.to_string_lossy().into_owned(),
                mime_type: payload.mime_type.clone(),
                file_size: payload.file_size as i64,
                upload_user_id: payload.user_id.clone(),
                upload_user_login: payload.user_login.clone(),
                form_id: payload.form_id,
                submission_id: payload.submission_id,
                encryption_key: payload.encryption_key.clone(),
                iv: None,
                cipher_mode: CipherMode::GcmChunked,
                chunk_size: Some(payload.chunk_size as i32),
            })
            .await;

        let record = match record {
            Ok(record) => record,
            Err(e) => {
                // The blob is useless without its key
                if let Err(cleanup) = remove_if_exists(&payload.final_path).await {
                    tracing::warn!(
                        "Failed to remove orphaned blob {:?}: {}",
                        payload.final_path,
                        cleanup
                    );
                }
                return Err(e);
            }
        };

        if let Err(e) = remove_if_exists(&payload.source_path).await {
            tracing::warn!("Failed to remove staged plaintext {:?}: {}", payload.source_path, e);
        }

        let owner = payload.user_id.as_deref().unwrap_or(&user.sub);
        let link = self.downloads.link_after_store(record, owner).await;
        serde_json::to_value(link)
            .map_err(|e| AppError::Internal(format!("Failed to serialize link: {}", e)))
    }

    /// Mark the task failed, log it, and drop the partial blob. The staged plaintext
    /// stays; the sweeper leaves it alone while the task is in `error`.
    async fn abort(&self, task: &Task, payload: &FileTaskPayload, error: AppError) -> AppError {
        tracing::error!("Chunked encryption of {} failed: {}", task.task_id, error);

        if let Err(e) = self
            .tasks
            .fail(&task.task_id, &format!("Encryption failed: {}", error))
            .await
        {
            tracing::warn!("Failed to mark task {} as failed: {}", task.task_id, e);
        }
        if let Err(e) = remove_if_exists(&payload.partial_path).await {
            tracing::warn!("Failed to remove partial blob {:?}: {}", payload.partial_path, e);
        }

        self.logs
            .record(CreateActivityLog {
                action: LOG_ACTION_ERROR.to_string(),
                file: Some(payload.stored_name.clone()),
                user_id: payload.user_id.clone(),
                user_login: payload.user_login.clone(),
                ip: payload.ip.clone(),
                details: Some(format!(
                    "Chunked encryption of {} failed: {}",
                    payload.original_name, error
                )),
            })
            .await;

        error
    }

    async fn current_status(&self, task_id: &str) -> Result<TaskStatusDto> {
        Ok(self
            .tasks
            .find(task_id)
            .await?
            .map(TaskStatusDto::from)
            .unwrap_or_else(|| TaskStatusDto::unknown(task_id)))
    }
}

/// Byte length of the partial blob once `chunks` full chunks are written
fn partial_len(chunks: u64, chunk_size: usize) -> u64 {
    STOP_MARKER.len() as u64 + chunks * sealed_chunk_len(chunk_size) as u64
}

/// Encrypt one chunk of the staged plaintext and append it to the partial blob.
///
/// The partial blob is first cut back to the length it must have before this chunk,
/// so a retried or interrupted call never leaves a duplicate chunk behind.
async fn encrypt_and_append(payload: &FileTaskPayload, chunk: u64) -> Result<()> {
    let offset = chunk * payload.chunk_size as u64;
    let plaintext = read_range(&payload.source_path, offset, payload.chunk_size).await?;
    if plaintext.is_empty() && chunk > 0 {
        return Err(AppError::Internal(format!(
            "Staged file {:?} ends before chunk {}",
            payload.source_path, chunk
        )));
    }

    let key = FileKey::from_hex(&payload.encryption_key)?;
    let sealed = ChunkCipher::new(&key)?.encrypt_chunk(chunk, &plaintext)?;

    let storage = PrivateStorage::new(staging_root(&payload.partial_path));
    if chunk == 0 {
        storage.write_private(&payload.partial_path, STOP_MARKER).await?;
    } else {
        truncate_to(&payload.partial_path, partial_len(chunk, payload.chunk_size)).await?;
    }
    storage.append_private(&payload.partial_path, &sealed).await
}

fn staging_root(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new("."))
}

async fn discard_staging(payload: &FileTaskPayload) {
    for path in [&payload.source_path, &payload.partial_path] {
        match remove_if_exists(path).await {
            Ok(true) => tracing::debug!("Removed staging file {:?}", path),
            Ok(false) => {}
            Err(e) => tracing::warn!("Failed to remove staging file {:?}: {}", path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::crypto::CHUNK_OVERHEAD;

    const CHUNK: usize = 64 * 1024;

    async fn staged(dir: &Path, plaintext: &[u8]) -> FileTaskPayload {
        let storage = PrivateStorage::new(dir);
        storage.ensure().await.unwrap();
        let stored = "0123456789abcdef0123456789abcdef_1700000000.php";
        let source_path = storage.staged_source_path(stored);
        tokio::fs::write(&source_path, plaintext).await.unwrap();

        FileTaskPayload {
            stored_name: stored.to_string(),
            original_name: "video.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            file_size: plaintext.len() as u64,
            chunk_size: CHUNK,
            encryption_key: FileKey::generate().to_hex(),
            source_path,
            partial_path: storage.partial_blob_path(stored),
            final_path: storage.blob_path(stored),
            form_id: None,
            submission_id: None,
            user_id: Some("7".to_string()),
            user_login: None,
            ip: None,
        }
    }

    fn decrypt_blob(blob: &[u8], payload: &FileTaskPayload) -> Vec<u8> {
        let cipher = ChunkCipher::new(&FileKey::from_hex(&payload.encryption_key).unwrap()).unwrap();
        let body = blob.strip_prefix(STOP_MARKER).unwrap();
        body.chunks(sealed_chunk_len(payload.chunk_size))
            .enumerate()
            .flat_map(|(i, sealed)| cipher.decrypt_chunk(i as u64, sealed).unwrap())
            .collect()
    }

    #[test]
    fn test_five_mib_in_one_mib_chunks() {
        assert_eq!(chunk_count(5 * 1024 * 1024, 1024 * 1024), 5);
        assert_eq!(chunk_count(5 * 1024 * 1024 + 1, 1024 * 1024), 6);
    }

    #[tokio::test]
    async fn test_all_chunks_reassemble() {
        let dir = tempfile::tempdir().unwrap();
        let plaintext: Vec<u8> = (0..(5 * CHUNK - 100)).map(|i| (i % 253) as u8).collect();
        let payload = staged(dir.path(), &plaintext).await;

        let total = chunk_count(payload.file_size, CHUNK as u64);
        assert_eq!(total, 5);
        for chunk in 0..total {
            encrypt_and_append(&payload, chunk).await.unwrap();
        }

        let blob = tokio::fs::read(&payload.partial_path).await.unwrap();
        assert_eq!(
            blob.len(),
            STOP_MARKER.len() + plaintext.len() + 5 * CHUNK_OVERHEAD
        );
        assert_eq!(decrypt_blob(&blob, &payload), plaintext);
    }

    #[tokio::test]
    async fn test_retried_chunk_does_not_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let plaintext = vec![5u8; 3 * CHUNK];
        let payload = staged(dir.path(), &plaintext).await;

        encrypt_and_append(&payload, 0).await.unwrap();
        encrypt_and_append(&payload, 1).await.unwrap();
        // The client retries chunk 1 after a timeout
        encrypt_and_append(&payload, 1).await.unwrap();
        encrypt_and_append(&payload, 2).await.unwrap();

        let blob = tokio::fs::read(&payload.partial_path).await.unwrap();
        assert_eq!(blob.len() as u64, partial_len(3, CHUNK));
        assert_eq!(decrypt_blob(&blob, &payload), plaintext);
    }

    #[tokio::test]
    async fn test_chunk_past_end_of_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let payload = staged(dir.path(), &[1u8; 10]).await;
        encrypt_and_append(&payload, 0).await.unwrap();
        assert!(encrypt_and_append(&payload, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_discard_staging_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let payload = staged(dir.path(), &[1u8; 10]).await;
        encrypt_and_append(&payload, 0).await.unwrap();

        discard_staging(&payload).await;
        assert!(!payload.source_path.exists());
        assert!(!payload.partial_path.exists());
    }
}
