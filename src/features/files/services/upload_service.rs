use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::core::error::{AppError, Result};
use crate::features::activity_logs::{ActivityLogService, CreateActivityLog};
use crate::features::auth::model::AuthenticatedUser;
use crate::features::downloads::dtos::DownloadLinkDto;
use crate::features::downloads::DownloadService;
use crate::features::files::dtos::{
    InterceptResponseDto, InterceptUploadDto, UploadResultDto, UploadedPaths,
};
use crate::features::files::mime::{detect_mime, is_mime_type_allowed, SNIFF_LEN};
use crate::features::files::models::{CipherMode, CreateSecureFile};
use crate::features::files::services::FileRepository;
use crate::features::settings::{Settings, SettingsService};
use crate::features::tasks::dtos::QueuedTaskDto;
use crate::features::tasks::models::FileTaskPayload;
use crate::features::tasks::ChunkProcessor;
use crate::modules::crypto::{encode_blob, encrypt_whole, FileKey};
use crate::modules::storage::{
    generate_stored_name, move_file, remove_if_exists, resolve_within, PrivateStorage,
};
use crate::shared::constants::{LOG_ACTION_ERROR, LOG_ACTION_UPLOAD};
use crate::shared::validation::{extension_of, sanitize_filename};

/// Who uploaded, and for which form submission
#[derive(Debug, Clone, Copy)]
pub struct UploadContext<'a> {
    pub form_id: Option<i64>,
    pub submission_id: Option<i64>,
    pub user: &'a AuthenticatedUser,
    pub ip: &'a str,
}

/// What became of one protected upload
#[derive(Debug, Clone)]
pub enum Protected {
    /// Encrypted in one pass and ready to download
    Stored(DownloadLinkDto),
    /// Staged for chunked encryption
    Queued(QueuedTaskDto),
}

/// Replaces plaintext uploads in the incoming directory with encrypted blobs.
pub struct UploadService {
    files: Arc<FileRepository>,
    settings: Arc<SettingsService>,
    logs: Arc<ActivityLogService>,
    downloads: Arc<DownloadService>,
    processor: Arc<ChunkProcessor>,
    incoming_dir: PathBuf,
}

impl UploadService {
    pub fn new(
        files: Arc<FileRepository>,
        settings: Arc<SettingsService>,
        logs: Arc<ActivityLogService>,
        downloads: Arc<DownloadService>,
        processor: Arc<ChunkProcessor>,
        incoming_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            files,
            settings,
            logs,
            downloads,
            processor,
            incoming_dir: incoming_dir.into(),
        }
    }

    /// Protect every path of a form submission.
    ///
    /// Never fails: a path that cannot be protected is logged and handed back
    /// unchanged so the submission still goes through.
    pub async fn intercept(
        &self,
        dto: InterceptUploadDto,
        user: &AuthenticatedUser,
        ip: &str,
    ) -> InterceptResponseDto {
        let settings = self.settings.current().await;
        if !settings.enabled_forms.allows(dto.form_id) {
            tracing::debug!("Form {:?} is not protected, leaving uploads as-is", dto.form_id);
            return InterceptResponseDto {
                files: dto.files,
                queued: Vec::new(),
            };
        }

        let ctx = UploadContext {
            form_id: dto.form_id,
            submission_id: dto.submission_id,
            user,
            ip,
        };
        let mut files = BTreeMap::new();
        let mut queued = Vec::new();

        for (field, paths) in dto.files {
            let result = match paths {
                UploadedPaths::One(path) => {
                    UploadedPaths::One(self.intercept_one(&path, &settings, &ctx, &mut queued).await)
                }
                UploadedPaths::Many(paths) => {
                    let mut out = Vec::with_capacity(paths.len());
                    for path in paths {
                        out.push(self.intercept_one(&path, &settings, &ctx, &mut queued).await);
                    }
                    UploadedPaths::Many(out)
                }
            };
            files.insert(field, result);
        }

        InterceptResponseDto { files, queued }
    }

    async fn intercept_one(
        &self,
        path: &str,
        settings: &Settings,
        ctx: &UploadContext<'_>,
        queued: &mut Vec<QueuedTaskDto>,
    ) -> String {
        let result: Result<Protected> = async {
            let resolved = resolve_within(&self.incoming_dir, path).await?;
            let original_name = resolved
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| AppError::BadRequest(format!("Not a file: {}", path)))?;
            self.protect(&resolved, &original_name, settings, ctx).await
        }
        .await;

        match result {
            Ok(Protected::Stored(link)) => link.form_value().to_string(),
            Ok(Protected::Queued(task)) => {
                let task_id = task.task_id.clone();
                queued.push(task);
                task_id
            }
            Err(e) => {
                tracing::warn!("Upload {} left unprotected: {}", path, e);
                self.logs
                    .record(
                        CreateActivityLog::new(LOG_ACTION_ERROR)
                            .user(Some(ctx.user))
                            .ip(ctx.ip)
                            .details(format!("Could not protect {}: {}", path, e)),
                    )
                    .await;
                path.to_string()
            }
        }
    }

    /// Direct multipart upload: the body is written to the incoming directory and
    /// run through the same pipeline. Unlike `intercept`, failures are returned.
    pub async fn upload(
        &self,
        original_name: &str,
        body: &[u8],
        ctx: &UploadContext<'_>,
    ) -> Result<UploadResultDto> {
        let settings = self.settings.current().await;
        let incoming = self.write_incoming(original_name, body).await?;

        match self.protect(&incoming, original_name, &settings, ctx).await {
            Ok(Protected::Stored(link)) => Ok(UploadResultDto {
                link: Some(link),
                task: None,
            }),
            Ok(Protected::Queued(task)) => Ok(UploadResultDto {
                link: None,
                task: Some(task),
            }),
            Err(e) => {
                if let Err(cleanup) = remove_if_exists(&incoming).await {
                    tracing::warn!("Failed to remove rejected upload {:?}: {}", incoming, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn write_incoming(&self, original_name: &str, body: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.incoming_dir).await?;
        let path = self.incoming_dir.join(format!(
            "{}_{}",
            uuid::Uuid::new_v4().simple(),
            sanitize_filename(original_name)
        ));
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(body).await?;
        file.flush().await?;
        Ok(path)
    }

    /// Validate, then encrypt in place or queue for chunked encryption.
    ///
    /// On error the plaintext at `path` is still where it was.
    pub async fn protect(
        &self,
        path: &Path,
        original_name: &str,
        settings: &Settings,
        ctx: &UploadContext<'_>,
    ) -> Result<Protected> {
        let head = read_head(path).await?;
        let mime_type = validate_upload(settings, original_name, &head)?;
        let size = tokio::fs::metadata(path).await?.len();
        let chunk_size = self
            .processor
            .profile()
            .effective_chunk_size(settings.chunk_size);

        let storage = PrivateStorage::new(&settings.upload_dir);
        storage.ensure().await?;

        if size <= chunk_size as u64 {
            let link = self
                .store_whole(path, original_name, mime_type, &storage, ctx)
                .await?;
            Ok(Protected::Stored(link))
        } else {
            let task = self
                .queue_chunked(path, original_name, mime_type, size, chunk_size, &storage, ctx)
                .await?;
            Ok(Protected::Queued(task))
        }
    }

    async fn store_whole(
        &self,
        path: &Path,
        original_name: &str,
        mime_type: &str,
        storage: &PrivateStorage,
        ctx: &UploadContext<'_>,
    ) -> Result<DownloadLinkDto> {
        let plaintext = tokio::fs::read(path).await?;
        let (key, iv, ciphertext) = encrypt_whole(&plaintext)?;

        let stored_name = generate_stored_name();
        let blob_path = storage.blob_path(&stored_name);
        storage
            .write_private(&blob_path, &encode_blob(&iv, &ciphertext))
            .await?;

        let record = self
            .files
            .insert(&CreateSecureFile {
                filename: stored_name.clone(),
                original_name: original_name.to_string(),
                file_path: blob_path.to_string_lossy().into_owned(),
                mime_type: mime_type.to_string(),
                file_size: plaintext.len() as i64,
                upload_user_id: Some(ctx.user.sub.clone()),
                upload_user_login: ctx.user.login.clone(),
                form_id: ctx.form_id,
                submission_id: ctx.submission_id,
                encryption_key: key.to_hex(),
                iv: Some(B64.encode(iv)),
                cipher_mode: CipherMode::Cbc,
                chunk_size: None,
            })
            .await;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                if let Err(cleanup) = remove_if_exists(&blob_path).await {
                    tracing::warn!("Failed to remove orphaned blob {:?}: {}", blob_path, cleanup);
                }
                return Err(e);
            }
        };

        if let Err(e) = remove_if_exists(path).await {
            tracing::warn!("Encrypted {:?} but could not delete the plaintext: {}", path, e);
        }

        // The plaintext is gone; from here on nothing may fail the upload
        let link = self.downloads.link_after_store(record, &ctx.user.sub).await;

        tracing::info!(
            "Encrypted upload {} as {} ({} bytes)",
            original_name,
            stored_name,
            plaintext.len()
        );
        self.logs
            .record(
                CreateActivityLog::new(LOG_ACTION_UPLOAD)
                    .file(&stored_name)
                    .user(Some(ctx.user))
                    .ip(ctx.ip)
                    .details(format!("Encrypted {} ({} bytes)", original_name, plaintext.len())),
            )
            .await;

        Ok(link)
    }

    #[allow(clippy::too_many_arguments)]
    async fn queue_chunked(
        &self,
        path: &Path,
        original_name: &str,
        mime_type: &str,
        size: u64,
        chunk_size: usize,
        storage: &PrivateStorage,
        ctx: &UploadContext<'_>,
    ) -> Result<QueuedTaskDto> {
        let stored_name = generate_stored_name();
        let source_path = storage.stage(path, &stored_name).await?;

        let payload = FileTaskPayload {
            partial_path: storage.partial_blob_path(&stored_name),
            final_path: storage.blob_path(&stored_name),
            stored_name,
            original_name: original_name.to_string(),
            mime_type: mime_type.to_string(),
            file_size: size,
            chunk_size,
            encryption_key: FileKey::generate().to_hex(),
            source_path,
            form_id: ctx.form_id,
            submission_id: ctx.submission_id,
            user_id: Some(ctx.user.sub.clone()),
            user_login: ctx.user.login.clone(),
            ip: Some(ctx.ip.to_string()),
        };

        match self.processor.enqueue(&payload).await {
            Ok(task) => {
                tracing::info!(
                    "Queued {} ({} bytes) as task {} in {} chunks",
                    original_name,
                    size,
                    task.task_id,
                    task.total_chunks
                );
                Ok(task)
            }
            Err(e) => {
                // Put the plaintext back where the form builder expects it
                if let Err(restore) = move_file(&payload.source_path, path).await {
                    tracing::error!(
                        "Failed to restore staged upload {:?}: {}",
                        payload.source_path,
                        restore
                    );
                }
                Err(e)
            }
        }
    }
}

/// Extension and content checks. Returns the detected MIME type.
pub fn validate_upload(
    settings: &Settings,
    original_name: &str,
    head: &[u8],
) -> Result<&'static str> {
    let ext = extension_of(original_name)
        .ok_or_else(|| AppError::Validation(format!("{} has no file extension", original_name)))?;
    if !settings.allows_extension(&ext) {
        return Err(AppError::Validation(format!(
            "Files of type .{} are not allowed",
            ext
        )));
    }

    let mime_type = detect_mime(head, Some(&ext));
    if !is_mime_type_allowed(mime_type) {
        return Err(AppError::Validation(format!(
            "Content type {} is not allowed",
            mime_type
        )));
    }
    Ok(mime_type)
}

async fn read_head(path: &Path) -> Result<Vec<u8>> {
    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(head)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::config::ProcessingConfig;
    use crate::features::downloads::DownloadTokenSigner;
    use crate::features::tasks::TaskService;
    use crate::modules::crypto::{MasterKey, MetadataCipher};
    use crate::modules::storage::STAGING_DIR;
    use crate::modules::resources::ResourceProfile;
    use crate::shared::test_helpers::create_user;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) fn test_upload_service(incoming: &Path, settings: Settings) -> Arc<UploadService> {
        let pool = crate::core::database::lazy_test_pool();
        let files = Arc::new(FileRepository::new(pool.clone(), true));
        let settings = SettingsService::for_tests(settings);
        let logs = Arc::new(ActivityLogService::new(pool.clone()));
        let signer = Arc::new(
            DownloadTokenSigner::new(b"upload-test-secret", Duration::from_secs(86400)).unwrap(),
        );
        let downloads = Arc::new(DownloadService::new(
            files.clone(),
            settings.clone(),
            logs.clone(),
            signer,
            Arc::new(MetadataCipher::new(MasterKey::from_bytes([3u8; 32]), None)),
            "https://forms.example.org",
        ));
        let config = ProcessingConfig {
            memory_fraction: 0.8,
            batch_time_budget: Duration::from_secs(25),
            cleanup_batch_size: 50,
            cleanup_reschedule_delay: Duration::from_secs(60),
        };
        let processor = Arc::new(ChunkProcessor::new(
            Arc::new(TaskService::new(pool)),
            files.clone(),
            logs.clone(),
            downloads.clone(),
            ResourceProfile::from_limit(4 * 1024 * 1024 * 1024, &config),
        ));
        Arc::new(UploadService::new(
            files, settings, logs, downloads, processor, incoming,
        ))
    }

    fn settings_in(dir: &TempDir) -> Settings {
        Settings::defaults(dir.path().join("secure").to_string_lossy().into_owned())
    }

    #[test]
    fn test_validate_upload_accepts_allowed_pdf() {
        let settings = Settings::defaults("/tmp/secure");
        assert_eq!(
            validate_upload(&settings, "report.pdf", b"%PDF-1.7\n").unwrap(),
            "application/pdf"
        );
    }

    #[test]
    fn test_validate_upload_rejects_extension() {
        let settings = Settings::defaults("/tmp/secure");
        assert!(matches!(
            validate_upload(&settings, "shell.php", b"<?php echo 1;"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_upload(&settings, "README", b"hello"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_upload_respects_administrator_list() {
        let mut settings = Settings::defaults("/tmp/secure");
        settings.allowed_extensions = vec!["pdf".to_string()];
        assert!(validate_upload(&settings, "photo.JPG", b"\xff\xd8\xff\xe0").is_err());
        assert!(validate_upload(&settings, "Scan.PDF", b"%PDF-1.4").is_ok());
    }

    #[tokio::test]
    async fn test_read_head_is_bounded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        tokio::fs::write(&path, vec![7u8; SNIFF_LEN * 3]).await.unwrap();
        assert_eq!(read_head(&path).await.unwrap().len(), SNIFF_LEN);
    }

    #[tokio::test]
    async fn test_disabled_form_returns_paths_untouched() {
        let dir = TempDir::new().unwrap();
        let incoming = dir.path().join("incoming");
        tokio::fs::create_dir_all(&incoming).await.unwrap();
        tokio::fs::write(incoming.join("cv.pdf"), b"%PDF-1.7").await.unwrap();

        let mut settings = settings_in(&dir);
        settings.enabled_forms = crate::features::settings::models::EnabledForms::Only(vec![1]);
        let service = test_upload_service(&incoming, settings);

        let dto: InterceptUploadDto = serde_json::from_value(json!({
            "files": { "cv": "cv.pdf", "more": ["cv.pdf"] },
            "form_id": 2
        }))
        .unwrap();
        let user = create_user("7", &["subscriber"]);
        let result = service.intercept(dto, &user, "10.0.0.1").await;

        assert_eq!(result.files["cv"], UploadedPaths::One("cv.pdf".to_string()));
        assert_eq!(
            result.files["more"],
            UploadedPaths::Many(vec!["cv.pdf".to_string()])
        );
        assert!(result.queued.is_empty());
        assert!(incoming.join("cv.pdf").exists());
    }

    #[tokio::test]
    async fn test_rejected_upload_keeps_original_path_and_file() {
        let dir = TempDir::new().unwrap();
        let incoming = dir.path().join("incoming");
        tokio::fs::create_dir_all(&incoming).await.unwrap();
        tokio::fs::write(incoming.join("payload.php"), b"<?php echo 1;")
            .await
            .unwrap();
        let service = test_upload_service(&incoming, settings_in(&dir));

        let dto: InterceptUploadDto = serde_json::from_value(json!({
            "files": { "doc": "payload.php", "escape": "../outside.pdf" }
        }))
        .unwrap();
        let user = create_user("7", &["subscriber"]);
        let result = service.intercept(dto, &user, "10.0.0.1").await;

        assert_eq!(
            result.files["doc"],
            UploadedPaths::One("payload.php".to_string())
        );
        assert_eq!(
            result.files["escape"],
            UploadedPaths::One("../outside.pdf".to_string())
        );
        assert!(incoming.join("payload.php").exists());
    }

    #[tokio::test]
    async fn test_direct_upload_rejection_removes_incoming_copy() {
        let dir = TempDir::new().unwrap();
        let incoming = dir.path().join("incoming");
        let service = test_upload_service(&incoming, settings_in(&dir));
        let user = create_user("7", &["subscriber"]);
        let ctx = UploadContext {
            form_id: None,
            submission_id: None,
            user: &user,
            ip: "10.0.0.1",
        };

        let result = service.upload("run.sh", b"#!/bin/sh\n", &ctx).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        let mut entries = tokio::fs::read_dir(&incoming).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_record_insert_leaves_no_orphaned_blob() {
        let dir = TempDir::new().unwrap();
        let incoming = dir.path().join("incoming");
        tokio::fs::create_dir_all(&incoming).await.unwrap();
        tokio::fs::write(incoming.join("cv.pdf"), b"%PDF-1.7\nbody")
            .await
            .unwrap();
        let service = test_upload_service(&incoming, settings_in(&dir));

        let dto: InterceptUploadDto =
            serde_json::from_value(json!({ "files": { "cv": "cv.pdf" } })).unwrap();
        let user = create_user("7", &["subscriber"]);
        let result = service.intercept(dto, &user, "10.0.0.1").await;

        // The database is unreachable, so the record insert fails
        assert_eq!(result.files["cv"], UploadedPaths::One("cv.pdf".to_string()));
        assert!(incoming.join("cv.pdf").exists());

        let mut entries = tokio::fs::read_dir(dir.path().join("secure")).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().into_owned();
            assert!(
                name == "index.php" || name == ".htaccess" || name == STAGING_DIR,
                "unexpected file {name}"
            );
        }
    }
}
