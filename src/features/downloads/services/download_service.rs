use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::core::error::{AppError, Result};
use crate::features::activity_logs::{ActivityLogService, CreateActivityLog};
use crate::features::auth::model::AuthenticatedUser;
use crate::features::downloads::dtos::{DownloadLinkDto, DownloadQuery};
use crate::features::downloads::models::DownloadReference;
use crate::features::downloads::token::{download_url, reference_url, DownloadTokenSigner};
use crate::features::files::models::{CipherMode, FileStatus, SecureFile};
use crate::features::files::services::FileRepository;
use crate::features::settings::{Settings, SettingsService};
use crate::modules::crypto::chunked::{chunk_count, sealed_chunk_len};
use crate::modules::crypto::{
    decode_blob, decrypt_whole, ChunkCipher, CryptoError, FileKey, MetadataCipher, STOP_MARKER,
};
use crate::modules::storage::exists;
use crate::shared::constants::{
    DEFAULT_MIME_TYPE, LOG_ACTION_DOWNLOAD, LOG_ACTION_ERROR, LOG_ACTION_SECURITY,
};
use crate::shared::validation::{sanitize_filename, STORED_NAME_REGEX};

/// Decrypted chunks buffered ahead of the client
const STREAM_BUFFER_CHUNKS: usize = 4;

/// The download gate: authorization, token and expiry checks, then decrypt-and-stream.
pub struct DownloadService {
    files: Arc<FileRepository>,
    settings: Arc<SettingsService>,
    logs: Arc<ActivityLogService>,
    signer: Arc<DownloadTokenSigner>,
    references: Arc<MetadataCipher>,
    public_base_url: String,
}

impl DownloadService {
    pub fn new(
        files: Arc<FileRepository>,
        settings: Arc<SettingsService>,
        logs: Arc<ActivityLogService>,
        signer: Arc<DownloadTokenSigner>,
        references: Arc<MetadataCipher>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            files,
            settings,
            logs,
            signer,
            references,
            public_base_url: public_base_url.into(),
        }
    }

    /// Answer `GET /download`. Checks run in a fixed order so that each failure maps
    /// to exactly one status: role 403, parameter 400, token 403, record 404,
    /// expiry 410, physical file 404, decryption 500.
    pub async fn handle_download(
        &self,
        user: Option<&AuthenticatedUser>,
        query: &DownloadQuery,
        ip: &str,
    ) -> Result<Response> {
        let settings = self.settings.current().await;

        let user = match user {
            Some(u) if u.has_any_role(&settings.allowed_roles) => u,
            other => {
                tracing::warn!(
                    "Download refused: user {:?} lacks an allowed role",
                    other.map(|u| u.sub.as_str())
                );
                return Err(AppError::Forbidden(
                    "You do not have permission to download this file".to_string(),
                ));
            }
        };

        if let Some(reference) = query.reference.as_deref().filter(|r| !r.is_empty()) {
            return self.download_by_reference(user, reference, &settings, ip).await;
        }

        let filename = query
            .file
            .as_deref()
            .map(str::trim)
            .filter(|f| STORED_NAME_REGEX.is_match(f))
            .ok_or_else(|| AppError::BadRequest("Invalid or missing file parameter".to_string()))?;

        let token = query.token.as_deref().unwrap_or_default();
        if !self.signer.verify(token, filename, &user.sub) {
            tracing::warn!("Download token mismatch for {} by {}", filename, user.sub);
            self.logs
                .record(
                    CreateActivityLog::new(LOG_ACTION_SECURITY)
                        .file(filename)
                        .user(Some(user))
                        .ip(ip)
                        .details("Invalid download token"),
                )
                .await;
            return Err(AppError::Forbidden("Invalid download token".to_string()));
        }

        let file = self.active_file(filename).await?;
        ensure_link_live(None, &file, &settings, Utc::now())?;

        self.serve(file, user, ip).await
    }

    async fn download_by_reference(
        &self,
        user: &AuthenticatedUser,
        reference: &str,
        settings: &Settings,
        ip: &str,
    ) -> Result<Response> {
        let reference: DownloadReference = self.references.open(reference).map_err(|e| {
            tracing::warn!("Unreadable download reference from {}: {}", user.sub, e);
            AppError::NotFound("File not found".to_string())
        })?;

        let now = Utc::now();
        if reference.is_expired(now) {
            return Err(AppError::Gone("This download link has expired".to_string()));
        }

        let file = self.active_file(&reference.stored_as).await?;
        ensure_link_live(Some(&reference), &file, settings, now)?;
        self.serve(file, user, ip).await
    }

    async fn active_file(&self, filename: &str) -> Result<SecureFile> {
        self.files
            .find_by_filename(filename)
            .await?
            .filter(|f| f.status == FileStatus::Active)
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    async fn serve(&self, file: SecureFile, user: &AuthenticatedUser, ip: &str) -> Result<Response> {
        let path = PathBuf::from(&file.file_path);
        if !exists(&path).await {
            tracing::error!("Blob for {} missing at {}", file.filename, file.file_path);
            return Err(AppError::NotFound("File not found on server".to_string()));
        }

        let decrypted = match file.cipher_mode {
            CipherMode::Cbc => decrypt_whole_file(&file, &path)
                .await
                .map(|plain| (plain.len() as u64, Body::from(plain))),
            CipherMode::GcmChunked => stream_chunked_file(&file, &path)
                .await
                .map(|body| (file.file_size.max(0) as u64, body)),
        };

        let (content_length, body) = match decrypted {
            Ok(ok) => ok,
            Err(e) => {
                tracing::error!("Failed to decrypt {}: {}", file.filename, e);
                self.logs
                    .record(
                        CreateActivityLog::new(LOG_ACTION_ERROR)
                            .file(&file.filename)
                            .user(Some(user))
                            .ip(ip)
                            .details(format!("Decryption failed: {}", e)),
                    )
                    .await;
                return Err(e);
            }
        };

        self.logs
            .record(
                CreateActivityLog::new(LOG_ACTION_DOWNLOAD)
                    .file(&file.filename)
                    .user(Some(user))
                    .ip(ip)
                    .details(format!("Downloaded {}", file.original_name)),
            )
            .await;

        attachment_response(&file.original_name, &file.mime_type, content_length, body)
    }

    /// Issue a download link for a stored file on request of `user`.
    pub async fn issue_token(
        &self,
        user: &AuthenticatedUser,
        filename: &str,
    ) -> Result<DownloadLinkDto> {
        let settings = self.settings.current().await;
        if !user.has_any_role(&settings.allowed_roles) {
            return Err(AppError::Forbidden(
                "You do not have permission to download files".to_string(),
            ));
        }

        let filename = filename.trim();
        if !STORED_NAME_REGEX.is_match(filename) {
            return Err(AppError::BadRequest("Invalid file parameter".to_string()));
        }

        let file = self.active_file(filename).await?;
        self.issue_for(file, &user.sub).await
    }

    /// Link for a freshly stored or requested file. Starts the expiry clock on first issuance.
    pub async fn issue_for(&self, mut file: SecureFile, user_sub: &str) -> Result<DownloadLinkDto> {
        let settings = self.settings.current().await;
        if settings.link_expiry_enabled {
            let created = self.files.mark_link_created(&file.filename).await?;
            file.link_created_at = created.or(file.link_created_at);
        }
        self.link_for(&file, user_sub, &settings)
    }

    /// Link for a file whose plaintext is already gone. Never fails: when the expiry
    /// clock cannot be started or the reference cannot be sealed, the caller still
    /// gets the best link available.
    pub async fn link_after_store(&self, file: SecureFile, user_sub: &str) -> DownloadLinkDto {
        let filename = file.filename.clone();
        match self.issue_for(file.clone(), user_sub).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!("Could not issue link for {}: {}", filename, e);
                let settings = self.settings.current().await;
                self.link_for(&file, user_sub, &settings)
                    .unwrap_or_else(|e| {
                        tracing::warn!("Could not seal reference for {}: {}", filename, e);
                        self.token_link(&file, user_sub, &settings)
                    })
            }
        }
    }

    /// Fresh token and URLs for `user_sub`, without touching the record.
    pub fn link_for(
        &self,
        file: &SecureFile,
        user_sub: &str,
        settings: &Settings,
    ) -> Result<DownloadLinkDto> {
        let mut link = self.token_link(file, user_sub, settings);
        link.reference_url = Some(self.reference_url_for(file, link.link_expires_at)?);
        Ok(link)
    }

    fn token_link(&self, file: &SecureFile, user_sub: &str, settings: &Settings) -> DownloadLinkDto {
        let token = self.signer.generate(&file.filename, user_sub);
        DownloadLinkDto {
            file: file.filename.clone(),
            url: download_url(&self.public_base_url, &file.filename, &token),
            reference_url: None,
            token,
            token_valid_until: self.signer.valid_until(Utc::now()),
            link_expires_at: file.link_expires_at(settings),
        }
    }

    fn reference_url_for(
        &self,
        file: &SecureFile,
        expires: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let reference = DownloadReference {
            stored_as: file.filename.clone(),
            original: file.original_name.clone(),
            mime_type: file.mime_type.clone(),
            expires: expires.map(|e| e.timestamp()),
            form_id: file.form_id,
            submission_id: file.submission_id,
        };
        let sealed = self.references.seal(&reference)?;
        Ok(reference_url(&self.public_base_url, &sealed))
    }
}

/// Expiry check shared by both download paths. The record decides: a reference
/// sealed before expiry was switched on, or before the interval was shortened,
/// carries no or a later expiry of its own.
fn ensure_link_live(
    reference: Option<&DownloadReference>,
    file: &SecureFile,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<()> {
    if reference.is_some_and(|r| r.is_expired(now)) || file.is_link_expired(settings, now) {
        return Err(AppError::Gone("This download link has expired".to_string()));
    }
    Ok(())
}

async fn decrypt_whole_file(file: &SecureFile, path: &Path) -> Result<Vec<u8>> {
    let blob = tokio::fs::read(path).await?;
    let (iv, ciphertext) = decode_blob(&blob)?;
    let key = FileKey::from_hex(&file.encryption_key)?;
    Ok(decrypt_whole(&key, &iv, &ciphertext)?)
}

/// Decrypt the first chunk up front so key or format errors still produce a 500,
/// then stream the rest from a background task.
async fn stream_chunked_file(file: &SecureFile, path: &Path) -> Result<Body> {
    let chunk_size = file
        .chunk_size
        .and_then(|s| usize::try_from(s).ok())
        .filter(|s| *s > 0)
        .ok_or_else(|| AppError::Internal(format!("{} has no chunk size", file.filename)))?;
    let expected_chunks = chunk_count(file.file_size.max(0) as u64, chunk_size as u64);

    let key = FileKey::from_hex(&file.encryption_key)?;
    let cipher = ChunkCipher::new(&key)?;
    let sealed_len = sealed_chunk_len(chunk_size);

    let mut reader = tokio::fs::File::open(path).await?;
    let mut marker = vec![0u8; STOP_MARKER.len()];
    reader.read_exact(&mut marker).await?;
    if marker != STOP_MARKER {
        return Err(CryptoError::InvalidFormat("missing blob header".to_string()).into());
    }

    let first = read_sealed(&mut reader, sealed_len).await?;
    if first.is_empty() {
        return Err(CryptoError::InvalidFormat("blob has no chunks".to_string()).into());
    }
    let first = cipher.decrypt_chunk(0, &first)?;

    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(STREAM_BUFFER_CHUNKS);
    let filename = file.filename.clone();

    tokio::spawn(async move {
        if tx.send(Ok(Bytes::from(first))).await.is_err() {
            return;
        }

        let mut index: u64 = 1;
        loop {
            let sealed = match read_sealed(&mut reader, sealed_len).await {
                Ok(sealed) => sealed,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            if sealed.is_empty() {
                break;
            }

            match cipher.decrypt_chunk(index, &sealed) {
                Ok(plain) => {
                    if tx.send(Ok(Bytes::from(plain))).await.is_err() {
                        // client went away
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!("Chunk {} of {} failed to decrypt: {}", index, filename, e);
                    let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                    return;
                }
            }
            index += 1;
        }

        if index != expected_chunks {
            tracing::error!(
                "{} is truncated: {} of {} chunks",
                filename,
                index,
                expected_chunks
            );
            let _ = tx
                .send(Err(std::io::Error::other("encrypted file is truncated")))
                .await;
        }
    });

    Ok(Body::from_stream(ReceiverStream::new(rx)))
}

/// Read up to `len` bytes, fewer only at end of file.
async fn read_sealed(reader: &mut tokio::fs::File, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

fn attachment_response(
    original_name: &str,
    mime_type: &str,
    content_length: u64,
    body: Body,
) -> Result<Response> {
    let content_type = HeaderValue::from_str(mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME_TYPE));
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitize_filename(original_name),
        urlencoding::encode(original_name)
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(header::X_FRAME_OPTIONS, "DENY")
        .header(
            header::CACHE_CONTROL,
            "no-store, no-cache, must-revalidate, max-age=0",
        )
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build download response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::files::models::sample_file;
    use crate::modules::crypto::{encode_blob, encrypt_whole, MasterKey};
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn expiring_settings() -> Settings {
        let mut settings = Settings::defaults("/tmp/secure-test");
        settings.link_expiry_enabled = true;
        settings.link_expiry_interval = 24;
        settings
    }

    fn service(settings: Settings) -> DownloadService {
        let pool = crate::core::database::lazy_test_pool();
        DownloadService::new(
            Arc::new(FileRepository::new(pool.clone(), true)),
            SettingsService::for_tests(settings),
            Arc::new(ActivityLogService::new(pool)),
            Arc::new(DownloadTokenSigner::new(b"gate-secret", Duration::from_secs(3600)).unwrap()),
            Arc::new(MetadataCipher::new(MasterKey::from_bytes([9u8; 32]), None)),
            "https://forms.example.org",
        )
    }

    fn reference_for(file: &SecureFile, expires: Option<i64>) -> DownloadReference {
        DownloadReference {
            stored_as: file.filename.clone(),
            original: file.original_name.clone(),
            mime_type: file.mime_type.clone(),
            expires,
            form_id: file.form_id,
            submission_id: file.submission_id,
        }
    }

    #[test]
    fn test_reference_sealed_without_expiry_is_gone_once_record_expires() {
        let now = Utc::now();
        // Reference sealed while expiry was off, so it carries no expiry of its own
        let file = sample_file(Some(now - ChronoDuration::days(2)));
        let reference = reference_for(&file, None);

        let err = ensure_link_live(Some(&reference), &file, &expiring_settings(), now).unwrap_err();
        assert!(matches!(err, AppError::Gone(_)));
        assert_eq!(err.status_code(), StatusCode::GONE);

        // With expiry off the same reference still opens
        let settings = Settings::defaults("/tmp/secure-test");
        assert!(ensure_link_live(Some(&reference), &file, &settings, now).is_ok());
    }

    #[test]
    fn test_shortened_interval_overrides_reference_expiry() {
        let now = Utc::now();
        let file = sample_file(Some(now - ChronoDuration::hours(3)));
        let reference = reference_for(&file, Some((now + ChronoDuration::days(7)).timestamp()));

        let mut settings = expiring_settings();
        assert!(ensure_link_live(Some(&reference), &file, &settings, now).is_ok());

        settings.link_expiry_interval = 2;
        assert!(matches!(
            ensure_link_live(Some(&reference), &file, &settings, now),
            Err(AppError::Gone(_))
        ));
    }

    #[test]
    fn test_expired_reference_is_gone_even_for_fresh_record() {
        let now = Utc::now();
        let file = sample_file(None);
        let reference = reference_for(&file, Some(now.timestamp() - 1));
        assert!(matches!(
            ensure_link_live(Some(&reference), &file, &Settings::defaults("/tmp/s"), now),
            Err(AppError::Gone(_))
        ));
    }

    #[tokio::test]
    async fn test_link_after_store_survives_failed_expiry_clock() {
        // Expiry on: issuing needs the database, which the test pool never reaches
        let service = service(expiring_settings());
        let file = sample_file(None);

        let link = service.link_after_store(file.clone(), "7").await;
        assert_eq!(link.file, file.filename);
        assert!(link.url.contains("token="));
        assert!(link
            .reference_url
            .as_deref()
            .is_some_and(|url| url.starts_with("https://forms.example.org/download?ref=")));
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_whole_file_blob_decrypts() {
        let dir = tempfile::tempdir().unwrap();
        let plaintext = b"%PDF-1.7 contract".to_vec();
        let (key, iv, ciphertext) = encrypt_whole(&plaintext).unwrap();
        let path = dir.path().join("blob.php");
        tokio::fs::write(&path, encode_blob(&iv, &ciphertext)).await.unwrap();

        let mut file = sample_file(None);
        file.encryption_key = key.to_hex();
        assert_eq!(decrypt_whole_file(&file, &path).await.unwrap(), plaintext);
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.php");
        let mut blob = STOP_MARKER.to_vec();
        blob.extend_from_slice(b"%%% not base64 %%%");
        tokio::fs::write(&path, blob).await.unwrap();

        let file = sample_file(None);
        let err = decrypt_whole_file(&file, &path).await.unwrap_err();
        assert!(matches!(err, AppError::Crypto(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    async fn write_chunked(dir: &Path, plaintext: &[u8], chunk_size: usize) -> (FileKey, PathBuf) {
        let key = FileKey::generate();
        let cipher = ChunkCipher::new(&key).unwrap();
        let mut blob = STOP_MARKER.to_vec();
        for (i, chunk) in plaintext.chunks(chunk_size).enumerate() {
            blob.extend(cipher.encrypt_chunk(i as u64, chunk).unwrap());
        }
        let path = dir.join("chunked.php");
        tokio::fs::write(&path, blob).await.unwrap();
        (key, path)
    }

    fn chunked_record(key: &FileKey, size: usize, chunk_size: usize) -> SecureFile {
        let mut file = sample_file(None);
        file.encryption_key = key.to_hex();
        file.cipher_mode = CipherMode::GcmChunked;
        file.chunk_size = Some(chunk_size as i32);
        file.file_size = size as i64;
        file
    }

    #[tokio::test]
    async fn test_chunked_blob_streams_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let plaintext: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let (key, path) = write_chunked(dir.path(), &plaintext, 4096).await;

        let file = chunked_record(&key, plaintext.len(), 4096);
        let body = stream_chunked_file(&file, &path).await.unwrap();
        let response = attachment_response("data.bin", "application/octet-stream", 10_000, body)
            .unwrap();
        assert_eq!(body_bytes(response).await, plaintext);
    }

    #[tokio::test]
    async fn test_chunked_wrong_key_fails_before_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let (_key, path) = write_chunked(dir.path(), &[7u8; 5000], 4096).await;

        let file = chunked_record(&FileKey::generate(), 5000, 4096);
        assert!(stream_chunked_file(&file, &path).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_chunked_blob_ends_with_error() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let plaintext = vec![9u8; 3 * 4096];
        let (key, path) = write_chunked(dir.path(), &plaintext, 4096).await;

        // Record claims a fourth chunk the blob does not have
        let file = chunked_record(&key, 4 * 4096, 4096);
        let mut stream = stream_chunked_file(&file, &path)
            .await
            .unwrap()
            .into_data_stream();

        let mut received = 0;
        let mut failed = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => received += bytes.len(),
                Err(_) => {
                    failed = true;
                    break;
                }
            }
        }
        assert_eq!(received, plaintext.len());
        assert!(failed);
    }

    #[tokio::test]
    async fn test_attachment_headers() {
        let response =
            attachment_response("my \"cv\".pdf", "application/pdf", 3, Body::from("abc")).unwrap();
        let headers = response.headers();

        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(headers[header::CONTENT_LENGTH], "3");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate, max-age=0"
        );
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"my__cv_.pdf\"; filename*=UTF-8''my%20%22cv%22.pdf"
        );
    }
}
