use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::core::error::{AppError, Result};
use crate::features::files::models::{CreateSecureFile, FileStatus, SecureFile};

/// Metadata store for encrypted uploads (`secure_files`)
pub struct FileRepository {
    pool: PgPool,
    /// Whether `form_id` / `submission_id` exist on this deployment's schema
    has_submission_columns: bool,
}

impl FileRepository {
    pub fn new(pool: PgPool, has_submission_columns: bool) -> Self {
        Self {
            pool,
            has_submission_columns,
        }
    }

    pub fn has_submission_columns(&self) -> bool {
        self.has_submission_columns
    }

    /// Insert a record. Submission linkage is written only when the columns exist.
    pub async fn insert(&self, data: &CreateSecureFile) -> Result<SecureFile> {
        let query = if self.has_submission_columns {
            r#"
            INSERT INTO secure_files (
                filename, original_name, file_path, mime_type, file_size,
                upload_user_id, upload_user_login, encryption_key, iv,
                cipher_mode, chunk_size, form_id, submission_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#
        } else {
            r#"
            INSERT INTO secure_files (
                filename, original_name, file_path, mime_type, file_size,
                upload_user_id, upload_user_login, encryption_key, iv,
                cipher_mode, chunk_size
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#
        };

        let mut q = sqlx::query_as::<_, SecureFile>(query)
            .bind(&data.filename)
            .bind(&data.original_name)
            .bind(&data.file_path)
            .bind(&data.mime_type)
            .bind(data.file_size)
            .bind(&data.upload_user_id)
            .bind(&data.upload_user_login)
            .bind(&data.encryption_key)
            .bind(&data.iv)
            .bind(data.cipher_mode)
            .bind(data.chunk_size);
        if self.has_submission_columns {
            q = q.bind(data.form_id).bind(data.submission_id);
        }

        let file = q.fetch_one(&self.pool).await.map_err(|e| {
            tracing::error!("Failed to insert file record: {:?}", e);
            AppError::Database(e)
        })?;

        tracing::info!(
            "File record saved: id={}, stored={}, mode={:?}, size={}",
            file.id,
            file.filename,
            file.cipher_mode,
            file.file_size
        );
        Ok(file)
    }

    pub async fn find_by_filename(&self, filename: &str) -> Result<Option<SecureFile>> {
        sqlx::query_as::<_, SecureFile>("SELECT * FROM secure_files WHERE filename = $1")
            .bind(filename)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to get file record: {:?}", e);
                AppError::Database(e)
            })
    }

    /// Active records, newest first
    pub async fn list_active(&self, offset: i64, limit: i64) -> Result<(Vec<SecureFile>, i64)> {
        let items = sqlx::query_as::<_, SecureFile>(
            r#"
            SELECT * FROM secure_files
            WHERE status = 'active'
            ORDER BY upload_time DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list files: {:?}", e);
            AppError::Database(e)
        })?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM secure_files WHERE status = 'active'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to count files: {:?}", e);
            AppError::Database(e)
        })?;

        Ok((items, total))
    }

    pub async fn mark_missing(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("UPDATE secure_files SET status = $1 WHERE id = ANY($2)")
            .bind(FileStatus::Missing)
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to mark files missing: {:?}", e);
                AppError::Database(e)
            })?;
        Ok(result.rows_affected())
    }

    /// Active files of one submission. Empty when the linkage columns do not exist.
    pub async fn by_submission(
        &self,
        submission_id: i64,
        form_id: Option<i64>,
    ) -> Result<Vec<SecureFile>> {
        if !self.has_submission_columns {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, SecureFile>(
            r#"
            SELECT * FROM secure_files
            WHERE submission_id = $1
              AND ($2::BIGINT IS NULL OR form_id = $2)
              AND status = 'active'
            ORDER BY upload_time ASC, id ASC
            "#,
        )
        .bind(submission_id)
        .bind(form_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get submission files: {:?}", e);
            AppError::Database(e)
        })
    }

    /// Record the first link issuance; later calls keep the original timestamp.
    pub async fn mark_link_created(&self, filename: &str) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r#"
            UPDATE secure_files
            SET link_created_at = COALESCE(link_created_at, NOW())
            WHERE filename = $1
            RETURNING link_created_at
            "#,
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await
        .map(Option::flatten)
        .map_err(|e| {
            tracing::error!("Failed to record link issuance: {:?}", e);
            AppError::Database(e)
        })
    }

    pub async fn update_path(&self, old_path: &str, new_path: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE secure_files SET file_path = $1 WHERE file_path = $2")
            .bind(new_path)
            .bind(old_path)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update file path: {:?}", e);
                AppError::Database(e)
            })?;
        Ok(result.rows_affected())
    }

    /// Oldest records uploaded before `cutoff`
    pub async fn expired_batch(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<SecureFile>> {
        sqlx::query_as::<_, SecureFile>(
            r#"
            SELECT * FROM secure_files
            WHERE upload_time < $1
            ORDER BY upload_time ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch expired files: {:?}", e);
            AppError::Database(e)
        })
    }

    pub async fn count_expired(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM secure_files WHERE upload_time < $1")
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to count expired files: {:?}", e);
                AppError::Database(e)
            })
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM secure_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete file record {}: {:?}", id, e);
                AppError::Database(e)
            })?;
        Ok(())
    }
}
