use std::path::Path;
use std::sync::Arc;

use crate::core::error::{AppError, Result};
use crate::features::auth::model::AuthenticatedUser;
use crate::features::downloads::DownloadService;
use crate::features::files::dtos::SecureFileDto;
use crate::features::files::models::SecureFile;
use crate::features::files::services::FileRepository;
use crate::features::settings::{Settings, SettingsService};
use crate::modules::storage::exists;
use crate::shared::types::PaginationQuery;

/// Read side of the metadata store: listings with fresh download links
pub struct FileService {
    files: Arc<FileRepository>,
    settings: Arc<SettingsService>,
    downloads: Arc<DownloadService>,
}

impl FileService {
    pub fn new(
        files: Arc<FileRepository>,
        settings: Arc<SettingsService>,
        downloads: Arc<DownloadService>,
    ) -> Self {
        Self {
            files,
            settings,
            downloads,
        }
    }

    /// One page of active uploads. Rows whose blob is gone are flipped to `missing`
    /// and left out.
    pub async fn list_files(
        &self,
        user: &AuthenticatedUser,
        query: &PaginationQuery,
    ) -> Result<(Vec<SecureFileDto>, i64)> {
        let settings = self.settings.current().await;
        let (rows, total) = self.files.list_active(query.offset(), query.limit()).await?;
        let (items, missing) = self.with_links(rows, user, &settings).await?;
        Ok((items, (total - missing as i64).max(0)))
    }

    /// Active uploads of one form submission, for users allowed to download.
    pub async fn submission_files(
        &self,
        user: &AuthenticatedUser,
        submission_id: i64,
        form_id: Option<i64>,
    ) -> Result<Vec<SecureFileDto>> {
        let settings = self.settings.current().await;
        if !user.has_any_role(&settings.allowed_roles) {
            return Err(AppError::Forbidden(
                "You do not have permission to view these files".to_string(),
            ));
        }

        let rows = self.files.by_submission(submission_id, form_id).await?;
        let (items, _) = self.with_links(rows, user, &settings).await?;
        Ok(items)
    }

    async fn with_links(
        &self,
        rows: Vec<SecureFile>,
        user: &AuthenticatedUser,
        settings: &Settings,
    ) -> Result<(Vec<SecureFileDto>, usize)> {
        let mut items = Vec::with_capacity(rows.len());
        let mut missing = Vec::new();

        for file in rows {
            if !exists(Path::new(&file.file_path)).await {
                missing.push(file.id);
                continue;
            }
            let link = self.downloads.link_for(&file, &user.sub, settings)?;
            items.push(SecureFileDto::new(file, link));
        }

        if !missing.is_empty() {
            let marked = self.files.mark_missing(&missing).await?;
            tracing::warn!("Marked {} files missing: {:?}", marked, missing);
        }
        Ok((items, missing.len()))
    }
}
