use std::path::Path;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::core::error::{AppError, Result};
use crate::features::files::services::FileRepository;
use crate::features::settings::dtos::{
    DirectoryMigrationDto, SettingsSaveResultDto, UpdateSettingsDto,
};
use crate::features::settings::models::Settings;
use crate::modules::storage::{relocate_blobs, PrivateStorage};

/// Settings loaded once at startup and served from memory.
///
/// Writes go to the database first and replace the cached copy only on success.
pub struct SettingsService {
    pool: PgPool,
    defaults: Settings,
    cache: RwLock<Settings>,
    files: Arc<FileRepository>,
}

impl SettingsService {
    /// Load the stored blob, falling back to (and persisting) defaults.
    pub async fn load(pool: PgPool, defaults: Settings, files: Arc<FileRepository>) -> Result<Self> {
        let stored = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT value FROM app_settings WHERE id = 1",
        )
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load settings: {:?}", e);
            AppError::Database(e)
        })?;

        let settings = match stored {
            Some(value) => defaults.merged_with(value).unwrap_or_else(|e| {
                tracing::warn!("Stored settings are invalid ({}), using defaults", e);
                defaults.clone()
            }),
            None => defaults.clone(),
        };

        let service = Self::with_settings(pool, defaults, settings.clone(), files);
        service.persist(&settings).await?;

        PrivateStorage::new(&settings.upload_dir).ensure().await?;
        tracing::info!("Settings loaded (upload_dir={})", settings.upload_dir);
        Ok(service)
    }

    pub fn with_settings(
        pool: PgPool,
        defaults: Settings,
        settings: Settings,
        files: Arc<FileRepository>,
    ) -> Self {
        Self {
            pool,
            defaults,
            cache: RwLock::new(settings),
            files,
        }
    }

    pub async fn current(&self) -> Settings {
        self.cache.read().await.clone()
    }

    pub async fn storage(&self) -> PrivateStorage {
        PrivateStorage::new(&self.cache.read().await.upload_dir)
    }

    /// Replace the whole blob. Moves existing blobs when the upload directory changes.
    pub async fn save(&self, dto: UpdateSettingsDto) -> Result<SettingsSaveResultDto> {
        let next = dto.into_settings()?;
        self.apply(next).await
    }

    pub async fn reset(&self) -> Result<SettingsSaveResultDto> {
        self.apply(self.defaults.clone()).await
    }

    async fn apply(&self, next: Settings) -> Result<SettingsSaveResultDto> {
        let mut cache = self.cache.write().await;

        // The new directory must be usable before anything is committed
        PrivateStorage::new(&next.upload_dir).ensure().await?;
        self.persist(&next).await?;

        let previous_dir = std::mem::replace(&mut *cache, next.clone()).upload_dir;
        let migration = if previous_dir != next.upload_dir {
            Some(self.migrate_directory(&previous_dir, &next.upload_dir).await?)
        } else {
            None
        };

        tracing::info!("Settings saved");
        Ok(SettingsSaveResultDto {
            settings: next,
            migration,
        })
    }

    async fn migrate_directory(&self, from: &str, to: &str) -> Result<DirectoryMigrationDto> {
        let target = PrivateStorage::new(to);
        let report = relocate_blobs(Path::new(from), &target).await?;

        for (old_path, new_path) in &report.moved {
            self.files
                .update_path(&old_path.to_string_lossy(), &new_path.to_string_lossy())
                .await?;
        }

        tracing::info!(
            "Upload directory changed {} -> {}: moved={}, failed={}",
            from,
            to,
            report.moved.len(),
            report.failed.len()
        );

        Ok(DirectoryMigrationDto {
            from: from.to_string(),
            to: to.to_string(),
            moved: report.moved.len(),
            failed: report.failed.len(),
        })
    }

    async fn persist(&self, settings: &Settings) -> Result<()> {
        let value = serde_json::to_value(settings)
            .map_err(|e| AppError::Internal(format!("Failed to serialize settings: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO app_settings (id, value, updated_at)
            VALUES (1, $1, NOW())
            ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save settings: {:?}", e);
            AppError::Database(e)
        })?;
        Ok(())
    }
}

#[cfg(test)]
impl SettingsService {
    /// In-memory service over a pool that never connects
    pub fn for_tests(settings: Settings) -> Arc<Self> {
        let pool = crate::core::database::lazy_test_pool();
        let files = Arc::new(FileRepository::new(pool.clone(), true));
        Arc::new(Self::with_settings(
            pool,
            settings.clone(),
            settings,
            files,
        ))
    }
}
