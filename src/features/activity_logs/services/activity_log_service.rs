use sqlx::PgPool;

use crate::core::error::{AppError, Result};
use crate::features::activity_logs::models::{ActivityLog, CreateActivityLog};

/// Cap on rows written by a single CSV export
const EXPORT_LIMIT: i64 = 50_000;

const CSV_HEADER: &str = "id,time,action,file,user_id,user_login,ip,details";

/// Service for the append-only activity log
pub struct ActivityLogService {
    pool: PgPool,
}

impl ActivityLogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an entry. Failures are logged and swallowed so that logging never
    /// breaks the operation being logged.
    pub async fn record(&self, entry: CreateActivityLog) {
        let result = sqlx::query(
            r#"
            INSERT INTO activity_logs (action, file, user_id, user_login, ip, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&entry.action)
        .bind(&entry.file)
        .bind(&entry.user_id)
        .bind(&entry.user_login)
        .bind(&entry.ip)
        .bind(&entry.details)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                "Failed to write activity log (action={}, file={:?}): {:?}",
                entry.action,
                entry.file,
                e
            );
        }
    }

    pub async fn list(
        &self,
        action: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ActivityLog>, i64)> {
        let items = sqlx::query_as::<_, ActivityLog>(
            r#"
            SELECT * FROM activity_logs
            WHERE ($1::TEXT IS NULL OR action = $1)
            ORDER BY time DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(action)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list activity logs: {:?}", e);
            AppError::Database(e)
        })?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM activity_logs WHERE ($1::TEXT IS NULL OR action = $1)",
        )
        .bind(action)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to count activity logs: {:?}", e);
            AppError::Database(e)
        })?;

        Ok((items, total))
    }

    pub async fn export_csv(&self, action: Option<&str>) -> Result<String> {
        let (items, total) = self.list(action, 0, EXPORT_LIMIT).await?;
        if total > EXPORT_LIMIT {
            tracing::warn!(
                "Activity log export truncated to {} of {} entries",
                EXPORT_LIMIT,
                total
            );
        }
        Ok(to_csv(&items))
    }
}

/// Render entries as RFC 4180 CSV with a header row.
pub fn to_csv(entries: &[ActivityLog]) -> String {
    let mut out = String::with_capacity(64 * (entries.len() + 1));
    out.push_str(CSV_HEADER);
    out.push_str("\r\n");

    for entry in entries {
        let fields = [
            entry.id.to_string(),
            entry.time.to_rfc3339(),
            entry.action.clone(),
            entry.file.clone().unwrap_or_default(),
            entry.user_id.clone().unwrap_or_default(),
            entry.user_login.clone().unwrap_or_default(),
            entry.ip.clone().unwrap_or_default(),
            entry.details.clone().unwrap_or_default(),
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out
}

fn csv_field(value: &str) -> String {
    // Leading formula characters are neutralized for spreadsheet consumers
    let value = if value.starts_with(['=', '+', '-', '@']) {
        format!("'{value}")
    } else {
        value.to_string()
    };

    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}
