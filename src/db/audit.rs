//! Append-only notification log.
//!
//! One row per received notification (push callback or poll), written
//! before any processing happens. Nothing in the reconciliation path
//! reads these rows back; they exist for diagnostics only.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{Database, NewNotification, Notification};

impl Database {
    /// Append a notification to the audit log
    ///
    /// Failures here are reported to the caller but must never abort
    /// notification processing; the log is non-authoritative.
    pub async fn record_notification(&self, entry: &NewNotification) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO notification_log (
                received_at, provider_task_id, detected_type,
                raw_payload, processing_status
            ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(now)
        .bind(&entry.provider_task_id)
        .bind(&entry.detected_type)
        .bind(&entry.raw_payload)
        .bind(&entry.processing_status)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record notification: {}",
                e
            )))
        })?;

        Ok(result.last_insert_rowid())
    }

    /// List logged notifications for one provider task id, oldest first
    pub async fn list_notifications(&self, provider_task_id: &str) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, received_at, provider_task_id, detected_type,
                   raw_payload, processing_status
            FROM notification_log
            WHERE provider_task_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(provider_task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list notifications: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Total number of logged notifications
    pub async fn count_notifications(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notification_log")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count notifications: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
