//! Variant fan-out rows.
//!
//! Variants are born completed and never mutated; there is no update
//! path here by design of the data model.

use crate::error::DatabaseError;
use crate::types::{Status, TaskId};
use crate::{Error, Result};

use super::{Database, NewVariant, Variant};

impl Database {
    /// Insert a variant record
    pub async fn insert_variant(&self, variant: &NewVariant) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO variants (
                task_id, title, params, source_url, storage_path,
                artifact_url, provider_item_id, duration_secs, tags,
                status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(variant.task_id)
        .bind(&variant.title)
        .bind(&variant.params)
        .bind(&variant.source_url)
        .bind(&variant.storage_path)
        .bind(&variant.artifact_url)
        .bind(&variant.provider_item_id)
        .bind(variant.duration_secs)
        .bind(&variant.tags)
        .bind(Status::Completed.to_i32())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert variant: {}",
                e
            )))
        })?;

        Ok(result.last_insert_rowid())
    }

    /// List variants of a task, in creation order
    pub async fn list_variants(&self, task_id: TaskId) -> Result<Vec<Variant>> {
        let rows = sqlx::query_as::<_, Variant>(
            r#"
            SELECT
                id, task_id, title, params, source_url, storage_path,
                artifact_url, provider_item_id, duration_secs, tags,
                status, created_at
            FROM variants
            WHERE task_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list variants: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Count variants of a task
    pub async fn count_variants(&self, task_id: TaskId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM variants WHERE task_id = ?")
            .bind(task_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count variants: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
