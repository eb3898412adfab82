//! Task record CRUD and the atomic terminal-transition guards.

use crate::error::DatabaseError;
use crate::types::{Status, TaskId};
use crate::{Error, Result};

use super::{Database, NewTask, Task, TaskCompletion};

const TASK_COLUMNS: &str = r#"
    id, provider_task_id, owner_id, kind, title, status, params,
    source_url, storage_path, artifact_url, provider_item_id,
    duration_secs, tags, error_message,
    created_at, updated_at, completed_at
"#;

impl Database {
    /// Insert a new task record
    ///
    /// A duplicate provider task id surfaces as
    /// [`DatabaseError::ConstraintViolation`]; correlation ids are unique
    /// across all task records by schema.
    pub async fn insert_task(&self, task: &NewTask) -> Result<TaskId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (
                provider_task_id, owner_id, kind, title, status, params,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.provider_task_id)
        .bind(&task.owner_id)
        .bind(task.kind)
        .bind(&task.title)
        .bind(task.status)
        .bind(&task.params)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Database(DatabaseError::ConstraintViolation(format!(
                    "provider task id {} already registered",
                    task.provider_task_id
                )))
            }
            _ => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert task: {}",
                e
            ))),
        })?;

        Ok(TaskId(result.last_insert_rowid()))
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a task by its provider correlation id
    pub async fn get_task_by_provider_id(&self, provider_task_id: &str) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE provider_task_id = ?"
        ))
        .bind(provider_task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task by provider id: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all tasks, newest first
    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list tasks: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List non-terminal tasks created at or before the given unix timestamp
    ///
    /// Used by the recovery sweep to find tasks whose notifications never
    /// arrived.
    pub async fn list_stale_active_tasks(&self, created_before: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE status IN (?, ?) AND created_at <= ?
            ORDER BY created_at ASC
            "#
        ))
        .bind(Status::Pending.to_i32())
        .bind(Status::Processing.to_i32())
        .bind(created_before)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list stale tasks: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Atomically complete a task, but only if it is still active
    ///
    /// Single conditional UPDATE guarded on `status IN (pending,
    /// processing)`. Returns `true` if this call performed the
    /// transition; `false` means the task was already terminal (the other
    /// notification channel won the race) and nothing was written.
    pub async fn complete_task_if_active(
        &self,
        id: TaskId,
        completion: &TaskCompletion,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                status = ?,
                source_url = ?,
                storage_path = ?,
                artifact_url = ?,
                provider_item_id = ?,
                duration_secs = ?,
                tags = ?,
                error_message = NULL,
                updated_at = ?,
                completed_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(Status::Completed.to_i32())
        .bind(&completion.source_url)
        .bind(&completion.storage_path)
        .bind(&completion.artifact_url)
        .bind(&completion.provider_item_id)
        .bind(completion.duration_secs)
        .bind(&completion.tags)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(Status::Pending.to_i32())
        .bind(Status::Processing.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to complete task: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically mark a task failed or rejected, but only if it is still active
    ///
    /// Same conditional-update discipline as
    /// [`complete_task_if_active`](Self::complete_task_if_active).
    /// Returns `true` if this call performed the transition.
    pub async fn fail_task_if_active(
        &self,
        id: TaskId,
        status: Status,
        error_message: &str,
    ) -> Result<bool> {
        debug_assert!(matches!(status, Status::Failed | Status::Rejected));
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                status = ?,
                error_message = ?,
                updated_at = ?,
                completed_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(status.to_i32())
        .bind(error_message)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(Status::Pending.to_i32())
        .bind(Status::Processing.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark task failed: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a pending task as processing (post-submission transition)
    pub async fn mark_task_processing(&self, id: TaskId) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE tasks SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(Status::Processing.to_i32())
        .bind(now)
        .bind(id)
        .bind(Status::Pending.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark task processing: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a task and (by cascade) its variants
    ///
    /// Returns `true` if a row was deleted.
    pub async fn delete_task(&self, id: TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete task: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
