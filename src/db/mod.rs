//! Database layer for tunevault
//!
//! Handles SQLite persistence for tasks, variants, and the notification
//! audit log.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`tasks`] — Task record CRUD and the atomic terminal-transition guards
//! - [`variants`] — Variant fan-out rows
//! - [`audit`] — Append-only notification log (never read by decision logic)

use crate::types::TaskId;
use sqlx::{FromRow, sqlite::SqlitePool};

mod audit;
mod migrations;
mod tasks;
mod variants;

/// New task record to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Provider correlation id (unique across all task records)
    pub provider_task_id: String,
    /// Owner this task is scoped to
    pub owner_id: String,
    /// Job family (0=music, 1=music video)
    pub kind: i32,
    /// Display title
    pub title: Option<String>,
    /// Current status (0=pending, 1=processing, 2=completed, 3=failed, 4=rejected)
    pub status: i32,
    /// Opaque generation parameters as a JSON string
    pub params: String,
}

/// Task record from database
#[derive(Debug, Clone, FromRow)]
pub struct Task {
    /// Unique database ID
    pub id: i64,
    /// Provider correlation id
    pub provider_task_id: String,
    /// Owner this task is scoped to
    pub owner_id: String,
    /// Job family (0=music, 1=music video)
    pub kind: i32,
    /// Display title
    pub title: Option<String>,
    /// Current status (0=pending, 1=processing, 2=completed, 3=failed, 4=rejected)
    pub status: i32,
    /// Opaque generation parameters as a JSON string
    pub params: String,
    /// Remote-origin URL of the primary artifact
    pub source_url: Option<String>,
    /// Vault path of the primary artifact
    pub storage_path: Option<String>,
    /// Signed retrieval reference for the primary artifact
    pub artifact_url: Option<String>,
    /// Provider's per-output identifier for the primary artifact
    pub provider_item_id: Option<String>,
    /// Duration in seconds, when the provider reported one
    pub duration_secs: Option<f64>,
    /// Comma-separated style tags
    pub tags: Option<String>,
    /// Error message if the task failed or was rejected
    pub error_message: Option<String>,
    /// Unix timestamp when the task was created
    pub created_at: i64,
    /// Unix timestamp of the last mutation
    pub updated_at: i64,
    /// Unix timestamp when the task reached a terminal state
    pub completed_at: Option<i64>,
}

/// Primary-artifact fields written by the atomic completion update
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    /// Remote-origin URL the primary artifact was fetched from
    pub source_url: String,
    /// Vault path of the primary artifact
    pub storage_path: String,
    /// Signed retrieval reference for the primary artifact
    pub artifact_url: String,
    /// Provider's per-output identifier
    pub provider_item_id: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<f64>,
    /// Comma-separated style tags
    pub tags: Option<String>,
}

/// New variant record to be inserted during fan-out
#[derive(Debug, Clone)]
pub struct NewVariant {
    /// Parent task this variant belongs to
    pub task_id: TaskId,
    /// Derived display title ("<parent title> (Variant k)")
    pub title: String,
    /// Generation parameters cloned from the parent
    pub params: String,
    /// Remote-origin URL of this variant's artifact
    pub source_url: String,
    /// Vault path of this variant's artifact
    pub storage_path: String,
    /// Signed retrieval reference for this variant's artifact
    pub artifact_url: String,
    /// Provider's per-output identifier
    pub provider_item_id: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<f64>,
    /// Comma-separated style tags
    pub tags: Option<String>,
}

/// Variant record from database
#[derive(Debug, Clone, FromRow)]
pub struct Variant {
    /// Unique database ID
    pub id: i64,
    /// Parent task this variant belongs to
    pub task_id: i64,
    /// Derived display title
    pub title: String,
    /// Generation parameters cloned from the parent
    pub params: String,
    /// Remote-origin URL of this variant's artifact
    pub source_url: String,
    /// Vault path of this variant's artifact
    pub storage_path: String,
    /// Signed retrieval reference for this variant's artifact
    pub artifact_url: String,
    /// Provider's per-output identifier
    pub provider_item_id: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<f64>,
    /// Comma-separated style tags
    pub tags: Option<String>,
    /// Always 2 (completed); variants are born terminal
    pub status: i32,
    /// Unix timestamp when the variant was created
    pub created_at: i64,
}

/// New notification log entry
#[derive(Debug, Clone)]
pub struct NewNotification {
    /// Provider correlation id, when one could be extracted
    pub provider_task_id: Option<String>,
    /// Detected payload shape name (e.g., "generation", "unknown")
    pub detected_type: String,
    /// Raw payload as received, JSON-encoded
    pub raw_payload: String,
    /// Processing status at log time (e.g., "received", "polling")
    pub processing_status: String,
}

/// Notification log entry from database
#[derive(Debug, Clone, FromRow)]
pub struct Notification {
    /// Unique database ID
    pub id: i64,
    /// Unix timestamp when the notification was received
    pub received_at: i64,
    /// Provider correlation id, when one could be extracted
    pub provider_task_id: Option<String>,
    /// Detected payload shape name
    pub detected_type: String,
    /// Raw payload as received, JSON-encoded
    pub raw_payload: String,
    /// Processing status at log time
    pub processing_status: String,
}

/// Database handle for tunevault
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
