//! Core reconciliation engine split into focused submodules.
//!
//! The `TuneVault` struct and its methods are organized by domain:
//! - [`handler`] - Shared idempotent completion handler
//! - [`fanout`] - Variant fan-out writer
//! - [`callback`] - Inbound push callback processing
//! - [`poll`] - Pull-based poll reconciliation and the recovery sweep
//! - [`deferred`] - One-shot deferred poll timer
//! - [`submit`] - Submission flow (provider collaborator + task record)

mod callback;
mod deferred;
mod fanout;
mod handler;
mod poll;
mod submit;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests;

pub use callback::CallbackAck;
pub use poll::PollOptions;

use crate::config::Config;
use crate::db::Database;
use crate::materializer::Materializer;
use crate::provider::{HttpProviderClient, ProviderClient};
use crate::types::{Event, TaskId, TaskInfo, VariantInfo};
use crate::vault::ArtifactVault;
use std::sync::Arc;

/// Main engine instance (cloneable - all fields are Arc-wrapped or cheap)
///
/// Tracks generation tasks, reconciles the racing push/pull notification
/// channels through one idempotent completion handler, and vaults
/// artifacts durably. The database record is the single source of truth
/// for task status; events and reports are advisory views of it.
#[derive(Clone)]
pub struct TuneVault {
    /// Database instance for persistence (public for integration tests
    /// and API handlers to query task state)
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Artifact downloader over the vault
    pub(crate) materializer: Materializer,
    /// Generation provider collaborator
    pub(crate) provider: Arc<dyn ProviderClient>,
}

impl TuneVault {
    /// Create an engine with the HTTP provider client
    pub async fn new(config: Config) -> crate::Result<Self> {
        let provider = Arc::new(HttpProviderClient::new(&config.provider)?);
        Self::with_provider(config, provider).await
    }

    /// Create an engine with a custom provider implementation
    ///
    /// The seam the tests use; production callers normally go through
    /// [`new`](Self::new).
    pub async fn with_provider(
        config: Config,
        provider: Arc<dyn ProviderClient>,
    ) -> crate::Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let vault = ArtifactVault::new(&config.vault);
        let materializer = Materializer::new(vault, config.vault.download_timeout)?;
        let (event_tx, _) = tokio::sync::broadcast::channel(256);

        Ok(Self {
            db,
            event_tx,
            config: Arc::new(config),
            materializer,
            provider,
        })
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Access to the artifact vault (for the retrieval endpoint)
    pub fn vault(&self) -> &ArtifactVault {
        self.materializer.vault()
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Look up one task as its public view
    pub async fn task_info(&self, id: TaskId) -> crate::Result<Option<TaskInfo>> {
        Ok(self.db.get_task(id).await?.map(|row| TaskInfo::from_row(&row)))
    }

    /// List all tasks as public views, newest first
    pub async fn list_task_infos(&self) -> crate::Result<Vec<TaskInfo>> {
        let rows = self.db.list_tasks().await?;
        Ok(rows.iter().map(TaskInfo::from_row).collect())
    }

    /// List a task's variants as public views
    pub async fn list_variant_infos(&self, id: TaskId) -> crate::Result<Vec<VariantInfo>> {
        let rows = self.db.list_variants(id).await?;
        Ok(rows.iter().map(VariantInfo::from_row).collect())
    }

    /// Delete a task and its variants; stored artifact files are kept
    /// (vault cleanup is a storage-lifecycle concern, not a record one)
    pub async fn delete_task(&self, id: TaskId) -> crate::Result<bool> {
        self.db.delete_task(id).await
    }

    /// Shut the engine down, closing the database pool
    ///
    /// In-flight deferred polls fail harmlessly once the pool is closed;
    /// their tasks stay active and are picked up by the recovery sweep
    /// on the next start.
    pub async fn shutdown(&self) -> crate::Result<()> {
        tracing::info!("Engine shutting down");
        self.db.close().await;
        Ok(())
    }

    /// Emit an event, ignoring the no-subscriber case
    pub(crate) fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }
}
