//! Submission flow.
//!
//! The provider's submission API is an opaque collaborator: it takes
//! generation parameters plus our callback URL and answers with a
//! correlation id. Everything around that call belongs here — creating
//! the task record in processing state and arming the one-shot deferred
//! poll that guarantees eventual reconciliation.

use crate::db::NewTask;
use crate::types::{Event, Status, SubmitRequest, TaskInfo};

use super::TuneVault;

impl TuneVault {
    /// Submit a generation job and register its task record
    pub async fn submit(&self, request: SubmitRequest) -> crate::Result<TaskInfo> {
        if request.owner_id.trim().is_empty() {
            return Err(crate::Error::InvalidRequest(
                "owner_id must not be empty".to_string(),
            ));
        }
        if !request.params.is_object() {
            return Err(crate::Error::InvalidRequest(
                "generation parameters must be a JSON object".to_string(),
            ));
        }

        let provider_task_id = self
            .provider
            .submit_generation(
                &request.params,
                request.kind,
                self.config.provider.callback_url.as_deref(),
            )
            .await?;

        let id = self
            .db
            .insert_task(&NewTask {
                provider_task_id: provider_task_id.clone(),
                owner_id: request.owner_id.clone(),
                kind: request.kind.to_i32(),
                title: request.title.clone(),
                status: Status::Processing.to_i32(),
                params: request.params.to_string(),
            })
            .await?;

        tracing::info!(
            %id,
            %provider_task_id,
            owner_id = %request.owner_id,
            kind = ?request.kind,
            "Generation submitted"
        );
        self.emit(Event::TaskSubmitted {
            id,
            provider_task_id: provider_task_id.clone(),
        });

        self.spawn_deferred_poll(provider_task_id);

        let task = self.db.get_task(id).await?.ok_or_else(|| {
            crate::Error::Other("task record vanished immediately after insert".to_string())
        })?;
        Ok(TaskInfo::from_row(&task))
    }
}
