//! Shared idempotent completion handler.
//!
//! Both notification channels — the push callback and the pull poll —
//! funnel success results through [`TuneVault::complete_generation`].
//! The handler tolerates everything an untrusted notification source can
//! do: unknown correlation ids, duplicates, reorderings, and partial or
//! empty artifact lists. The authoritative race arbiter is the
//! conditional status update in the database; the early status read is
//! only a fast path that skips download work when the outcome is
//! already decided.

use crate::db::TaskCompletion;
use crate::types::{
    CompletionOutcome, Event, GeneratedTrack, JobKind, MaterializedTrack, Status, TaskId, Verdict,
};

use super::TuneVault;

/// Terminal reason recorded when every descriptor failed materialization
pub(crate) const ARTIFACT_RETRIEVAL_FAILURE: &str = "artifact retrieval failure";

impl TuneVault {
    /// Reconcile a success notification for one task
    ///
    /// Steps:
    /// 1. Look up the task record by provider correlation id; orphan
    ///    notifications are logged and ignored.
    /// 2. Skip immediately if the record is already terminal.
    /// 3. Materialize each descriptor independently; a single item's
    ///    failure is logged and skipped, never aborting the batch.
    /// 4. With at least one stored artifact, atomically complete the
    ///    task (first artifact becomes the primary) and fan the rest out
    ///    as variants. Losing the conditional update means the other
    ///    channel finished first; the loser writes nothing.
    /// 5. With a non-empty input and zero stored artifacts, mark the
    ///    task failed.
    /// 6. With an empty input, leave the task processing: metadata can
    ///    lag artifact availability and an empty success signal must not
    ///    be treated as failure.
    pub async fn complete_generation(
        &self,
        provider_task_id: &str,
        tracks: &[GeneratedTrack],
    ) -> crate::Result<CompletionOutcome> {
        let Some(task) = self.db.get_task_by_provider_id(provider_task_id).await? else {
            tracing::warn!(
                provider_task_id,
                "No task record for completion notification, ignoring"
            );
            return Ok(CompletionOutcome::NotFound);
        };

        let task_id = TaskId(task.id);
        let current = Status::from_i32(task.status);
        if current.is_terminal() {
            tracing::info!(
                provider_task_id,
                %task_id,
                status = %current,
                "Task already terminal, completion is a no-op"
            );
            return Ok(CompletionOutcome::AlreadyTerminal { status: current });
        }

        if tracks.is_empty() {
            tracing::info!(
                provider_task_id,
                %task_id,
                "Success notification without artifacts, leaving task processing"
            );
            return Ok(CompletionOutcome::StillProcessing);
        }

        let kind = JobKind::from_i32(task.kind);
        let attempted = tracks.len();
        let mut stored: Vec<MaterializedTrack> = Vec::with_capacity(attempted);

        for (index, track) in tracks.iter().enumerate() {
            let Some(source_url) = track.source_url.as_deref() else {
                tracing::warn!(
                    provider_task_id,
                    index,
                    "Descriptor has no source URL, skipping item"
                );
                continue;
            };

            match self
                .materializer
                .materialize(source_url, &task.owner_id, kind, provider_task_id, index)
                .await
            {
                Ok(artifact) => {
                    tracing::debug!(
                        provider_task_id,
                        index,
                        path = %artifact.storage_path,
                        "Artifact materialized"
                    );
                    stored.push(MaterializedTrack {
                        track: track.clone(),
                        artifact,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        provider_task_id,
                        index,
                        error = %e,
                        "Artifact materialization failed, skipping item"
                    );
                }
            }
        }

        let succeeded = stored.len();

        if stored.is_empty() {
            let updated = self
                .db
                .fail_task_if_active(task_id, Status::Failed, ARTIFACT_RETRIEVAL_FAILURE)
                .await?;
            if !updated {
                tracing::info!(
                    provider_task_id,
                    %task_id,
                    "Lost the failure write to the other channel, no-op"
                );
                return Ok(CompletionOutcome::LostRace);
            }

            tracing::error!(
                provider_task_id,
                %task_id,
                attempted,
                "Every artifact failed materialization, task marked failed"
            );
            self.emit(Event::TaskFailed {
                id: task_id,
                provider_task_id: provider_task_id.to_string(),
                verdict: Verdict::Failed,
                error: ARTIFACT_RETRIEVAL_FAILURE.to_string(),
            });
            return Ok(CompletionOutcome::Failed { task_id, attempted });
        }

        let primary = &stored[0];
        let completion = TaskCompletion {
            source_url: primary.artifact.source_url.clone(),
            storage_path: primary.artifact.storage_path.clone(),
            artifact_url: primary.artifact.artifact_url.clone(),
            provider_item_id: primary.track.provider_item_id.clone(),
            duration_secs: primary.track.duration_secs,
            tags: primary.track.tags.clone(),
        };

        // The one write that decides the race: update-where-still-active.
        // Zero rows affected means the other channel already completed or
        // failed this task; everything this call downloaded stays invisible.
        let won = self.db.complete_task_if_active(task_id, &completion).await?;
        if !won {
            tracing::info!(
                provider_task_id,
                %task_id,
                "Task completed by the other channel first, discarding result"
            );
            return Ok(CompletionOutcome::LostRace);
        }

        let variants_created = self.write_variants(&task, &stored[1..]).await;

        tracing::info!(
            provider_task_id,
            %task_id,
            attempted,
            succeeded,
            variants_created,
            "Task completed"
        );
        self.emit(Event::TaskCompleted {
            id: task_id,
            provider_task_id: provider_task_id.to_string(),
            variant_count: variants_created,
        });

        Ok(CompletionOutcome::Completed {
            task_id,
            attempted,
            succeeded,
            variants_created,
        })
    }

    /// Record a provider-reported failure through the classifier
    ///
    /// Shared by the error callback shape, the failed derived-asset
    /// shape, and the poll path. No-ops (returning `None`) when the task
    /// is unknown or already terminal.
    pub(crate) async fn record_provider_failure(
        &self,
        provider_task_id: &str,
        error_message: &str,
    ) -> crate::Result<Option<Verdict>> {
        let Some(task) = self.db.get_task_by_provider_id(provider_task_id).await? else {
            tracing::warn!(
                provider_task_id,
                "No task record for failure notification, ignoring"
            );
            return Ok(None);
        };

        let task_id = TaskId(task.id);
        if Status::from_i32(task.status).is_terminal() {
            tracing::info!(provider_task_id, %task_id, "Task already terminal, failure is a no-op");
            return Ok(None);
        }

        let verdict = crate::classifier::classify_failure(error_message, &self.config.classification);
        let updated = self
            .db
            .fail_task_if_active(task_id, verdict.as_status(), error_message)
            .await?;
        if !updated {
            tracing::info!(provider_task_id, %task_id, "Lost the failure write, no-op");
            return Ok(None);
        }

        tracing::info!(
            provider_task_id,
            %task_id,
            verdict = ?verdict,
            error = error_message,
            "Task marked terminal by provider failure"
        );
        self.emit(Event::TaskFailed {
            id: task_id,
            provider_task_id: provider_task_id.to_string(),
            verdict,
            error: error_message.to_string(),
        });

        Ok(Some(verdict))
    }
}
