//! Pull-based poll reconciliation.
//!
//! The poll path is the second notification channel: it queries the
//! provider's coarse status on demand and routes the result through the
//! same idempotent handler the callback path uses. Unlike the callback
//! path it may return errors to its caller — that caller chose to poll
//! and can safely retry.

use crate::db::NewNotification;
use crate::provider::ProviderState;
use crate::types::{CompletionOutcome, JobKind, PollReport, Status, TaskId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::TuneVault;

/// Options for one poll invocation
#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema)]
pub struct PollOptions {
    /// Persist a terminal failure when the provider reports one
    /// (default: true). With `false` the poll only observes.
    #[serde(default = "default_persist_failure")]
    pub persist_failure: bool,

    /// Override the job family to poll as; defaults to the task
    /// record's own family
    #[serde(default)]
    pub kind: Option<JobKind>,
}

fn default_persist_failure() -> bool {
    true
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            persist_failure: true,
            kind: None,
        }
    }
}

impl TuneVault {
    /// Poll the provider for one task and reconcile the answer
    ///
    /// Routing:
    /// - success with artifacts → the shared completion handler
    /// - success without artifacts → report processing, no mutation
    /// - provider-reported failure → classifier, then a conditional
    ///   terminal update (gated on `persist_failure`)
    /// - still running or unrecognized state → report processing,
    ///   no mutation
    pub async fn poll_task(
        &self,
        provider_task_id: &str,
        options: PollOptions,
    ) -> crate::Result<PollReport> {
        let Some(task) = self.db.get_task_by_provider_id(provider_task_id).await? else {
            return Err(crate::Error::NotFound(format!("task {provider_task_id}")));
        };
        let task_id = TaskId(task.id);
        let kind = options.kind.unwrap_or_else(|| JobKind::from_i32(task.kind));

        let snapshot = self.provider.fetch_status(provider_task_id, kind).await?;

        tracing::info!(
            provider_task_id,
            %task_id,
            state = snapshot.state.as_wire(),
            tracks = snapshot.tracks.len(),
            "Polled provider status"
        );

        // Same audit discipline as the callback path
        if let Err(e) = self
            .db
            .record_notification(&NewNotification {
                provider_task_id: Some(provider_task_id.to_string()),
                detected_type: "poll".to_string(),
                raw_payload: snapshot.raw.to_string(),
                processing_status: "polling".to_string(),
            })
            .await
        {
            tracing::warn!(error = %e, "Failed to audit poll, continuing");
        }

        let provider_state = snapshot.state.as_wire().to_string();

        match snapshot.state {
            ProviderState::Succeeded if !snapshot.tracks.is_empty() => {
                let outcome = self
                    .complete_generation(provider_task_id, &snapshot.tracks)
                    .await?;
                Ok(self.report_for_outcome(provider_task_id, provider_state, &snapshot.tracks, outcome))
            }
            ProviderState::Succeeded => Ok(PollReport {
                provider_task_id: provider_task_id.to_string(),
                status: Status::from_i32(task.status),
                provider_state,
                track_count: 0,
                message: "Provider reports success but artifacts are not yet available".to_string(),
            }),
            state if state.is_terminal_failure() => {
                let error_message = snapshot.error_message.clone().unwrap_or_else(|| {
                    match state {
                        ProviderState::ContentBlocked => {
                            "Content rejected by provider (policy violation)".to_string()
                        }
                        _ => "Task expired or failed on provider".to_string(),
                    }
                });

                if !options.persist_failure {
                    return Ok(PollReport {
                        provider_task_id: provider_task_id.to_string(),
                        status: Status::from_i32(task.status),
                        provider_state,
                        track_count: 0,
                        message: format!("Provider reports failure (not persisted): {error_message}"),
                    });
                }

                match self
                    .record_provider_failure(provider_task_id, &error_message)
                    .await?
                {
                    Some(verdict) => Ok(PollReport {
                        provider_task_id: provider_task_id.to_string(),
                        status: verdict.as_status(),
                        provider_state,
                        track_count: 0,
                        message: error_message,
                    }),
                    None => {
                        // Already terminal: report the recorded state untouched
                        let status = self
                            .db
                            .get_task(task_id)
                            .await?
                            .map(|t| Status::from_i32(t.status))
                            .unwrap_or(Status::Failed);
                        Ok(PollReport {
                            provider_task_id: provider_task_id.to_string(),
                            status,
                            provider_state,
                            track_count: 0,
                            message: "Task already terminal, failure not re-recorded".to_string(),
                        })
                    }
                }
            }
            state => {
                if matches!(state, ProviderState::Unknown(_)) {
                    tracing::warn!(
                        provider_task_id,
                        state = state.as_wire(),
                        "Unrecognized provider state, leaving task untouched"
                    );
                }
                Ok(PollReport {
                    provider_task_id: provider_task_id.to_string(),
                    status: Status::from_i32(task.status),
                    provider_state,
                    track_count: 0,
                    message: "Task is still being processed".to_string(),
                })
            }
        }
    }

    /// Sweep every stale active task through the poll path
    ///
    /// Finds tasks still pending/processing whose submission is at least
    /// `min_age` old and polls each with failure persistence on. Per-task
    /// errors are logged and skipped so one unreachable status never
    /// aborts the sweep.
    pub async fn recover_stale(&self, min_age: std::time::Duration) -> crate::Result<Vec<PollReport>> {
        let cutoff = chrono::Utc::now().timestamp() - min_age.as_secs() as i64;
        let stale = self.db.list_stale_active_tasks(cutoff).await?;

        if stale.is_empty() {
            return Ok(Vec::new());
        }
        tracing::info!(count = stale.len(), "Recovery sweep starting");

        let polls = stale.iter().map(|task| {
            let provider_task_id = task.provider_task_id.clone();
            async move {
                match self
                    .poll_task(&provider_task_id, PollOptions::default())
                    .await
                {
                    Ok(report) => Some(report),
                    Err(e) => {
                        tracing::warn!(
                            %provider_task_id,
                            error = %e,
                            "Recovery poll failed, skipping task"
                        );
                        None
                    }
                }
            }
        });

        let reports: Vec<PollReport> = futures::future::join_all(polls)
            .await
            .into_iter()
            .flatten()
            .collect();

        tracing::info!(recovered = reports.len(), "Recovery sweep finished");
        Ok(reports)
    }

    fn report_for_outcome(
        &self,
        provider_task_id: &str,
        provider_state: String,
        tracks: &[crate::types::GeneratedTrack],
        outcome: CompletionOutcome,
    ) -> PollReport {
        let (status, message) = match outcome {
            CompletionOutcome::Completed {
                succeeded,
                variants_created,
                ..
            } => (
                Status::Completed,
                format!(
                    "Task completed, {succeeded} artifact(s) stored, {variants_created} variant(s) created"
                ),
            ),
            CompletionOutcome::AlreadyTerminal { status } => (
                status,
                "Task already reconciled by the other channel, no mutation".to_string(),
            ),
            CompletionOutcome::LostRace => (
                Status::Completed,
                "Task reconciled concurrently by the other channel, no mutation".to_string(),
            ),
            CompletionOutcome::Failed { .. } => (
                Status::Failed,
                "Every artifact failed retrieval, task marked failed".to_string(),
            ),
            CompletionOutcome::StillProcessing => (
                Status::Processing,
                "Success signal without artifacts, task left processing".to_string(),
            ),
            CompletionOutcome::NotFound => (
                Status::Processing,
                "No task record for this correlation id".to_string(),
            ),
        };

        PollReport {
            provider_task_id: provider_task_id.to_string(),
            status,
            provider_state,
            track_count: tracks.len(),
            message,
        }
    }
}
