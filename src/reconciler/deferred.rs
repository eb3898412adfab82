//! One-shot deferred poll timer.
//!
//! Scheduled at submission, fires exactly once well after expected
//! completion. It is the backstop for every failure mode of the push
//! channel: callbacks that never arrive, arrive malformed, or exhaust
//! their processing retries. A task with no notification at all stays
//! processing only until this fires — bounded staleness, not a hang.

use crate::types::Status;

use super::{PollOptions, TuneVault};

impl TuneVault {
    /// Spawn the one-shot safety-net poll for a freshly submitted task
    pub(crate) fn spawn_deferred_poll(&self, provider_task_id: String) {
        if !self.config.deferred_poll.enabled {
            tracing::debug!(%provider_task_id, "Deferred poll disabled by config");
            return;
        }

        let engine = self.clone();
        let delay = self.config.deferred_poll.delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Skip the provider round-trip when the callback already won
            match engine.db.get_task_by_provider_id(&provider_task_id).await {
                Ok(Some(task)) if Status::from_i32(task.status).is_terminal() => {
                    tracing::debug!(
                        %provider_task_id,
                        "Deferred poll found task already terminal, nothing to do"
                    );
                    return;
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!(%provider_task_id, "Deferred poll found no task record");
                    return;
                }
                Err(e) => {
                    tracing::warn!(%provider_task_id, error = %e, "Deferred poll lookup failed");
                    return;
                }
            }

            tracing::info!(%provider_task_id, "Deferred safety-net poll firing");
            match engine
                .poll_task(&provider_task_id, PollOptions::default())
                .await
            {
                Ok(report) => {
                    tracing::info!(
                        %provider_task_id,
                        status = %report.status,
                        provider_state = %report.provider_state,
                        "Deferred poll finished"
                    );
                }
                Err(e) => {
                    // One-shot by design: a failed safety net is logged,
                    // not rescheduled. Manual polling remains available.
                    tracing::warn!(%provider_task_id, error = %e, "Deferred poll failed");
                }
            }
        });
    }
}
