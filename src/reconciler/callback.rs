//! Inbound push callback processing.
//!
//! The push source is untrusted and retry-happy, so this path has one
//! non-negotiable contract: the caller is always acknowledged as
//! successful, whatever happened inside. That acknowledgment is a
//! deliberate backpressure control — a non-success response would make
//! the source retry-storm an endpoint whose failure is internal — and
//! not an accident of broad error handling. Internal processing gets a
//! bounded exponential-backoff retry; when that budget is exhausted the
//! notification is abandoned and the deferred poll remains the backstop.

use crate::callback::{CallbackPayload, CallbackStage, classify};
use crate::db::NewNotification;
use crate::retry::run_with_retry;
use crate::types::{Event, GeneratedTrack};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::TuneVault;

/// Acknowledgment returned to the push source
///
/// Always reports success at the transport level; `processed` is
/// diagnostic only and carries no contract.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CallbackAck {
    /// Always "received"
    pub status: String,
    /// Correlation id extracted from the payload, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Whether internal processing ran to completion
    pub processed: bool,
}

impl TuneVault {
    /// Process one inbound callback payload
    ///
    /// Never returns an error: classification failures are audited and
    /// dropped, dispatch failures are retried then abandoned.
    pub async fn handle_callback(&self, raw: Value) -> CallbackAck {
        let payload = classify(&raw);
        let provider_task_id = payload.provider_task_id().map(String::from);

        tracing::info!(
            detected = payload.detected_type(),
            provider_task_id = provider_task_id.as_deref(),
            "Callback received"
        );
        self.emit(Event::CallbackReceived {
            provider_task_id: provider_task_id.clone(),
            detected: payload.detected_type().to_string(),
        });

        // Audit first, before any processing can fail. The log is
        // non-authoritative, so its own failure is only a warning.
        let processing_status = if matches!(payload, CallbackPayload::Unknown) {
            "dropped"
        } else {
            "received"
        };
        if let Err(e) = self
            .db
            .record_notification(&NewNotification {
                provider_task_id: provider_task_id.clone(),
                detected_type: payload.detected_type().to_string(),
                raw_payload: raw.to_string(),
                processing_status: processing_status.to_string(),
            })
            .await
        {
            tracing::warn!(error = %e, "Failed to audit callback, continuing");
        }

        if matches!(payload, CallbackPayload::Unknown) {
            tracing::warn!("Unrecognized callback shape, dropped");
            return CallbackAck {
                status: "received".to_string(),
                task_id: None,
                processed: false,
            };
        }

        let processed = match run_with_retry(&self.config.callback_retry, || {
            self.dispatch(payload.clone())
        })
        .await
        {
            Ok(()) => true,
            Err(e) => {
                // Out of attempts: abandon. The deferred poll will
                // reconcile whatever this callback carried.
                tracing::error!(
                    provider_task_id = provider_task_id.as_deref(),
                    error = %e,
                    "Callback processing abandoned after retries"
                );
                false
            }
        };

        CallbackAck {
            status: "received".to_string(),
            task_id: provider_task_id,
            processed,
        }
    }

    /// Route one classified payload to the right handler
    async fn dispatch(&self, payload: CallbackPayload) -> crate::Result<()> {
        match payload {
            CallbackPayload::Generation(g) | CallbackPayload::Bare(g) => match g.stage {
                CallbackStage::Complete => {
                    self.complete_generation(&g.provider_task_id, &g.tracks).await?;
                    Ok(())
                }
                stage => {
                    // text/first progress markers carry no final artifacts
                    tracing::debug!(
                        provider_task_id = %g.provider_task_id,
                        stage = ?stage,
                        "Intermediate callback, no mutation"
                    );
                    Ok(())
                }
            },
            CallbackPayload::Failure(f) => {
                self.record_provider_failure(&f.provider_task_id, &f.error_message)
                    .await?;
                Ok(())
            }
            CallbackPayload::DerivedAsset(d) => {
                if d.code == 200 && d.video_url.is_some() {
                    let track = GeneratedTrack {
                        source_url: d.video_url.clone(),
                        ..Default::default()
                    };
                    self.complete_generation(&d.provider_task_id, &[track]).await?;
                } else {
                    let message = d.msg.as_deref().unwrap_or("Video generation failed");
                    self.record_provider_failure(&d.provider_task_id, message).await?;
                }
                Ok(())
            }
            CallbackPayload::Unknown => Ok(()),
        }
    }
}
