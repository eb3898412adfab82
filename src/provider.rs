//! Generation provider client
//!
//! The provider is a collaborator, not part of this system: submission
//! hands it opaque generation parameters and gets back a correlation id;
//! the poll path asks it for a coarse status snapshot. Both sit behind
//! the [`ProviderClient`] trait so the engine never depends on the wire
//! shapes directly.

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::types::{GeneratedTrack, JobKind};
use async_trait::async_trait;
use serde_json::Value;

/// Coarse provider-side job state
///
/// The wire vocabulary is open-ended; everything unrecognized lands in
/// `Unknown` and is treated as "still running" by the reconciler, which
/// never persists a state it cannot name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderState {
    /// Accepted, not yet started
    Pending,
    /// Actively generating
    Generating,
    /// Finished successfully (artifacts may still lag)
    Succeeded,
    /// Failed for a technical reason
    Failed,
    /// Refused on content/policy grounds
    ContentBlocked,
    /// A state this client does not recognize
    Unknown(String),
}

impl ProviderState {
    /// Map a wire state string onto the closed vocabulary
    pub fn from_wire(state: &str) -> Self {
        match state {
            "PENDING" => ProviderState::Pending,
            "GENERATING" | "TEXT_SUCCESS" | "FIRST_SUCCESS" => ProviderState::Generating,
            "SUCCESS" => ProviderState::Succeeded,
            "FAILED" | "CREATE_TASK_FAILED" | "GENERATE_MP4_FAILED" => ProviderState::Failed,
            "SENSITIVE_WORD_ERROR" => ProviderState::ContentBlocked,
            other => ProviderState::Unknown(other.to_string()),
        }
    }

    /// The wire-ish string used in reports back to callers
    pub fn as_wire(&self) -> &str {
        match self {
            ProviderState::Pending => "PENDING",
            ProviderState::Generating => "GENERATING",
            ProviderState::Succeeded => "SUCCESS",
            ProviderState::Failed => "FAILED",
            ProviderState::ContentBlocked => "SENSITIVE_WORD_ERROR",
            ProviderState::Unknown(s) => s,
        }
    }

    /// Whether the provider considers the job terminally failed
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, ProviderState::Failed | ProviderState::ContentBlocked)
    }
}

/// One coarse status snapshot for a job
#[derive(Clone, Debug)]
pub struct StatusSnapshot {
    /// Provider correlation id the snapshot is for
    pub provider_task_id: String,
    /// Coarse state
    pub state: ProviderState,
    /// Output descriptors, possibly empty even on success
    pub tracks: Vec<GeneratedTrack>,
    /// Error text, when the provider supplied one
    pub error_message: Option<String>,
    /// The raw status payload, kept for the audit log
    pub raw: Value,
}

/// Seam to the external generation provider
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Submit a generation job; returns the provider's correlation id
    ///
    /// `params` is opaque to this subsystem and forwarded verbatim, with
    /// the callback URL merged in when configured.
    async fn submit_generation(
        &self,
        params: &Value,
        kind: JobKind,
        callback_url: Option<&str>,
    ) -> crate::Result<String>;

    /// Fetch the current coarse status for a job
    async fn fetch_status(
        &self,
        provider_task_id: &str,
        kind: JobKind,
    ) -> crate::Result<StatusSnapshot>;
}

/// HTTP implementation of [`ProviderClient`]
pub struct HttpProviderClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpProviderClient {
    /// Create a client from provider configuration
    pub fn new(config: &ProviderConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(crate::Error::Network)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    /// Execute one request against the provider and unwrap the
    /// `{code, msg, data}` envelope
    async fn request(&self, method: reqwest::Method, path: &str, body: Option<&Value>) -> crate::Result<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(crate::Error::Provider(ProviderError::MissingCredentials))?;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bearer {}", api_key));

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            crate::Error::Provider(ProviderError::Request(e.to_string()))
        })?;

        let http_status = response.status();
        let envelope: Value = response.json().await.map_err(|e| {
            crate::Error::Provider(ProviderError::MalformedResponse(format!(
                "invalid JSON body: {}",
                e
            )))
        })?;

        let code = envelope.get("code").and_then(|c| c.as_i64());
        if !http_status.is_success() || code != Some(200) {
            let message = envelope
                .get("msg")
                .and_then(|m| m.as_str())
                .unwrap_or("no message")
                .to_string();
            return Err(crate::Error::Provider(ProviderError::Api {
                code: code.unwrap_or_else(|| i64::from(http_status.as_u16())),
                message,
            }));
        }

        envelope.get("data").cloned().ok_or_else(|| {
            crate::Error::Provider(ProviderError::MalformedResponse(
                "envelope has no data field".to_string(),
            ))
        })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn submit_generation(
        &self,
        params: &Value,
        kind: JobKind,
        callback_url: Option<&str>,
    ) -> crate::Result<String> {
        let mut body = params.clone();
        if !body.is_object() {
            return Err(crate::Error::InvalidRequest(
                "generation parameters must be a JSON object".to_string(),
            ));
        }
        if let (Some(obj), Some(url)) = (body.as_object_mut(), callback_url) {
            obj.insert("callBackUrl".to_string(), Value::String(url.to_string()));
        }

        let path = match kind {
            JobKind::Music => "/generate",
            JobKind::MusicVideo => "/mp4/generate",
        };

        let data = self.request(reqwest::Method::POST, path, Some(&body)).await?;

        data.get("taskId")
            .and_then(|t| t.as_str())
            .map(String::from)
            .ok_or_else(|| {
                crate::Error::Provider(ProviderError::MalformedResponse(
                    "submission response has no taskId".to_string(),
                ))
            })
    }

    async fn fetch_status(
        &self,
        provider_task_id: &str,
        kind: JobKind,
    ) -> crate::Result<StatusSnapshot> {
        let path = match kind {
            JobKind::Music => format!("/generate/record-info?taskId={provider_task_id}"),
            JobKind::MusicVideo => format!("/mp4/record-info?taskId={provider_task_id}"),
        };

        let data = self.request(reqwest::Method::GET, &path, None).await?;

        let snapshot = match kind {
            JobKind::Music => parse_music_snapshot(provider_task_id, &data),
            JobKind::MusicVideo => parse_video_snapshot(provider_task_id, &data),
        };

        tracing::debug!(
            provider_task_id,
            state = snapshot.state.as_wire(),
            tracks = snapshot.tracks.len(),
            "Fetched provider status"
        );

        Ok(snapshot)
    }
}

/// Parse the music family's status payload
///
/// Track list lives under `response.sunoData` in current payloads and
/// `response.data` in older ones.
fn parse_music_snapshot(provider_task_id: &str, data: &Value) -> StatusSnapshot {
    let state = data
        .get("status")
        .and_then(|s| s.as_str())
        .map(ProviderState::from_wire)
        .unwrap_or_else(|| ProviderState::Unknown("missing".to_string()));

    let tracks = data
        .get("response")
        .and_then(|r| r.get("sunoData").or_else(|| r.get("data")))
        .and_then(|d| d.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| GeneratedTrack::from_payload(item, JobKind::Music))
                .collect()
        })
        .unwrap_or_default();

    StatusSnapshot {
        provider_task_id: provider_task_id.to_string(),
        state,
        tracks,
        error_message: data
            .get("errorMessage")
            .and_then(|e| e.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from),
        raw: data.clone(),
    }
}

/// Parse the music-video family's status payload
///
/// The video endpoint reports `successFlag` instead of `status` and a
/// single `response.videoUrl` instead of a track array.
fn parse_video_snapshot(provider_task_id: &str, data: &Value) -> StatusSnapshot {
    let state = data
        .get("successFlag")
        .and_then(|s| s.as_str())
        .map(ProviderState::from_wire)
        .unwrap_or_else(|| ProviderState::Unknown("missing".to_string()));

    let tracks = data
        .get("response")
        .map(|r| GeneratedTrack::from_payload(r, JobKind::MusicVideo))
        .filter(|t| t.source_url.is_some())
        .map(|t| vec![t])
        .unwrap_or_default();

    StatusSnapshot {
        provider_task_id: provider_task_id.to_string(),
        state,
        tracks,
        error_message: data
            .get("errorMessage")
            .and_then(|e| e.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from),
        raw: data.clone(),
    }
}
