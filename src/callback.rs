//! Inbound callback payload classification
//!
//! The push source sends one JSON object per call with no reliable
//! discriminator field, so payloads are classified by structural
//! signature. Each known shape has its own type guard; guards are
//! evaluated in a fixed priority order and the result is an explicit
//! tagged union, so dispatch downstream is exhaustive and every shape
//! is unit-testable in isolation:
//!
//! 1. derived-asset result (video render: envelope code + nested
//!    `data.task_id` + a `video_url` key)
//! 2. explicit error (`callbackType: "error"`)
//! 3. generation result (correlation id + `callbackType` + track list)
//! 4. bare fallback (anything with an extractable correlation id)
//! 5. unknown (audited and dropped, never an error to the caller)

use crate::types::{GeneratedTrack, JobKind};
use serde_json::Value;

/// Stage marker carried by generation callbacks
///
/// Only `complete` carries final artifacts; `text` and `first` are
/// intermediate progress signals and must not mutate the task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackStage {
    /// Lyrics/text ready
    Text,
    /// First track ready, more to follow
    First,
    /// All tracks ready
    Complete,
    /// A stage this build does not recognize
    Other(String),
}

impl CallbackStage {
    fn from_wire(stage: &str) -> Self {
        match stage {
            "text" => CallbackStage::Text,
            "first" => CallbackStage::First,
            "complete" => CallbackStage::Complete,
            other => CallbackStage::Other(other.to_string()),
        }
    }
}

/// A derived-asset (music video) result callback
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedAssetCallback {
    /// Provider correlation id (nested under `data` in this shape)
    pub provider_task_id: String,
    /// Envelope code; 200 means success
    pub code: i64,
    /// Envelope message, used as the error text on failure
    pub msg: Option<String>,
    /// Rendered video URL; null/absent on failure
    pub video_url: Option<String>,
}

/// An explicit error callback
#[derive(Clone, Debug, PartialEq)]
pub struct FailureCallback {
    /// Provider correlation id
    pub provider_task_id: String,
    /// Best-available error text
    pub error_message: String,
}

/// A generation result callback
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationCallback {
    /// Provider correlation id
    pub provider_task_id: String,
    /// Stage marker
    pub stage: CallbackStage,
    /// Output descriptors (may be empty even on `complete`)
    pub tracks: Vec<GeneratedTrack>,
}

/// Classified inbound callback payload
#[derive(Clone, Debug, PartialEq)]
pub enum CallbackPayload {
    /// Derived-asset (music video) result
    DerivedAsset(DerivedAssetCallback),
    /// Explicit error
    Failure(FailureCallback),
    /// Generation result
    Generation(GenerationCallback),
    /// Correlation id present but shape unclear; treated as a complete
    /// generation result with whatever track data can be extracted
    Bare(GenerationCallback),
    /// No recognizable pattern; audited and dropped
    Unknown,
}

impl CallbackPayload {
    /// Shape name recorded in the notification log
    pub fn detected_type(&self) -> &'static str {
        match self {
            CallbackPayload::DerivedAsset(_) => "derived_asset",
            CallbackPayload::Failure(_) => "error",
            CallbackPayload::Generation(_) => "generation",
            CallbackPayload::Bare(_) => "generation_fallback",
            CallbackPayload::Unknown => "unknown",
        }
    }

    /// Correlation id, when the shape carries one
    pub fn provider_task_id(&self) -> Option<&str> {
        match self {
            CallbackPayload::DerivedAsset(c) => Some(&c.provider_task_id),
            CallbackPayload::Failure(c) => Some(&c.provider_task_id),
            CallbackPayload::Generation(c) | CallbackPayload::Bare(c) => {
                Some(&c.provider_task_id)
            }
            CallbackPayload::Unknown => None,
        }
    }
}

/// Classify a raw payload against the known shapes, in priority order
pub fn classify(raw: &Value) -> CallbackPayload {
    if is_derived_asset(raw) {
        return CallbackPayload::DerivedAsset(parse_derived_asset(raw));
    }
    if is_failure(raw) {
        return CallbackPayload::Failure(parse_failure(raw));
    }
    if is_generation(raw) {
        return CallbackPayload::Generation(parse_generation(raw));
    }
    if let Some(provider_task_id) = extract_provider_task_id(raw) {
        return CallbackPayload::Bare(parse_bare(raw, provider_task_id));
    }
    CallbackPayload::Unknown
}

/// Top-level correlation id under either of its wire spellings
pub fn extract_provider_task_id(raw: &Value) -> Option<String> {
    ["task_id", "taskId"].iter().find_map(|k| {
        raw.get(*k)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
    })
}

/// Guard: envelope code plus nested `data.task_id` plus a `video_url` key
///
/// The `video_url` key merely has to be present; a null value is how the
/// provider reports a failed render in this shape.
fn is_derived_asset(raw: &Value) -> bool {
    raw.get("code").is_some()
        && raw
            .get("data")
            .map(|d| {
                d.get("task_id").and_then(|t| t.as_str()).is_some()
                    && d.get("video_url").is_some()
            })
            .unwrap_or(false)
}

/// Guard: top-level correlation id plus `callbackType: "error"`
fn is_failure(raw: &Value) -> bool {
    extract_provider_task_id(raw).is_some()
        && raw.get("callbackType").and_then(|t| t.as_str()) == Some("error")
}

/// Guard: top-level correlation id plus any `callbackType`
fn is_generation(raw: &Value) -> bool {
    extract_provider_task_id(raw).is_some()
        && raw.get("callbackType").and_then(|t| t.as_str()).is_some()
}

fn parse_derived_asset(raw: &Value) -> DerivedAssetCallback {
    let data = &raw["data"];
    DerivedAssetCallback {
        provider_task_id: data
            .get("task_id")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string(),
        code: raw.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
        msg: raw
            .get("msg")
            .and_then(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from),
        video_url: data
            .get("video_url")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from),
    }
}

fn parse_failure(raw: &Value) -> FailureCallback {
    // Error text preference: first item's errorMessage, then the
    // envelope msg, then a fixed fallback
    let error_message = raw
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|items| items.first())
        .and_then(|item| item.get("errorMessage"))
        .and_then(|e| e.as_str())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            raw.get("msg")
                .and_then(|m| m.as_str())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or("Unknown error")
        .to_string();

    FailureCallback {
        provider_task_id: extract_provider_task_id(raw).unwrap_or_default(),
        error_message,
    }
}

fn parse_generation(raw: &Value) -> GenerationCallback {
    GenerationCallback {
        provider_task_id: extract_provider_task_id(raw).unwrap_or_default(),
        stage: raw
            .get("callbackType")
            .and_then(|t| t.as_str())
            .map(CallbackStage::from_wire)
            .unwrap_or(CallbackStage::Complete),
        tracks: extract_tracks(raw),
    }
}

/// Fallback parse: whatever correlation id and track data can be pulled
/// out of an unclear shape, treated as a complete generation result
fn parse_bare(raw: &Value, provider_task_id: String) -> GenerationCallback {
    GenerationCallback {
        provider_task_id,
        stage: raw
            .get("callbackType")
            .or_else(|| raw.get("type"))
            .and_then(|t| t.as_str())
            .map(CallbackStage::from_wire)
            .unwrap_or(CallbackStage::Complete),
        tracks: extract_tracks(raw),
    }
}

/// Track list from `data` or the legacy `result` field
fn extract_tracks(raw: &Value) -> Vec<GeneratedTrack> {
    raw.get("data")
        .or_else(|| raw.get("result"))
        .and_then(|d| d.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| GeneratedTrack::from_payload(item, JobKind::Music))
                .collect()
        })
        .unwrap_or_default()
}
