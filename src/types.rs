//! Core types for tunevault

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a generation task
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for i64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for TaskId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<TaskId> for i64 {
    fn eq(&self, other: &TaskId) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for TaskId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Generation task status
///
/// Transitions are monotonic: once a task reaches a terminal state
/// (completed, failed, rejected) it never returns to an active one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created but not yet accepted by the provider
    Pending,
    /// Submitted to the provider, awaiting completion
    Processing,
    /// Artifact stored, terminal
    Completed,
    /// Technical failure, terminal (retrying may succeed)
    Failed,
    /// Content rejected by provider policy, terminal (input must change)
    Rejected,
}

impl Status {
    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Pending,
            1 => Status::Processing,
            2 => Status::Completed,
            3 => Status::Failed,
            4 => Status::Rejected,
            _ => Status::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Pending => 0,
            Status::Processing => 1,
            Status::Completed => 2,
            Status::Failed => 3,
            Status::Rejected => 4,
        }
    }

    /// Whether this status is terminal (no further transitions expected)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Rejected)
    }

    /// Lowercase string form as used in API responses
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job family of a generation task
///
/// All families share one reconciliation code path; this descriptor
/// carries the per-family differences (which payload fields hold the
/// artifact URL, where to store the bytes, the file extension).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Audio track generation (the primary family)
    #[default]
    Music,
    /// Derived music video render keyed off an existing generation
    MusicVideo,
}

impl JobKind {
    /// Convert integer kind code to JobKind enum
    pub fn from_i32(kind: i32) -> Self {
        match kind {
            1 => JobKind::MusicVideo,
            _ => JobKind::Music,
        }
    }

    /// Convert JobKind enum to integer kind code
    pub fn to_i32(&self) -> i32 {
        match self {
            JobKind::Music => 0,
            JobKind::MusicVideo => 1,
        }
    }

    /// Vault namespace segment for artifacts of this family
    pub fn namespace(&self) -> &'static str {
        match self {
            JobKind::Music => "music",
            JobKind::MusicVideo => "music-videos",
        }
    }

    /// File extension for stored artifacts of this family
    pub fn file_extension(&self) -> &'static str {
        match self {
            JobKind::Music => "mp3",
            JobKind::MusicVideo => "mp4",
        }
    }

    /// Payload fields that may carry the artifact source URL, in
    /// lookup order. The provider mixes camelCase and snake_case
    /// between callback and poll payloads.
    pub fn source_url_fields(&self) -> &'static [&'static str] {
        match self {
            JobKind::Music => &["audioUrl", "sourceAudioUrl", "audio_url"],
            JobKind::MusicVideo => &["videoUrl", "video_url"],
        }
    }
}

/// Terminal failure verdict produced by the failure classifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Content/policy violation: resubmitting identical input will not help
    Rejected,
    /// Technical failure: a retry may succeed
    Failed,
}

impl Verdict {
    /// The task status this verdict maps to
    pub fn as_status(&self) -> Status {
        match self {
            Verdict::Rejected => Status::Rejected,
            Verdict::Failed => Status::Failed,
        }
    }
}

/// One generated output variant as described by a provider notification
///
/// Every field except the source URL is advisory; the handler tolerates
/// missing metadata. A missing source URL makes the item fail
/// materialization (skipped, never aborting the batch).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTrack {
    /// Provider's per-output identifier
    pub provider_item_id: Option<String>,
    /// Remote URL of the media bytes on the provider CDN
    pub source_url: Option<String>,
    /// Track title as reported by the provider
    pub title: Option<String>,
    /// Comma-separated style tags
    pub tags: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<f64>,
    /// Cover image URL (not materialized, display hint only)
    pub image_url: Option<String>,
    /// Provider model that produced this output
    pub model_name: Option<String>,
}

impl GeneratedTrack {
    /// Build a descriptor from one raw payload item
    ///
    /// Notification and poll payloads disagree on field casing, so every
    /// lookup runs through an ordered fallback list. Absent fields stay
    /// `None`; a track with no resolvable source URL is still returned
    /// (the materializer reports it as a per-item failure).
    pub fn from_payload(value: &serde_json::Value, kind: JobKind) -> Self {
        let text = |keys: &[&str]| -> Option<String> {
            keys.iter().find_map(|k| {
                value
                    .get(*k)
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            })
        };

        Self {
            provider_item_id: text(&["id"]),
            source_url: text(kind.source_url_fields()),
            title: text(&["title"]),
            tags: text(&["tags"]),
            duration_secs: value.get("duration").and_then(|v| v.as_f64()),
            image_url: text(&["imageUrl", "sourceImageUrl", "image_url"]),
            model_name: text(&["modelName", "model_name"]),
        }
    }
}

/// A materialized artifact: remote origin plus durable vault placement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StoredArtifact {
    /// Remote-origin URL the bytes were fetched from
    pub source_url: String,
    /// Stable vault-relative storage path
    pub storage_path: String,
    /// Time-bounded signed retrieval reference
    pub artifact_url: String,
}

/// A track that survived materialization, paired with its artifact
#[derive(Clone, Debug)]
pub struct MaterializedTrack {
    /// The descriptor the provider sent
    pub track: GeneratedTrack,
    /// Where the bytes now live
    pub artifact: StoredArtifact,
}

/// Outcome of one completion-handler invocation
///
/// The handler is invoked by both notification channels; most variants
/// are deliberate no-ops so that the losing channel leaves no trace.
#[derive(Clone, Debug, PartialEq)]
pub enum CompletionOutcome {
    /// No task record matches the provider task id (orphan/late notification)
    NotFound,
    /// The task was already terminal before any work started
    AlreadyTerminal {
        /// The terminal status observed
        status: Status,
    },
    /// The notification carried no variant descriptors; status left untouched
    StillProcessing,
    /// Task completed; primary artifact written and siblings fanned out
    Completed {
        /// The completed task
        task_id: TaskId,
        /// Descriptors received
        attempted: usize,
        /// Descriptors that materialized
        succeeded: usize,
        /// Variant records created (succeeded minus the primary)
        variants_created: usize,
    },
    /// Every descriptor failed materialization; task marked failed
    Failed {
        /// The failed task
        task_id: TaskId,
        /// Descriptors received
        attempted: usize,
    },
    /// Another channel completed the task between our read and our write
    LostRace,
}

/// Result of one poll-reconciler invocation, returned to the caller
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PollReport {
    /// The provider task id that was polled
    pub provider_task_id: String,
    /// Local task status after reconciliation
    pub status: Status,
    /// Raw coarse state string the provider reported
    pub provider_state: String,
    /// Number of output descriptors the provider returned
    pub track_count: usize,
    /// Human-readable summary of what the poll did
    pub message: String,
}

/// Events emitted by the engine
///
/// Consumers subscribe via [`crate::TuneVault::subscribe`]. Events are
/// advisory; the durable task record is the source of truth.
#[derive(Clone, Debug)]
pub enum Event {
    /// A task was registered and submitted to the provider
    TaskSubmitted {
        /// Local task id
        id: TaskId,
        /// Provider correlation id
        provider_task_id: String,
    },
    /// An inbound notification arrived on the callback endpoint
    CallbackReceived {
        /// Correlation id, when one could be extracted
        provider_task_id: Option<String>,
        /// Detected payload shape name
        detected: String,
    },
    /// A task reached completed
    TaskCompleted {
        /// Local task id
        id: TaskId,
        /// Provider correlation id
        provider_task_id: String,
        /// Number of sibling variant records created
        variant_count: usize,
    },
    /// A task reached failed or rejected
    TaskFailed {
        /// Local task id
        id: TaskId,
        /// Provider correlation id
        provider_task_id: String,
        /// Classifier verdict
        verdict: Verdict,
        /// Provider-supplied or synthesized error message
        error: String,
    },
    /// A variant record was written during fan-out
    VariantStored {
        /// Parent task id
        task_id: TaskId,
        /// 1-based display index of the variant ("(Variant k)")
        index: usize,
    },
}

/// Public view of a task record, as returned by the API
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskInfo {
    /// Local task id
    pub id: TaskId,
    /// Provider correlation id
    pub provider_task_id: String,
    /// Owner this task is scoped to
    pub owner_id: String,
    /// Job family
    pub kind: JobKind,
    /// Display title
    pub title: Option<String>,
    /// Current status
    pub status: Status,
    /// Remote-origin URL of the primary artifact (set iff completed)
    pub source_url: Option<String>,
    /// Vault path of the primary artifact (set iff completed)
    pub storage_path: Option<String>,
    /// Signed retrieval reference for the primary artifact (set iff completed)
    pub artifact_url: Option<String>,
    /// Duration in seconds, when the provider reported one
    pub duration_secs: Option<f64>,
    /// Style tags, when the provider reported them
    pub tags: Option<String>,
    /// Error message for failed/rejected tasks
    pub error_message: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Completion time, once terminal
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskInfo {
    /// Build the public view from a database row
    pub fn from_row(row: &crate::db::Task) -> Self {
        Self {
            id: TaskId(row.id),
            provider_task_id: row.provider_task_id.clone(),
            owner_id: row.owner_id.clone(),
            kind: JobKind::from_i32(row.kind),
            title: row.title.clone(),
            status: Status::from_i32(row.status),
            source_url: row.source_url.clone(),
            storage_path: row.storage_path.clone(),
            artifact_url: row.artifact_url.clone(),
            duration_secs: row.duration_secs,
            tags: row.tags.clone(),
            error_message: row.error_message.clone(),
            created_at: DateTime::from_timestamp(row.created_at, 0).unwrap_or_else(Utc::now),
            completed_at: row
                .completed_at
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        }
    }
}

/// Public view of a variant record, as returned by the API
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VariantInfo {
    /// Variant record id
    pub id: i64,
    /// Parent task id
    pub task_id: TaskId,
    /// Derived display title
    pub title: String,
    /// Remote-origin URL of this variant's artifact
    pub source_url: String,
    /// Vault path of this variant's artifact
    pub storage_path: String,
    /// Signed retrieval reference for this variant's artifact
    pub artifact_url: String,
    /// Duration in seconds, when the provider reported one
    pub duration_secs: Option<f64>,
    /// Style tags, when the provider reported them
    pub tags: Option<String>,
    /// Always completed; variants are born terminal
    pub status: Status,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl VariantInfo {
    /// Build the public view from a database row
    pub fn from_row(row: &crate::db::Variant) -> Self {
        Self {
            id: row.id,
            task_id: TaskId(row.task_id),
            title: row.title.clone(),
            source_url: row.source_url.clone(),
            storage_path: row.storage_path.clone(),
            artifact_url: row.artifact_url.clone(),
            duration_secs: row.duration_secs,
            tags: row.tags.clone(),
            status: Status::from_i32(row.status),
            created_at: DateTime::from_timestamp(row.created_at, 0).unwrap_or_else(Utc::now),
        }
    }
}

/// Request to submit a new generation job
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitRequest {
    /// Owner to scope the task and its artifacts to
    pub owner_id: String,
    /// Job family (defaults to music)
    #[serde(default)]
    pub kind: JobKind,
    /// Display title for the task record
    #[serde(default)]
    pub title: Option<String>,
    /// Opaque generation parameters, forwarded to the provider verbatim
    #[schema(value_type = Object)]
    pub params: serde_json::Value,
}
