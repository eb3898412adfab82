//! OpenAPI documentation and schema generation
//!
//! Compile-time OpenAPI specification for the tunevault REST API via
//! utoipa. Served at `/openapi.json`, browsable at `/swagger-ui` when
//! enabled.

use utoipa::OpenApi;

/// OpenAPI documentation for the tunevault REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "tunevault REST API",
        version = "0.2.0",
        description = "REST API for tracking AI music generation jobs, reconciling provider notifications, and retrieving vaulted artifacts",
        contact(
            name = "tunevault",
            url = "https://github.com/tunevault/tunevault"
        ),
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6710", description = "Local development server")
    ),
    paths(
        // Tasks
        crate::api::routes::submit_task,
        crate::api::routes::list_tasks,
        crate::api::routes::get_task,
        crate::api::routes::list_task_variants,
        crate::api::routes::delete_task,
        crate::api::routes::recover_tasks,

        // Reconciliation
        crate::api::routes::generation_callback,
        crate::api::routes::callback_health,
        crate::api::routes::poll_task,

        // Artifacts
        crate::api::routes::get_artifact,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        crate::types::TaskId,
        crate::types::Status,
        crate::types::JobKind,
        crate::types::Verdict,
        crate::types::TaskInfo,
        crate::types::VariantInfo,
        crate::types::SubmitRequest,
        crate::types::PollReport,
        crate::types::StoredArtifact,
        crate::reconciler::CallbackAck,
        crate::reconciler::PollOptions,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "tasks", description = "Task submission, inspection, and recovery"),
        (name = "callbacks", description = "Inbound provider push notifications"),
        (name = "poll", description = "Pull-based reconciliation"),
        (name = "artifacts", description = "Signed artifact retrieval"),
        (name = "system", description = "Health and documentation"),
    )
)]
pub struct ApiDoc;
