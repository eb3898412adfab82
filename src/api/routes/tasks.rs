//! Task management handlers.

use crate::api::AppState;
use crate::types::{SubmitRequest, TaskId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

/// Query options for the recovery sweep
#[derive(Debug, Deserialize, IntoParams)]
pub struct RecoverQuery {
    /// Minimum task age in seconds before a task is considered stale
    /// (default: 120, the deferred-poll delay)
    pub min_age_secs: Option<u64>,
}

/// POST /tasks - Submit a generation job
#[utoipa::path(
    post,
    path = "/tasks",
    tag = "tasks",
    request_body = SubmitRequest,
    responses(
        (status = 201, description = "Task registered and submitted", body = crate::types::TaskInfo),
        (status = 422, description = "Invalid submission parameters"),
        (status = 502, description = "Provider rejected the submission")
    )
)]
pub async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Response {
    match state.engine.submit(request).await {
        Ok(info) => (StatusCode::CREATED, Json(info)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Submission failed");
            e.into_response()
        }
    }
}

/// GET /tasks - List all tasks
#[utoipa::path(
    get,
    path = "/tasks",
    tag = "tasks",
    responses(
        (status = 200, description = "All tasks, newest first", body = Vec<crate::types::TaskInfo>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_tasks(State(state): State<AppState>) -> Response {
    match state.engine.list_task_infos().await {
        Ok(tasks) => (StatusCode::OK, Json(tasks)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list tasks");
            e.into_response()
        }
    }
}

/// GET /tasks/:id - Get single task
#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = i64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task information", body = crate::types::TaskInfo),
        (status = 404, description = "Task not found")
    )
)]
pub async fn get_task(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.engine.task_info(TaskId(id)).await {
        Ok(Some(info)) => (StatusCode::OK, Json(info)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": "not_found", "message": format!("task {id} not found")}})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, id, "Failed to get task");
            e.into_response()
        }
    }
}

/// GET /tasks/:id/variants - List a task's variants
#[utoipa::path(
    get,
    path = "/tasks/{id}/variants",
    tag = "tasks",
    params(
        ("id" = i64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Variant records", body = Vec<crate::types::VariantInfo>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_task_variants(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.engine.list_variant_infos(TaskId(id)).await {
        Ok(variants) => (StatusCode::OK, Json(variants)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, id, "Failed to list variants");
            e.into_response()
        }
    }
}

/// DELETE /tasks/:id - Delete task and its variants
#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = i64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task deleted"),
        (status = 404, description = "Task not found")
    )
)]
pub async fn delete_task(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.engine.delete_task(TaskId(id)).await {
        Ok(true) => (StatusCode::OK, Json(json!({"deleted": id}))).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": "not_found", "message": format!("task {id} not found")}})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, id, "Failed to delete task");
            e.into_response()
        }
    }
}

/// POST /tasks/recover - Poll every stale active task
///
/// The out-of-band safety net for tasks whose push callback and deferred
/// poll both went missing (process restarts lose armed timers).
#[utoipa::path(
    post,
    path = "/tasks/recover",
    tag = "tasks",
    params(RecoverQuery),
    responses(
        (status = 200, description = "Reports for every swept task", body = Vec<crate::types::PollReport>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn recover_tasks(
    State(state): State<AppState>,
    Query(query): Query<RecoverQuery>,
) -> Response {
    let min_age = std::time::Duration::from_secs(query.min_age_secs.unwrap_or(120));

    match state.engine.recover_stale(min_age).await {
        Ok(reports) => (StatusCode::OK, Json(reports)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Recovery sweep failed");
            e.into_response()
        }
    }
}
