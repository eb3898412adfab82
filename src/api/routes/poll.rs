//! Pull-based reconciliation handlers.

use crate::api::AppState;
use crate::reconciler::PollOptions;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /poll/:provider_task_id - Poll the provider and reconcile
///
/// The pull half of the notification race. Unlike the callback route
/// this one may answer with a real error status: the caller chose to
/// poll and can retry safely. Accepts an optional body with
/// [`PollOptions`]; an absent body uses the defaults (persist failures,
/// task record's own job family).
#[utoipa::path(
    post,
    path = "/poll/{provider_task_id}",
    tag = "poll",
    params(
        ("provider_task_id" = String, Path, description = "Provider correlation id")
    ),
    request_body(content = PollOptions, description = "Poll options", content_type = "application/json"),
    responses(
        (status = 200, description = "Reconciliation report", body = crate::types::PollReport),
        (status = 404, description = "No task record for this correlation id"),
        (status = 502, description = "Provider unreachable or answered with an error")
    )
)]
pub async fn poll_task(
    State(state): State<AppState>,
    Path(provider_task_id): Path<String>,
    body: Option<Json<PollOptions>>,
) -> Response {
    let options = body.map(|Json(options)| options).unwrap_or_default();

    match state.engine.poll_task(&provider_task_id, options).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, %provider_task_id, "Poll failed");
            e.into_response()
        }
    }
}
