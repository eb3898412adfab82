//! Inbound provider callback handlers.

use crate::api::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::{Value, json};

/// POST /callbacks/generation - Inbound provider push notification
///
/// Always answers 200 with `{status, task_id, processed}` whatever
/// happened internally. The push source treats any non-success answer as
/// an invitation to retry-storm; failures on this path are retried
/// internally and otherwise left for the deferred poll to reconcile.
/// A body that is not a JSON object is audited and dropped like any
/// other unrecognized shape.
#[utoipa::path(
    post,
    path = "/callbacks/generation",
    tag = "callbacks",
    responses(
        (status = 200, description = "Notification acknowledged (always)", body = crate::reconciler::CallbackAck)
    )
)]
pub async fn generation_callback(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let raw = body.map(|Json(value)| value).unwrap_or(Value::Null);
    let ack = state.engine.handle_callback(raw).await;
    (StatusCode::OK, Json(ack))
}

/// GET /callbacks/generation - Callback endpoint health probe
///
/// Lets the provider (and deploy tooling) verify the callback URL is
/// reachable without sending a notification.
#[utoipa::path(
    get,
    path = "/callbacks/generation",
    tag = "callbacks",
    responses(
        (status = 200, description = "Callback endpoint is reachable")
    )
)]
pub async fn callback_health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "endpoint": "generation-callback"
    }))
}
