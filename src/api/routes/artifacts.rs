//! Signed artifact retrieval handlers.

use crate::api::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

/// Signed retrieval token, minted by the vault at materialization time
#[derive(Debug, Deserialize, IntoParams)]
pub struct ArtifactToken {
    /// Unix timestamp after which the reference is invalid
    pub expires: i64,
    /// Hex signature over the path and expiry
    pub sig: String,
}

/// GET /artifacts/*path - Retrieve a stored artifact
///
/// The token is the authorization: no session or API key is involved,
/// which is what lets references be handed to media players directly.
/// Expired or tampered tokens get 403; a valid token for a path that no
/// longer exists gets 404.
#[utoipa::path(
    get,
    path = "/artifacts/{path}",
    tag = "artifacts",
    params(
        ("path" = String, Path, description = "Vault-relative artifact path"),
        ArtifactToken
    ),
    responses(
        (status = 200, description = "Artifact bytes", content_type = "application/octet-stream"),
        (status = 403, description = "Invalid or expired token"),
        (status = 404, description = "No artifact at this path")
    )
)]
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(token): Query<ArtifactToken>,
) -> Response {
    let vault = state.engine.vault();

    if !vault.verify_token(&path, token.expires, &token.sig) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": "invalid_token", "message": "invalid or expired artifact token"}})),
        )
            .into_response();
    }

    match vault.read(&path).await {
        Ok(bytes) => {
            let content_type = match path.rsplit('.').next() {
                Some("mp3") => "audio/mpeg",
                Some("mp4") => "video/mp4",
                _ => "application/octet-stream",
            };
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": "not_found", "message": "no artifact at this path"}})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, %path, "Failed to read artifact");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": {"code": "io_error", "message": "failed to read artifact"}})),
            )
                .into_response()
        }
    }
}
