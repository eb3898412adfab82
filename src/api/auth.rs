//! Authentication middleware for the REST API
//!
//! Two caller classes share the protected surface:
//! - interactive callers present an API key in the `X-Api-Key` header
//! - trusted internal callers (the deferred timer's out-of-process
//!   equivalent, cron jobs) present the service secret as
//!   `Authorization: Bearer <secret>` together with the marker header
//!   `X-Service-Role: true`
//!
//! Both classes execute identical downstream logic; the middleware only
//! decides admission. When neither credential is configured all
//! requests pass, matching a local development setup.

use crate::vault::constant_time_eq;
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Credentials the middleware checks against
#[derive(Clone, Debug, Default)]
pub struct AuthKeys {
    /// Interactive API key (X-Api-Key header)
    pub api_key: Option<String>,
    /// Shared secret for trusted internal callers
    pub service_secret: Option<String>,
}

impl AuthKeys {
    /// Extract the credential set from API configuration
    pub fn from_config(config: &crate::config::ApiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            service_secret: config.service_secret.clone(),
        }
    }

    /// Whether any credential is configured at all
    pub fn any_configured(&self) -> bool {
        self.api_key.is_some() || self.service_secret.is_some()
    }
}

/// Middleware admitting interactive or trusted-internal callers
pub async fn require_caller(
    State(keys): State<AuthKeys>,
    request: Request,
    next: Next,
) -> Response {
    // No credentials configured: open instance, allow all requests
    if !keys.any_configured() {
        return next.run(request).await;
    }

    if is_interactive_caller(&keys, &request) || is_service_caller(&keys, &request) {
        return next.run(request).await;
    }

    unauthorized_response("Missing or invalid credentials")
}

/// Interactive class: X-Api-Key matches the configured key
fn is_interactive_caller(keys: &AuthKeys, request: &Request) -> bool {
    let Some(expected) = keys.api_key.as_deref() else {
        return false;
    };
    request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|provided| constant_time_eq(provided.as_bytes(), expected.as_bytes()))
}

/// Trusted-internal class: service marker header plus bearer secret
fn is_service_caller(keys: &AuthKeys, request: &Request) -> bool {
    let Some(expected) = keys.service_secret.as_deref() else {
        return false;
    };

    let marker = request
        .headers()
        .get("x-service-role")
        .and_then(|value| value.to_str().ok())
        == Some("true");
    if !marker {
        return false;
    }

    request
        .headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
}

/// 401 response with a JSON error body
fn unauthorized_response(message: &str) -> Response {
    let body = Json(json!({
        "error": {
            "code": "unauthorized",
            "message": message
        }
    }));

    (StatusCode::UNAUTHORIZED, body).into_response()
}
