//! REST API server module
//!
//! Exposes the engine over an OpenAPI-documented REST surface: task
//! submission and CRUD, the inbound generation callback, the poll
//! endpoint, the recovery sweep, and signed artifact retrieval.
//!
//! Authentication splits the surface in two:
//! - the callback, health, artifact, and documentation routes are
//!   public — the callback source is external and unauthenticated by
//!   contract, and artifact retrieval carries its own signed token
//! - everything else accepts either an interactive `X-Api-Key` caller
//!   or a trusted internal caller presenting the service secret as a
//!   bearer token plus the `X-Service-Role: true` marker header

use crate::{Config, Result, TuneVault};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Tasks
/// - `POST /tasks` - Submit a generation job
/// - `GET /tasks` - List all tasks
/// - `GET /tasks/:id` - Get single task
/// - `GET /tasks/:id/variants` - List a task's variants
/// - `DELETE /tasks/:id` - Delete task (cascades to variants)
/// - `POST /tasks/recover` - Poll every stale active task
///
/// ## Reconciliation
/// - `POST /callbacks/generation` - Inbound provider push (always 200)
/// - `POST /poll/:provider_task_id` - Poll provider and reconcile
///
/// ## Artifacts
/// - `GET /artifacts/*path` - Retrieve a stored artifact (signed token)
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive documentation (if enabled)
pub fn create_router(engine: Arc<TuneVault>, config: Arc<Config>) -> Router {
    let state = AppState::new(engine, config.clone());

    // Routes behind caller authentication
    let protected = Router::new()
        .route("/tasks", post(routes::submit_task))
        .route("/tasks", get(routes::list_tasks))
        .route("/tasks/recover", post(routes::recover_tasks))
        .route("/tasks/:id", get(routes::get_task))
        .route("/tasks/:id", delete(routes::delete_task))
        .route("/tasks/:id/variants", get(routes::list_task_variants))
        .route("/poll/:provider_task_id", post(routes::poll_task));

    let protected = protected.layer(middleware::from_fn_with_state(
        auth::AuthKeys::from_config(&config.api),
        auth::require_caller,
    ));

    // Public surface: the push source is unauthenticated by contract and
    // artifact links carry their own signed tokens
    let public = Router::new()
        .route("/callbacks/generation", post(routes::generation_callback))
        .route("/callbacks/generation", get(routes::callback_health))
        .route("/artifacts/*path", get(routes::get_artifact))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec));

    let router = protected.merge(public);

    // Merge Swagger UI routes if enabled in config (before applying state)
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state);

    // Apply CORS middleware if enabled in config
    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// Supports "*" for any origin; otherwise only the listed origins are
/// allowed, with all methods and headers.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Creates a TCP listener, binds it, and serves the router until the
/// server is shut down.
///
/// # Example
///
/// ```no_run
/// use tunevault::{TuneVault, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let engine = Arc::new(TuneVault::new((*config).clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// tunevault::api::start_api_server(engine, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(engine: Arc<TuneVault>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;
    let router = create_router(engine, config);

    let listener = TcpListener::bind(bind_address).await.map_err(|e| {
        crate::Error::ApiServerError(format!("failed to bind {}: {}", bind_address, e))
    })?;

    tracing::info!(%bind_address, "API server listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| crate::Error::ApiServerError(format!("server error: {}", e)))?;

    Ok(())
}
