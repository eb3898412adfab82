//! # tunevault
//!
//! Backend library for tracking AI music generation jobs and vaulting
//! their artifacts.
//!
//! ## Design Philosophy
//!
//! tunevault is designed to be:
//! - **Correct under racing notifications** - The push callback and the
//!   pull poll reconcile through one idempotent handler; an atomic
//!   conditional status update decides the race, not wishful ordering
//! - **Durable before visible** - Artifacts are downloaded and linked
//!   into owner-scoped storage before any record references them
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding,
//!   with an optional REST API server
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use tunevault::{TuneVault, Config, types::SubmitRequest, types::JobKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.provider.api_key = Some("provider-key".to_string());
//!     config.provider.callback_url =
//!         Some("https://app.example.com/callbacks/generation".to_string());
//!
//!     let engine = TuneVault::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Submit a generation job; completion arrives via the callback
//!     // endpoint or the deferred poll, whichever notices first
//!     engine
//!         .submit(SubmitRequest {
//!             owner_id: "user-1".to_string(),
//!             kind: JobKind::Music,
//!             title: Some("Summer Jingle".to_string()),
//!             params: serde_json::json!({ "prompt": "upbeat summer jingle" }),
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Inbound callback payload classification
pub mod callback;
/// Failure classification for provider-reported errors
pub mod classifier;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Artifact materialization
pub mod materializer;
/// Generation provider client
pub mod provider;
/// Core reconciliation engine (decomposed into focused submodules)
pub mod reconciler;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Durable artifact storage
pub mod vault;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{ApiError, DatabaseError, Error, ErrorDetail, MaterializeError, ProviderError, Result, ToHttpStatus};
pub use provider::{HttpProviderClient, ProviderClient, ProviderState, StatusSnapshot};
pub use reconciler::{CallbackAck, PollOptions, TuneVault};
pub use types::{
    CompletionOutcome, Event, GeneratedTrack, JobKind, PollReport, Status, StoredArtifact,
    SubmitRequest, TaskId, TaskInfo, VariantInfo, Verdict,
};
pub use vault::ArtifactVault;

/// Helper function to run the engine with graceful signal handling.
///
/// Waits for a termination signal and then calls the engine's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use tunevault::{TuneVault, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let engine = TuneVault::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(engine).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(engine: TuneVault) -> Result<()> {
    wait_for_signal().await;
    engine.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal handlers may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
