//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`tasks`] — Submission, task CRUD, variants, recovery sweep
//! - [`callback`] — Inbound provider push notifications
//! - [`poll`] — Pull-based reconciliation
//! - [`artifacts`] — Signed artifact retrieval
//! - [`system`] — Health and OpenAPI

mod artifacts;
mod callback;
mod poll;
mod system;
mod tasks;

// Re-export all handlers so `routes::function_name` continues to work
pub use artifacts::*;
pub use callback::*;
pub use poll::*;
pub use system::*;
pub use tasks::*;
