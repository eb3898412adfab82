//! Application state for the API server

use crate::{Config, TuneVault};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned per request (cheap Arc clones); provides access to the engine
/// and configuration.
#[derive(Clone)]
pub struct AppState {
    /// The main TuneVault engine instance
    pub engine: Arc<TuneVault>,

    /// Configuration (read access)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(engine: Arc<TuneVault>, config: Arc<Config>) -> Self {
        Self { engine, config }
    }
}
