use std::sync::Arc;

use crate::config::Config;
use crate::feedback::analyzer::Analyzer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Feedback pipeline. Holds the model behind `Arc<dyn GenerativeModel>` so tests
    /// can swap in a canned model.
    pub analyzer: Arc<Analyzer>,
    pub config: Config,
}
