//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::core::config::StoryConfig;
use crate::core::errors::OrchestratorResult;
use crate::orchestrator::StoryOrchestrator;

/// Shared application state.
pub struct AppState {
    /// The story pipeline.
    pub orchestrator: StoryOrchestrator,
}

impl AppState {
    /// Wrap an already built orchestrator.
    #[must_use]
    pub fn new(orchestrator: StoryOrchestrator) -> Arc<Self> {
        Arc::new(Self { orchestrator })
    }

    /// Build the default pipeline from `config`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the text backend
    /// cannot be created.
    pub fn from_config(config: &StoryConfig) -> OrchestratorResult<Arc<Self>> {
        Ok(Self::new(StoryOrchestrator::from_config(config)?))
    }
}
