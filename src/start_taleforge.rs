//! Startup helpers for the Taleforge server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::core::config::StoryConfig;
use crate::core::errors::OrchestratorResult;
use crate::llm::OllamaChatBackend;
use crate::server::{self, AppState};

/// Run the server (used by the `taleforge-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Taleforge v{}", env!("CARGO_PKG_VERSION"));

    let config = StoryConfig::from_env();
    let state = match initialize(&config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create state: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    rt.block_on(check_text_backend(&config));

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    };

    if let Err(e) = rt.block_on(server::run_server_with_shutdown(
        state,
        config.server.port,
        shutdown,
    )) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Initialize application state without starting the server.
///
/// # Errors
/// Returns an error if the configuration is invalid or state creation fails.
pub fn initialize(config: &StoryConfig) -> OrchestratorResult<Arc<AppState>> {
    tracing::info!(
        "Ollama endpoint: {} (model {})",
        config.text.base_url,
        config.text.model
    );
    AppState::from_config(config)
}

/// Log whether the text backend answers; the server starts either way.
async fn check_text_backend(config: &StoryConfig) {
    let ready = match OllamaChatBackend::new(&config.text) {
        Ok(backend) => backend.is_ready().await,
        Err(_) => false,
    };
    if ready {
        tracing::info!("Ollama is reachable");
    } else {
        tracing::warn!(
            "Ollama is not reachable at {}; story requests will fail until it is",
            config.text.base_url
        );
    }
}
