//! HTTP server for the story API.
//!
//! Provides REST endpoints for:
//! - Story generation with cover image and narration
//! - Session history
//! - PDF export

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::header;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Router with the API routes, CORS and request tracing.
///
/// Cross-origin callers may read `Content-Disposition`, so a browser client
/// can save the PDF export under its suggested name.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION]);

    create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve the story API on `port` until the process stops.
///
/// # Errors
/// Returns an error if the port cannot be bound or the server fails.
pub async fn run_server(
    state: Arc<AppState>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    run_server_with_shutdown(state, port, std::future::pending()).await
}

/// Serve the story API until `shutdown_signal` completes.
///
/// In-flight story requests are allowed to finish; their session locks are
/// released as they complete.
///
/// # Errors
/// Returns an error if the port cannot be bound or the server fails.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    port: u16,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match state.orchestrator.audio_dir() {
        Some(dir) => tracing::info!("Serving narration from {} under /audio", dir.display()),
        None => tracing::info!("Narration disabled; /audio is not mounted"),
    }

    let app = build_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Taleforge server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
