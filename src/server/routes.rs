//! HTTP route handlers for the story API.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use crate::conversation::Turn;
use crate::core::errors::{GenerationError, StoryError};
use crate::core::ids::SessionId;
use crate::export::PDF_MIME;

use super::state::AppState;

/// Header carrying the caller's session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let audio_dir = state.orchestrator.audio_dir().map(FsPath::to_path_buf);

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/api/story", post(generate_story))
        .route("/api/story/pdf", post(export_pdf))
        .route("/api/story/{session_id}/history", get(session_history));

    let router = match audio_dir {
        Some(dir) => router.nest_service("/audio", ServeDir::new(dir)),
        None => router,
    };

    router.with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "taleforge",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Story generation request.
#[derive(Debug, Deserialize)]
pub struct StoryRequest {
    /// Session to continue; falls back to the session header, then a new id.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// The user's prompt.
    pub prompt: String,
}

/// Story generation response.
#[derive(Debug, Serialize)]
pub struct StoryResponse {
    /// Session the story was added to.
    pub session_id: SessionId,
    /// Generated story text.
    pub story: String,
    /// Cover image source (URL or `data:` URL).
    pub image: Option<String>,
    /// URL of the narration under `/audio`.
    pub audio: Option<String>,
}

/// Handle story generation requests.
async fn generate_story(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<StoryRequest>,
) -> Result<Json<StoryResponse>, (StatusCode, String)> {
    let session_id = request
        .session_id
        .or_else(|| session_from_headers(&headers))
        .unwrap_or_else(SessionId::new);

    let result = state
        .orchestrator
        .generate(session_id, &request.prompt)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(StoryResponse {
        session_id,
        story: result.text,
        image: result.image.map(|image| image.to_src()),
        audio: result.audio.map(|audio| format!("/audio/{}", audio.file_name)),
    }))
}

/// Session history response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// The session.
    pub session_id: SessionId,
    /// Stored turns, oldest first.
    pub turns: Vec<Turn>,
}

/// Return the stored turns of a session.
async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        session_id,
        turns: state.orchestrator.store().history(session_id),
    })
}

/// PDF export request.
#[derive(Debug, Deserialize)]
pub struct PdfRequest {
    /// Text to render.
    pub story: String,
}

/// Render the posted story as a downloadable PDF.
async fn export_pdf(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PdfRequest>,
) -> Result<Response, (StatusCode, String)> {
    let bytes = state
        .orchestrator
        .export(&request.story)
        .map_err(|e| error_response(&e))?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        state.orchestrator.exporter().file_name()
    );
    Ok((
        [
            (header::CONTENT_TYPE, PDF_MIME.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn error_response(err: &StoryError) -> (StatusCode, String) {
    let status = match err {
        StoryError::Generation(GenerationError::EmptyPrompt) => StatusCode::BAD_REQUEST,
        StoryError::Generation(_) => StatusCode::BAD_GATEWAY,
        StoryError::Export(_) | StoryError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!("Request failed ({status}): {err}");
    (status, err.to_string())
}
