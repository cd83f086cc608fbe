//! HTTP endpoints next to the WebSocket.
//!
//! Stored images are served from here, plus a couple of read models that are
//! handy without a session (status pages, embedding the public game).

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::state::{AppState, SubmissionHealth};
use crate::types::RoundId;
use crate::ws;

/// All routes, with static files from `static/` as fallback
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/health", get(submission_health))
        .route("/api/public-game", get(public_game))
        .route("/images/{id}", get(image))
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicGameResponse {
    pub round_id: RoundId,
}

/// Recent image generation performance.
///
/// GET /api/health
pub async fn submission_health(State(state): State<Arc<AppState>>) -> Json<SubmissionHealth> {
    Json(state.submission_health().await)
}

/// Round currently shown by the public game.
///
/// GET /api/public-game
pub async fn public_game(State(state): State<Arc<AppState>>) -> Response {
    match state.get_public_game().await {
        Ok(round_id) => Json(PublicGameResponse { round_id }).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

/// Raw bytes of a stored image.
///
/// GET /images/{id}
pub async fn image(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.storage.load(&id).await {
        Some(blob) => ([(header::CONTENT_TYPE, blob.content_type)], blob.data).into_response(),
        None => (StatusCode::NOT_FOUND, "Image not found").into_response(),
    }
}
