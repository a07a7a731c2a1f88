use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::{common::errors::ApiError, server::AppState};

/// GET /version
pub async fn get_version() -> String {
    tracing::debug!("GET /version");
    env!("CARGO_PKG_VERSION").to_string()
}

/// GET /metrics
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Response {
    let statuses = state.registry.statuses().await;
    let (songs, seconds) = state
        .registry
        .stats()
        .read(|s| (s.total_songs_played(), s.total_play_seconds()));

    match state.metrics.render(&statuses, songs, seconds) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to render metrics: {}", e);
            ApiError::internal(e.to_string(), "/metrics").into_response()
        }
    }
}
