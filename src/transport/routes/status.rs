use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
};

use crate::{
    common::{errors::ApiError, types::GuildId},
    protocol::SessionStatus,
    server::AppState,
};

/// GET /v1/status
pub async fn get_statuses(State(state): State<Arc<AppState>>) -> Json<Vec<SessionStatus>> {
    tracing::debug!("GET /v1/status");
    Json(state.registry.statuses().await)
}

/// GET /v1/status/{guild_id}
pub async fn get_status(
    Path(guild_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let path = format!("/v1/status/{}", guild_id);
    tracing::debug!("GET {}", path);

    let guild_id = GuildId::from(guild_id);
    let Some(handle) = state.registry.get(&guild_id) else {
        return ApiError::not_found(format!("No session for guild {}", guild_id), path)
            .into_response();
    };

    match handle.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => ApiError::not_found(e.to_string(), path).into_response(),
    }
}
