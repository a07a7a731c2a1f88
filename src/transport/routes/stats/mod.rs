pub mod info;

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
};

pub use info::{get_metrics, get_version};

use crate::{
    common::{errors::ApiError, types::UserId},
    protocol::StatsOverview,
    server::AppState,
};

const TOP_N: usize = 10;

/// GET /v1/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsOverview> {
    tracing::debug!("GET /v1/stats");
    Json(state.registry.stats().read(|s| s.overview(TOP_N)))
}

/// GET /v1/stats/users/{user_id}
pub async fn get_user_stats(
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let path = format!("/v1/stats/users/{}", user_id);
    tracing::debug!("GET {}", path);

    match user_id.parse::<UserId>() {
        Ok(user_id) => Json(state.registry.stats().read(|s| s.user_summary(user_id))).into_response(),
        Err(_) => ApiError::bad_request("User id must be numeric", path).into_response(),
    }
}
