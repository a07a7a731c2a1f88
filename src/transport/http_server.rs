use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    server::AppState,
    transport::{
        middleware::{add_response_headers, check_auth},
        routes::{commands, host, stats, status},
        websocket_server::events_handler,
    },
};

const API_V1: &str = "/v1";

pub fn router(state: Arc<AppState>) -> Router {
    let v1_routes = Router::new()
        .route("/status", get(status::get_statuses))
        .route("/status/{guild_id}", get(status::get_status))
        .route("/host", get(host::get_host))
        .route("/stats", get(stats::get_stats))
        .route("/stats/users/{user_id}", get(stats::get_user_stats))
        .route("/guilds/{guild_id}/commands", post(commands::post_command))
        .route("/events", get(events_handler));

    let protected = Router::new()
        .nest(API_V1, v1_routes)
        .route("/metrics", get(stats::get_metrics))
        .layer(middleware::from_fn_with_state(state.clone(), check_auth));

    Router::new()
        .merge(protected)
        .route("/version", get(stats::get_version))
        .layer(middleware::from_fn(add_response_headers))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
