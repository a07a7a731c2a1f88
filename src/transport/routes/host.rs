use std::sync::Arc;

use axum::{extract::State, response::Json};

use crate::{protocol::HostMetrics, server::AppState};

/// GET /v1/host
pub async fn get_host(State(state): State<Arc<AppState>>) -> Json<HostMetrics> {
    tracing::debug!("GET /v1/host");
    let host = state.host.clone();
    // sysinfo reads procfs and sensors synchronously
    let metrics = tokio::task::spawn_blocking(move || host.snapshot())
        .await
        .unwrap_or_else(|_| state.host.snapshot());
    Json(metrics)
}
