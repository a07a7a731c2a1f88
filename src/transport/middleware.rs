use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{common::errors::ApiError, server::AppState};

pub async fn check_auth(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(auth) if auth == state.config.server.password => next.run(req).await,
        Some(_) => {
            warn!("REST Authorization failed: Invalid password");
            ApiError::unauthorized("Invalid password", req.uri().path()).into_response()
        }
        None => {
            warn!("REST Authorization failed: Missing Authorization header");
            ApiError::unauthorized("Missing Authorization header", req.uri().path())
                .into_response()
        }
    }
}

pub async fn add_response_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Tunedeck-Api-Version", HeaderValue::from_static("1"));
    response
}
