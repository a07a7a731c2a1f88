mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use common::{Harness, StaticResolver, track};
use serde_json::{Value, json};
use tower::ServiceExt;
use tunedeck::{
    commands::Dispatcher, configs::Config, monitoring::HostMonitor, server::AppState,
    transport::router,
};

const PASSWORD: &str = "changeme";

fn app(h: &Harness) -> Router {
    let host = Arc::new(HostMonitor::new());
    let dispatcher = Arc::new(Dispatcher::new(
        h.registry.clone(),
        Arc::new(StaticResolver::new(vec![
            track("A", Some(100), 0),
            track("B", Some(200), 0),
        ])),
        host.clone(),
        "!",
        5,
    ));
    let state = AppState::new(Config::default(), h.registry.clone(), dispatcher, host).unwrap();
    router(Arc::new(state))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, PASSWORD)
        .body(Body::empty())
        .unwrap()
}

fn command(guild: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/v1/guilds/{}/commands", guild))
        .header(header::AUTHORIZATION, PASSWORD)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_auth_and_version() {
    let h = Harness::new();
    let app = app(&h);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["Tunedeck-Api-Version"], "1");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes, env!("CARGO_PKG_VERSION"));

    let (status, body) = send(
        &app,
        Request::builder().uri("/v1/status").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Missing Authorization header");
    assert_eq!(body["path"], "/v1/status");

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/v1/status")
            .header(header::AUTHORIZATION, "wrong")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, get("/v1/host")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["ram_total"].as_u64().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_commands_drive_status() {
    let h = Harness::new();
    let app = app(&h);

    let (status, body) = send(
        &app,
        command("1", json!({ "user_id": 5, "channel_id": 10, "content": "!play song a" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "▶️ Now Playing");
    assert_eq!(body["description"], "**Song A**\nRequested by <@5>");

    let (status, body) = send(
        &app,
        command("1", json!({ "user_id": 5, "content": "!play song b" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "⚠️ Error");
    assert!(body.get("thumbnail_url").is_none());

    let (status, body) = send(&app, get("/v1/status/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "playing");
    assert_eq!(body["title"], "Song A");
    assert_eq!(body["requested_by"], 5);
    assert_eq!(body["connected"], true);
    assert!(body.get("play_id").is_none());

    let (status, body) = send(&app, get("/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, body) = send(&app, get("/v1/status/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);

    let (status, body) = send(
        &app,
        command("1", json!({ "user_id": 5, "content": "just chatting" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["path"], "/v1/guilds/1/commands");
}

#[tokio::test(start_paused = true)]
async fn test_stats_routes_and_metrics() {
    let h = Harness::new();
    let app = app(&h);
    send(
        &app,
        command("1", json!({ "user_id": 5, "channel_id": 10, "content": "!play song a" })),
    )
    .await;

    let (status, body) = send(&app, get("/v1/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_songs"], 1);
    assert_eq!(body["top_songs"][0]["title"], "Song A");

    let (status, body) = send(&app, get("/v1/stats/users/5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["songs_requested"], 1);
    assert_eq!(body["unique_songs"], 1);

    let (status, _) = send(&app, get("/v1/stats/users/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("tunedeck_sessions 1"), "{}", text);
    assert!(text.contains("tunedeck_playing_sessions 1"), "{}", text);
    assert!(text.contains("tunedeck_songs_played_total 1"), "{}", text);
}
