use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::{
    common::types::GuildId,
    protocol::PlayerEvent,
    server::AppState,
};

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only stream events of this guild.
    pub guild_id: Option<String>,
}

/// GET /v1/events (WebSocket upgrade)
pub async fn events_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<EventsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let filter = query.guild_id.map(GuildId::from);
    let events = state.registry.events();
    ws.on_upgrade(move |socket| stream_events(socket, events, filter))
}

async fn stream_events(
    mut socket: WebSocket,
    mut events: broadcast::Receiver<PlayerEvent>,
    filter: Option<GuildId>,
) {
    info!(
        "Event stream opened{}",
        filter
            .as_ref()
            .map(|g| format!(" for guild {}", g))
            .unwrap_or_default()
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if filter.as_ref().is_some_and(|g| g != event.guild_id()) {
                        continue;
                    }
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to serialize player event: {}", e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Event stream closed");
}
