use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use crate::{
    commands::CommandContext,
    common::{
        errors::ApiError,
        types::{ChannelId, GuildId, UserId},
    },
    server::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub user_id: UserId,
    /// Voice channel the user is in, if any.
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    pub content: String,
}

/// POST /v1/guilds/{guild_id}/commands
pub async fn post_command(
    Path(guild_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CommandRequest>,
) -> Response {
    let path = format!("/v1/guilds/{}/commands", guild_id);
    tracing::debug!("POST {}: {}", path, body.content);

    let ctx = CommandContext {
        guild_id: GuildId::from(guild_id),
        user_id: body.user_id,
        voice_channel: body.channel_id,
    };

    match state.dispatcher.dispatch(&ctx, &body.content).await {
        Some(reply) => Json(reply).into_response(),
        None => ApiError::bad_request(
            format!(
                "Not a command; messages must start with '{}'",
                state.dispatcher.prefix()
            ),
            path,
        )
        .into_response(),
    }
}
