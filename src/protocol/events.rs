use serde::Serialize;

use crate::{
    common::types::GuildId,
    protocol::{status::SessionStatus, tracks::Track},
};

/// Events published by sessions and the ticker on the player event bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    #[serde(rename = "TrackStartEvent")]
    TrackStart { guild_id: GuildId, track: Track },

    #[serde(rename = "TrackEndEvent")]
    TrackEnd {
        guild_id: GuildId,
        track: Track,
        reason: TrackEndReason,
    },

    /// Periodic progress refresh for now-playing displays.
    #[serde(rename = "PlayerUpdateEvent")]
    PlayerUpdate { status: SessionStatus },

    #[serde(rename = "QueueEndEvent")]
    QueueEnd { guild_id: GuildId },

    #[serde(rename = "VoiceDisconnectedEvent")]
    VoiceDisconnected { guild_id: GuildId, resumable: bool },
}

impl PlayerEvent {
    pub fn guild_id(&self) -> &GuildId {
        match self {
            Self::TrackStart { guild_id, .. }
            | Self::TrackEnd { guild_id, .. }
            | Self::QueueEnd { guild_id }
            | Self::VoiceDisconnected { guild_id, .. } => guild_id,
            Self::PlayerUpdate { status } => &status.guild_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    /// The source played to the end.
    Finished,
    /// Skipped or stopped by a command.
    Stopped,
    /// The source could not be started.
    LoadFailed,
    /// The voice output went away mid-track.
    Cleanup,
}
