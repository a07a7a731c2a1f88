use serde::{Deserialize, Serialize};

use crate::{
    audio::PlayId,
    common::types::{GuildId, UserId},
};

/// Externally visible state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// Policy governing what the next advance selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepeatMode {
    #[default]
    Off,
    RepeatOne,
    RepeatAll,
}

/// Read-only snapshot of one session, as served to polling clients.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub guild_id: GuildId,
    pub state: PlaybackState,
    pub title: Option<String>,
    pub track_id: Option<String>,
    pub thumbnail_url: Option<String>,
    pub requested_by: Option<UserId>,
    pub played_seconds: f64,
    pub duration_seconds: Option<u64>,
    pub progress_fraction: f64,
    pub repeat_mode: RepeatMode,
    pub queue_length: usize,
    pub connected: bool,
    /// Generation of the running audio source, used to tell restarts apart.
    #[serde(skip)]
    pub play_id: Option<PlayId>,
    /// Position the running source was started at; non-zero after a
    /// rejoin-resume.
    #[serde(skip)]
    pub started_from: f64,
}

impl SessionStatus {
    pub fn idle(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            state: PlaybackState::Idle,
            title: None,
            track_id: None,
            thumbnail_url: None,
            requested_by: None,
            played_seconds: 0.0,
            duration_seconds: None,
            progress_fraction: 0.0,
            repeat_mode: RepeatMode::Off,
            queue_length: 0,
            connected: false,
            play_id: None,
            started_from: 0.0,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }
}
