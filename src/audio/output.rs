use async_trait::async_trait;
use serde::Serialize;

use crate::{
    common::types::{ChannelId, GuildId},
    protocol::tracks::MediaHandle,
};

/// Generation number of one audio start. Every `start` gets a fresh id so
/// a late finish notification for an earlier source can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PlayId(pub u64);

impl PlayId {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for PlayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notifications from an output back to its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// The source started under `PlayId` ended, naturally or via `stop`.
    Finished(PlayId),
    /// The voice connection was torn down by the remote side.
    Disconnected,
}

pub type OutputEvents = tokio::sync::mpsc::UnboundedSender<OutputEvent>;

#[derive(Debug, Clone)]
pub struct StartRequest {
    pub play_id: PlayId,
    pub media: MediaHandle,
    pub seek_seconds: f64,
    /// Nominal duration, for outputs that cannot probe the media.
    pub duration_hint: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("failed to connect to voice channel {channel}: {reason}")]
    Connect { channel: ChannelId, reason: String },
    #[error("failed to start {media}: {reason}")]
    Start { media: MediaHandle, reason: String },
    #[error("voice connection lost")]
    Disconnected,
}

/// Establishes voice connections keyed by channel.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    /// Connects to `channel_id`. The returned output reports finish and
    /// disconnect notifications on `events`.
    async fn connect(
        &self,
        guild_id: &GuildId,
        channel_id: ChannelId,
        events: OutputEvents,
    ) -> Result<Box<dyn AudioOutput>, AudioError>;
}

/// A live voice connection able to play one source at a time.
#[async_trait]
pub trait AudioOutput: Send {
    fn channel_id(&self) -> ChannelId;

    async fn move_to(&mut self, channel_id: ChannelId) -> Result<(), AudioError>;

    /// Replaces whatever is playing with `request.media`, seeking first.
    async fn start(&mut self, request: StartRequest) -> Result<(), AudioError>;

    async fn pause(&mut self) -> Result<(), AudioError>;

    async fn resume(&mut self) -> Result<(), AudioError>;

    /// Stops the current source. Reports `Finished` for its play id.
    async fn stop(&mut self) -> Result<(), AudioError>;

    /// Leaves the channel. No further events are reported.
    async fn disconnect(&mut self);
}
