use crate::{audio::AudioError, common::types::GuildId};

/// Failures of session operations.
///
/// Precondition failures leave the session untouched and are meant to be
/// shown to the user who issued the command.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Join a voice channel first.")]
    NotInVoice,
    #[error("Nothing is playing.")]
    NothingPlaying,
    #[error("Playback is already paused.")]
    AlreadyPaused,
    #[error("Nothing to resume.")]
    NothingToResume,
    #[error("No previous track.")]
    NoPreviousTrack,
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("session for guild {0} is closed")]
    SessionClosed(GuildId),
}

impl SessionError {
    /// True for failures caused by the request rather than by a collaborator.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotInVoice
                | Self::NothingPlaying
                | Self::AlreadyPaused
                | Self::NothingToResume
                | Self::NoPreviousTrack
        )
    }
}
