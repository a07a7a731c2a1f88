use serde::Serialize;

use super::format::{BAR_WIDTH, fmt_mmss, progress_bar};
use crate::protocol::SessionStatus;

/// Message sent back to the channel a command came from. Rendering it is
/// the chat gateway's job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Reply {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            thumbnail_url: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("⚠️ Error", message)
    }

    /// Empty thumbnails are dropped.
    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.thumbnail_url = (!url.is_empty()).then_some(url);
        self
    }

    /// Now-playing panel: title, requester, `mm:ss / mm:ss` and the bar.
    pub fn now_playing(status: &SessionStatus) -> Self {
        let Some(title) = status.title.as_deref() else {
            return Self::new("⏹️ Idle", "Nothing is playing.");
        };

        let requester = status
            .requested_by
            .map(|u| format!("\nRequested by {}", u.mention()))
            .unwrap_or_default();
        let total = status.duration_seconds.unwrap_or(0) as f64;
        let heading = if status.state == crate::protocol::PlaybackState::Paused {
            "⏸️ Paused"
        } else {
            "▶️ Now Playing"
        };

        Self::new(
            heading,
            format!(
                "**{}**{}\n\n`{} / {}`\n{}",
                title,
                requester,
                fmt_mmss(status.played_seconds),
                fmt_mmss(total),
                progress_bar(status.progress_fraction, BAR_WIDTH)
            ),
        )
        .with_thumbnail(status.thumbnail_url.clone().unwrap_or_default())
    }
}
