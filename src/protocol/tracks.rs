use serde::{Deserialize, Serialize};

use crate::common::types::UserId;

/// Opaque locator of decodable audio, produced by the acquisition layer and
/// handed back to the audio output untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaHandle(pub String);

impl MediaHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One playable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub source_url: String,
    pub title: String,
    /// Stable external identifier; key of the per-song statistics.
    pub id: String,
    pub media_handle: MediaHandle,
    pub thumbnail_url: String,
    pub requested_by: UserId,
    /// Unknown for some sources.
    pub duration_seconds: Option<u64>,
}

impl Track {
    /// Duration as float seconds, `None` when unknown or zero.
    pub fn known_duration(&self) -> Option<f64> {
        self.duration_seconds.filter(|d| *d > 0).map(|d| d as f64)
    }
}
