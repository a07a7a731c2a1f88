use async_trait::async_trait;

use crate::{common::types::UserId, protocol::Track};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("No match for '{0}'.")]
    NotFound(String),
    #[error("Could not read audio from {path}: {reason}")]
    Probe { path: String, reason: String },
    #[error("Source I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns user queries into playable tracks.
///
/// Implementations own acquisition: whatever media handle they put in the
/// returned [`Track`] must be playable by the audio output.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Short name used in logs, e.g. "local".
    fn name(&self) -> &str;

    /// Resolves `query` to its best match, attributed to `requested_by`.
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track, ResolveError>;

    /// Up to `limit` matches for `query`, best first.
    async fn search(
        &self,
        query: &str,
        requested_by: UserId,
        limit: usize,
    ) -> Result<Vec<Track>, ResolveError>;
}
