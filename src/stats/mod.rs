pub mod snapshot;
pub mod store;
pub mod writer;

pub use snapshot::StatsSnapshot;
pub use store::{SongRecord, StatsStore, UserRecord};
pub use writer::{StatsHandle, StatsService};

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("stats snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stats snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stats writer is not running")]
    WriterGone,
    #[error("stats snapshot write failed: {0}")]
    Persist(String),
}
