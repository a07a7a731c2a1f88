use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourcesConfig {
    /// Directory holding already-acquired audio files.
    #[serde(default = "default_music_dir")]
    pub music_dir: PathBuf,
    /// Number of matches returned by `search`.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            music_dir: default_music_dir(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_music_dir() -> PathBuf {
    PathBuf::from("music")
}

fn default_search_limit() -> usize {
    5
}
