use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StatsConfig {
    /// JSON snapshot rewritten after every mutation.
    #[serde(default = "default_stats_path")]
    pub path: PathBuf,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            path: default_stats_path(),
        }
    }
}

fn default_stats_path() -> PathBuf {
    PathBuf::from("stats.json")
}
