use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default)]
    pub accrual: AccrualMode,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Capacity of the player event bus.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// How the ticker credits listening time.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccrualMode {
    /// A constant `tick_interval_secs` per tick while playing.
    #[default]
    Fixed,
    /// The progress actually made since the previous tick.
    Elapsed,
}

impl PlayerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            accrual: AccrualMode::default(),
            command_prefix: default_command_prefix(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    5
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_event_buffer() -> usize {
    256
}
