use std::{sync::Arc, time::Instant};

use crate::{
    commands::Dispatcher,
    configs::Config,
    monitoring::{HostMonitor, Metrics},
    player::SessionRegistry,
};

/// Top-level application state shared by every HTTP handler.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub host: Arc<HostMonitor>,
    pub metrics: Metrics,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<Dispatcher>,
        host: Arc<HostMonitor>,
    ) -> Result<Self, prometheus::Error> {
        Ok(Self {
            config,
            registry,
            dispatcher,
            host,
            metrics: Metrics::new()?,
            started_at: Instant::now(),
        })
    }
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
