use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use super::registry::SessionRegistry;
use crate::{
    audio::PlayId,
    common::types::GuildId,
    configs::{AccrualMode, PlayerConfig},
    protocol::{PlaybackState, PlayerEvent, SessionStatus},
    stats::StatsHandle,
};

/// Periodic sampler crediting listening time to requesters and publishing
/// progress updates for every playing session.
pub struct Ticker {
    registry: Arc<SessionRegistry>,
    stats: StatsHandle,
    events: broadcast::Sender<PlayerEvent>,
    period: Duration,
    accrual: AccrualMode,
    /// Last observed `(play generation, progress)` per guild, for
    /// [`AccrualMode::Elapsed`].
    last_seen: HashMap<GuildId, (PlayId, f64)>,
}

impl Ticker {
    pub fn new(
        registry: Arc<SessionRegistry>,
        events: broadcast::Sender<PlayerEvent>,
        config: &PlayerConfig,
    ) -> Self {
        Self {
            stats: registry.stats().clone(),
            registry,
            events,
            period: config.tick_interval(),
            accrual: config.accrual,
            last_seen: HashMap::new(),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!(
            "Ticker started: every {}s, {:?} accrual",
            self.period.as_secs(),
            self.accrual
        );
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// Samples every session once. Returns the number of sessions credited.
    pub async fn tick(&mut self) -> usize {
        let mut credited = 0;
        let mut seen = Vec::new();

        for handle in self.registry.handles() {
            let status = match handle.status().await {
                Ok(status) => status,
                Err(e) => {
                    debug!("Ticker skipped a session: {}", e);
                    continue;
                }
            };

            match status.state {
                PlaybackState::Idle => continue,
                // Keeps its last sample so elapsed accrual resumes from it.
                PlaybackState::Paused => {
                    seen.push(status.guild_id.clone());
                    continue;
                }
                PlaybackState::Playing => {}
            }

            seen.push(status.guild_id.clone());
            let seconds = self.accrued_seconds(&status);
            if let Some(user_id) = status.requested_by {
                if seconds > 0.0 {
                    self.stats.record_play_time(user_id, seconds);
                    credited += 1;
                }
            }

            let _ = self.events.send(PlayerEvent::PlayerUpdate { status });
        }

        self.last_seen.retain(|guild_id, _| seen.contains(guild_id));
        credited
    }

    fn accrued_seconds(&mut self, status: &SessionStatus) -> f64 {
        let period = self.period.as_secs_f64();
        match self.accrual {
            AccrualMode::Fixed => period,
            AccrualMode::Elapsed => {
                let Some(play_id) = status.play_id else {
                    return 0.0;
                };
                let previous = self
                    .last_seen
                    .insert(status.guild_id.clone(), (play_id, status.played_seconds));
                match previous {
                    Some((id, played)) if id == play_id => (status.played_seconds - played).max(0.0),
                    // First sample of this source: only what it played itself,
                    // and at most one period.
                    _ => (status.played_seconds - status.started_from).clamp(0.0, period),
                }
            }
        }
    }
}
