use prometheus::{Encoder, Gauge, IntGauge, Registry, TextEncoder};

use crate::protocol::{PlaybackState, SessionStatus};

/// Prometheus gauges refreshed from live state on every scrape.
pub struct Metrics {
    registry: Registry,
    sessions: IntGauge,
    playing_sessions: IntGauge,
    songs_played: IntGauge,
    play_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tunedeck".into()), None)?;

        let sessions = IntGauge::new("sessions", "Guild sessions alive")?;
        let playing_sessions = IntGauge::new("playing_sessions", "Sessions currently playing")?;
        let songs_played = IntGauge::new("songs_played_total", "Songs played since stats began")?;
        let play_seconds = Gauge::new("play_seconds_total", "Listening time credited, in seconds")?;

        registry.register(Box::new(sessions.clone()))?;
        registry.register(Box::new(playing_sessions.clone()))?;
        registry.register(Box::new(songs_played.clone()))?;
        registry.register(Box::new(play_seconds.clone()))?;

        Ok(Self {
            registry,
            sessions,
            playing_sessions,
            songs_played,
            play_seconds,
        })
    }

    /// Updates the gauges and renders the text exposition format.
    pub fn render(
        &self,
        statuses: &[SessionStatus],
        songs_played: u64,
        play_seconds: f64,
    ) -> Result<String, prometheus::Error> {
        let playing = statuses
            .iter()
            .filter(|s| s.state == PlaybackState::Playing)
            .count();

        self.sessions.set(statuses.len() as i64);
        self.playing_sessions.set(playing as i64);
        self.songs_played.set(songs_played as i64);
        self.play_seconds.set(play_seconds);

        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
