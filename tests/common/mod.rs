#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tunedeck::{
    audio::ClockVoice,
    common::types::{GuildId, UserId},
    player::{SessionHandle, SessionRegistry},
    protocol::{MediaHandle, PlayerEvent, Track},
    sources::{ResolveError, TrackResolver},
    stats::{StatsHandle, StatsService},
};

pub fn track(id: &str, duration: Option<u64>, requester: u64) -> Track {
    Track {
        source_url: format!("https://music.example/watch?v={}", id),
        title: format!("Song {}", id),
        id: id.to_string(),
        media_handle: media(id),
        thumbnail_url: format!("https://img.example/{}/hq.jpg", id),
        requested_by: UserId(requester),
        duration_seconds: duration,
    }
}

pub fn media(id: &str) -> MediaHandle {
    MediaHandle(format!("/music/{}.mp3", id))
}

pub fn assert_approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {} but got {}",
        expected,
        actual
    );
}

/// Registry wired to an in-process voice output and a throwaway stats file.
pub struct Harness {
    pub voice: ClockVoice,
    pub registry: Arc<SessionRegistry>,
    pub events: broadcast::Sender<PlayerEvent>,
    pub stats_service: StatsService,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let stats_service = StatsService::open(dir.path().join("stats.json"));
        let voice = ClockVoice::new();
        let (events, _) = broadcast::channel(256);
        let registry = Arc::new(SessionRegistry::new(
            Arc::new(voice.clone()),
            stats_service.handle(),
            events.clone(),
        ));

        Self {
            voice,
            registry,
            events,
            stats_service,
            dir,
        }
    }

    pub fn session(&self, guild_id: &str) -> SessionHandle {
        self.registry.get_or_create(&GuildId::from(guild_id))
    }

    pub fn stats(&self) -> StatsHandle {
        self.stats_service.handle()
    }
}

/// Resolver over a fixed catalog, matching ids exactly or titles by
/// case-insensitive substring.
pub struct StaticResolver {
    catalog: Vec<Track>,
}

impl StaticResolver {
    pub fn new(catalog: Vec<Track>) -> Self {
        Self { catalog }
    }

    fn matches(&self, query: &str) -> Vec<Track> {
        let needle = query.to_lowercase();
        self.catalog
            .iter()
            .filter(|t| t.id == query || t.title.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TrackResolver for StaticResolver {
    fn name(&self) -> &str {
        "static"
    }

    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track, ResolveError> {
        let mut track = self
            .matches(query)
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NotFound(query.to_string()))?;
        track.requested_by = requested_by;
        Ok(track)
    }

    async fn search(
        &self,
        query: &str,
        requested_by: UserId,
        limit: usize,
    ) -> Result<Vec<Track>, ResolveError> {
        Ok(self
            .matches(query)
            .into_iter()
            .take(limit)
            .map(|mut t| {
                t.requested_by = requested_by;
                t
            })
            .collect())
    }
}
