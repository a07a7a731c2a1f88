use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::debug;

use super::actor::{SessionDeps, SessionHandle, spawn_session};
use crate::{
    audio::VoiceLink,
    common::types::GuildId,
    protocol::{PlayerEvent, SessionStatus},
    stats::StatsHandle,
};

/// Process-wide map of guild sessions. Sessions are created on first use
/// and live until the process exits.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
    deps: SessionDeps,
}

impl SessionRegistry {
    pub fn new(
        voice: Arc<dyn VoiceLink>,
        stats: StatsHandle,
        events: broadcast::Sender<PlayerEvent>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            deps: SessionDeps {
                voice,
                stats,
                events,
            },
        }
    }

    /// Returns the session of `guild_id`, starting it if needed. A session
    /// whose task has ended is replaced.
    pub fn get_or_create(&self, guild_id: &GuildId) -> SessionHandle {
        let mut entry = self
            .sessions
            .entry(guild_id.clone())
            .or_insert_with(|| {
                debug!("[{}] creating session", guild_id);
                spawn_session(guild_id.clone(), self.deps.clone())
            });

        if entry.is_closed() {
            debug!("[{}] replacing closed session", guild_id);
            *entry = spawn_session(guild_id.clone(), self.deps.clone());
        }
        entry.clone()
    }

    pub fn get(&self, guild_id: &GuildId) -> Option<SessionHandle> {
        self.sessions.get(guild_id).map(|h| h.clone())
    }

    /// Handles of every session, cloned out so no map lock is held across
    /// awaits.
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Status of every live session, ordered by guild id. Sessions are
    /// queried concurrently.
    pub async fn statuses(&self) -> Vec<SessionStatus> {
        let handles = self.handles();
        let mut statuses: Vec<SessionStatus> = join_all(handles.iter().map(|h| h.status()))
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect();
        statuses.sort_by(|a, b| a.guild_id.cmp(&b.guild_id));
        statuses
    }

    pub fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.deps.events.subscribe()
    }

    pub fn stats(&self) -> &StatsHandle {
        &self.deps.stats
    }
}
