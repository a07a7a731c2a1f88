use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use tracing::{info, warn};

use super::snapshot::{SongEntry, StatsSnapshot, UserEntry};
use crate::{
    common::types::UserId,
    protocol::{SongRanking, StatsOverview, UserRanking, UserSummary},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserRecord {
    pub time_seconds: f64,
    pub songs_requested: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongRecord {
    pub title: String,
    pub play_count: u64,
    pub listener_ids: IndexSet<UserId>,
}

/// Cumulative listening metrics across every session.
///
/// Maps keep insertion order, which is the tie-breaker of the leaderboards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsStore {
    total_songs_played: u64,
    total_play_seconds: f64,
    users: IndexMap<UserId, UserRecord>,
    songs: IndexMap<String, SongRecord>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the store from `path`. Missing, unreadable or corrupt files
    /// yield an empty store.
    pub fn load(path: &Path) -> Self {
        match StatsSnapshot::read(path) {
            Ok(Some(snapshot)) => {
                let store = Self::from_snapshot(snapshot);
                info!(
                    "Loaded stats from {}: {} songs played, {} users",
                    path.display(),
                    store.total_songs_played,
                    store.users.len()
                );
                store
            }
            Ok(None) => {
                info!("No stats snapshot at {}, starting empty", path.display());
                Self::default()
            }
            Err(e) => {
                warn!(
                    "Failed to load stats snapshot {}: {}. Starting empty",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn from_snapshot(snapshot: StatsSnapshot) -> Self {
        let mut users = IndexMap::with_capacity(snapshot.users.len());
        for (uid, entry) in snapshot.users {
            match uid.parse::<UserId>() {
                Ok(uid) => {
                    users.insert(
                        uid,
                        UserRecord {
                            time_seconds: entry.time,
                            songs_requested: entry.songs,
                        },
                    );
                }
                Err(_) => warn!("Dropping stats for non-numeric user id {:?}", uid),
            }
        }

        let songs = snapshot
            .songs
            .into_iter()
            .map(|(id, entry)| {
                (
                    id,
                    SongRecord {
                        title: entry.title,
                        play_count: entry.plays,
                        listener_ids: entry.users.into_iter().map(UserId).collect(),
                    },
                )
            })
            .collect();

        Self {
            total_songs_played: snapshot.total_songs,
            total_play_seconds: snapshot.total_play_time,
            users,
            songs,
        }
    }

    pub fn to_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_songs: self.total_songs_played,
            total_play_time: self.total_play_seconds,
            users: self
                .users
                .iter()
                .map(|(uid, u)| {
                    (
                        uid.to_string(),
                        UserEntry {
                            time: u.time_seconds,
                            songs: u.songs_requested,
                        },
                    )
                })
                .collect(),
            songs: self
                .songs
                .iter()
                .map(|(id, s)| {
                    (
                        id.clone(),
                        SongEntry {
                            title: s.title.clone(),
                            plays: s.play_count,
                            users: s.listener_ids.iter().map(|u| u.0).collect(),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn record_song_request(&mut self, user_id: UserId) {
        self.users.entry(user_id).or_default().songs_requested += 1;
        self.total_songs_played += 1;
    }

    pub fn record_play_time(&mut self, user_id: UserId, seconds: f64) {
        if !seconds.is_finite() || seconds <= 0.0 {
            return;
        }
        self.users.entry(user_id).or_default().time_seconds += seconds;
        self.total_play_seconds += seconds;
    }

    pub fn record_song_play(&mut self, track_id: &str, title: &str, user_id: UserId) {
        let song = self
            .songs
            .entry(track_id.to_string())
            .or_insert_with(|| SongRecord {
                title: title.to_string(),
                play_count: 0,
                listener_ids: IndexSet::new(),
            });
        song.title = title.to_string();
        song.play_count += 1;
        song.listener_ids.insert(user_id);
    }

    pub fn total_songs_played(&self) -> u64 {
        self.total_songs_played
    }

    pub fn total_play_seconds(&self) -> f64 {
        self.total_play_seconds
    }

    pub fn user(&self, user_id: UserId) -> Option<&UserRecord> {
        self.users.get(&user_id)
    }

    pub fn song(&self, track_id: &str) -> Option<&SongRecord> {
        self.songs.get(track_id)
    }

    /// Number of distinct songs `user_id` has been a listener of.
    pub fn unique_songs_for(&self, user_id: UserId) -> usize {
        self.songs
            .values()
            .filter(|s| s.listener_ids.contains(&user_id))
            .count()
    }

    pub fn user_summary(&self, user_id: UserId) -> UserSummary {
        let record = self.users.get(&user_id).cloned().unwrap_or_default();
        UserSummary {
            user_id,
            time_seconds: record.time_seconds,
            unique_songs: self.unique_songs_for(user_id),
            songs_requested: record.songs_requested,
        }
    }

    pub fn top_users_by_time(&self, n: usize) -> Vec<UserRanking> {
        let mut ranking: Vec<UserRanking> = self
            .users
            .iter()
            .map(|(uid, u)| UserRanking {
                user_id: *uid,
                time_seconds: u.time_seconds,
                songs_requested: u.songs_requested,
            })
            .collect();
        // stable: equal times keep insertion order
        ranking.sort_by(|a, b| b.time_seconds.total_cmp(&a.time_seconds));
        ranking.truncate(n);
        ranking
    }

    pub fn top_songs_by_unique_listeners(&self, n: usize) -> Vec<SongRanking> {
        let mut ranking: Vec<SongRanking> = self
            .songs
            .iter()
            .map(|(id, s)| SongRanking {
                track_id: id.clone(),
                title: s.title.clone(),
                plays: s.play_count,
                unique_listeners: s.listener_ids.len(),
            })
            .collect();
        ranking.sort_by(|a, b| b.unique_listeners.cmp(&a.unique_listeners));
        ranking.truncate(n);
        ranking
    }

    pub fn overview(&self, n: usize) -> StatsOverview {
        StatsOverview {
            total_songs: self.total_songs_played,
            total_play_seconds: self.total_play_seconds,
            top_users: self.top_users_by_time(n),
            top_songs: self.top_songs_by_unique_listeners(n),
        }
    }
}
