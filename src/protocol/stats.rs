use serde::Serialize;

use crate::common::types::UserId;

#[derive(Debug, Clone, Serialize)]
pub struct StatsOverview {
    pub total_songs: u64,
    pub total_play_seconds: f64,
    pub top_users: Vec<UserRanking>,
    pub top_songs: Vec<SongRanking>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRanking {
    pub user_id: UserId,
    pub time_seconds: f64,
    pub songs_requested: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongRanking {
    pub track_id: String,
    pub title: String,
    pub plays: u64,
    pub unique_listeners: usize,
}

/// Per-user view behind the `stats` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub user_id: UserId,
    pub time_seconds: f64,
    pub unique_songs: usize,
    pub songs_requested: u64,
}
