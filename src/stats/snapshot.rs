//! On-disk shape of the listening statistics and the repair step applied
//! when loading it.
//!
//! The file is a plain JSON object:
//!
//! ```json
//! {
//!   "total_songs": 12,
//!   "total_play_time": 3605.0,
//!   "users": { "1234": { "time": 3605.0, "songs": 12 } },
//!   "songs": { "dQw4w9WgXcQ": { "title": "...", "plays": 3, "users": [1234] } }
//! }
//! ```
//!
//! Older or hand-edited files may miss fields, carry the wrong types or
//! list the same listener twice. Loading never fails on such input: every
//! field is coerced to the expected type or replaced by its default.

use std::{fs, io::Write, path::Path};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::StatsError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_songs: u64,
    pub total_play_time: f64,
    pub users: IndexMap<String, UserEntry>,
    pub songs: IndexMap<String, SongEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub time: f64,
    pub songs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongEntry {
    pub title: String,
    pub plays: u64,
    /// Unique listener ids, first-seen order.
    pub users: Vec<u64>,
}

impl StatsSnapshot {
    /// Parses and repairs a snapshot. Only syntactically invalid JSON is an
    /// error; structural problems are fixed up.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(input)?;
        Ok(Self::repair(value))
    }

    /// Coerces an arbitrary JSON value into a valid snapshot.
    pub fn repair(value: Value) -> Self {
        let Value::Object(mut root) = value else {
            warn!("Stats snapshot is not an object, starting empty");
            return Self::default();
        };

        let total_songs = root.get("total_songs").and_then(as_count).unwrap_or(0);
        let total_play_time = root
            .get("total_play_time")
            .and_then(as_seconds)
            .unwrap_or(0.0);

        let users = match root.remove("users") {
            Some(Value::Object(users)) => users
                .into_iter()
                .map(|(uid, entry)| (uid, repair_user(&entry)))
                .collect(),
            Some(_) => {
                warn!("Stats snapshot has malformed \"users\", resetting");
                IndexMap::new()
            }
            None => IndexMap::new(),
        };

        let songs = match root.remove("songs") {
            Some(Value::Object(songs)) => songs
                .into_iter()
                .map(|(id, entry)| (id, repair_song(&entry)))
                .collect(),
            Some(_) => {
                warn!("Stats snapshot has malformed \"songs\", resetting");
                IndexMap::new()
            }
            None => IndexMap::new(),
        };

        Self {
            total_songs,
            total_play_time,
            users,
            songs,
        }
    }

    /// Reads a snapshot from disk. A missing file yields `Ok(None)`.
    pub fn read(path: &Path) -> Result<Option<Self>, StatsError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(Self::from_json(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrites the whole snapshot. Written to a sibling temp file first
    /// and renamed into place, so readers never see a torn file.
    pub fn write(&self, path: &Path) -> Result<(), StatsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn repair_user(entry: &Value) -> UserEntry {
    UserEntry {
        time: entry.get("time").and_then(as_seconds).unwrap_or(0.0),
        songs: entry.get("songs").and_then(as_count).unwrap_or(0),
    }
}

fn repair_song(entry: &Value) -> SongEntry {
    let title = match entry.get("title") {
        Some(Value::String(title)) => title.clone(),
        _ => "Unknown".to_string(),
    };

    let mut users: Vec<u64> = Vec::new();
    if let Some(Value::Array(raw)) = entry.get("users") {
        for uid in raw.iter().filter_map(as_user_id) {
            if !users.contains(&uid) {
                users.push(uid);
            }
        }
    }

    SongEntry {
        title,
        plays: entry.get("plays").and_then(as_count).unwrap_or(0),
        users,
    }
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_seconds(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite() && *f >= 0.0),
        Value::String(s) => s.trim().parse().ok().filter(|f: &f64| f.is_finite() && *f >= 0.0),
        _ => None,
    }
}

/// Listener ids are integers. Floats truncate and numeric strings parse;
/// anything else is dropped.
fn as_user_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_song_users_become_empty() {
        let snapshot = StatsSnapshot::repair(json!({
            "total_songs": 1,
            "total_play_time": 10.5,
            "users": {},
            "songs": { "abc": { "title": "Song", "plays": 1 } }
        }));

        assert_eq!(snapshot.songs["abc"].users, Vec::<u64>::new());
        assert_eq!(snapshot.songs["abc"].plays, 1);
        assert_eq!(snapshot.total_play_time, 10.5);
    }

    #[test]
    fn test_listener_ids_coerced_and_deduplicated() {
        let snapshot = StatsSnapshot::repair(json!({
            "songs": { "abc": { "title": "Song", "plays": 4, "users": [7, "7", 3, 7.0, "x", null, " 3 "] } }
        }));

        assert_eq!(snapshot.songs["abc"].users, vec![7, 3]);
    }

    #[test]
    fn test_malformed_sections_reset() {
        let snapshot = StatsSnapshot::repair(json!({
            "total_songs": "nope",
            "users": [1, 2, 3],
            "songs": "broken"
        }));

        assert_eq!(snapshot, StatsSnapshot::default());
    }

    #[test]
    fn test_non_object_root_is_empty() {
        assert_eq!(StatsSnapshot::repair(json!([1, 2])), StatsSnapshot::default());
    }

    #[test]
    fn test_song_entry_not_an_object() {
        let snapshot = StatsSnapshot::repair(json!({ "songs": { "abc": 5 } }));
        let entry = &snapshot.songs["abc"];
        assert_eq!(entry.title, "Unknown");
        assert_eq!(entry.plays, 0);
        assert!(entry.users.is_empty());
    }

    #[test]
    fn test_key_order_preserved() {
        let snapshot = StatsSnapshot::from_json(
            r#"{"users": {"30": {"time": 1, "songs": 1}, "10": {"time": 2, "songs": 1}, "20": {"time": 3, "songs": 1}}}"#,
        )
        .unwrap();

        let keys: Vec<&str> = snapshot.users.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["30", "10", "20"]);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stats.json");

        let mut snapshot = StatsSnapshot::default();
        snapshot.total_songs = 2;
        snapshot.total_play_time = 12.5;
        snapshot.users.insert("9".into(), UserEntry { time: 12.5, songs: 2 });
        snapshot.songs.insert(
            "v1".into(),
            SongEntry {
                title: "First".into(),
                plays: 2,
                users: vec![9],
            },
        );

        snapshot.write(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(StatsSnapshot::read(&path).unwrap(), Some(snapshot));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(StatsSnapshot::read(&dir.path().join("none.json")).unwrap(), None);
    }
}
