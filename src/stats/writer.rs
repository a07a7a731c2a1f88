use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::{StatsError, StatsStore};
use crate::common::types::UserId;

enum WriterMessage {
    /// The in-memory store changed; rewrite the snapshot.
    Persist,
    /// Reply once everything queued before this message is on disk.
    Flush(flume::Sender<Result<(), String>>),
    Shutdown,
}

/// Cheap, cloneable access to the shared stats store.
///
/// Mutations are applied to the in-memory store immediately and then
/// handed to the writer thread, which is the only code that touches the
/// snapshot file. A failed write is logged and retried with the next
/// mutation; it never rolls back the in-memory change.
#[derive(Clone)]
pub struct StatsHandle {
    store: Arc<RwLock<StatsStore>>,
    tx: flume::Sender<WriterMessage>,
}

impl StatsHandle {
    pub fn record_song_request(&self, user_id: UserId) {
        self.store.write().record_song_request(user_id);
        self.persist();
    }

    pub fn record_play_time(&self, user_id: UserId, seconds: f64) {
        self.store.write().record_play_time(user_id, seconds);
        self.persist();
    }

    pub fn record_song_play(&self, track_id: &str, title: &str, user_id: UserId) {
        self.store
            .write()
            .record_song_play(track_id, title, user_id);
        self.persist();
    }

    /// Runs a read-only query against the current store.
    pub fn read<R>(&self, f: impl FnOnce(&StatsStore) -> R) -> R {
        f(&self.store.read())
    }

    /// Waits until every mutation issued so far has been written.
    pub async fn flush(&self) -> Result<(), StatsError> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.tx
            .send(WriterMessage::Flush(reply_tx))
            .map_err(|_| StatsError::WriterGone)?;
        reply_rx
            .recv_async()
            .await
            .map_err(|_| StatsError::WriterGone)?
            .map_err(StatsError::Persist)
    }

    fn persist(&self) {
        if self.tx.send(WriterMessage::Persist).is_err() {
            warn!("Stats writer is gone, change kept in memory only");
        }
    }
}

/// Owns the writer thread behind every [`StatsHandle`].
pub struct StatsService {
    handle: StatsHandle,
    worker: Option<thread::JoinHandle<()>>,
}

impl StatsService {
    /// Loads the snapshot at `path` and starts the writer.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = StatsStore::load(&path);
        Self::start(store, path)
    }

    pub fn start(store: StatsStore, path: PathBuf) -> Self {
        let store = Arc::new(RwLock::new(store));
        let (tx, rx) = flume::unbounded();

        let worker_store = store.clone();
        let worker = thread::Builder::new()
            .name("stats-writer".into())
            .spawn(move || run_writer(worker_store, path, rx));

        let worker = match worker {
            Ok(worker) => Some(worker),
            Err(e) => {
                error!("Failed to start stats writer: {}", e);
                None
            }
        };

        Self {
            handle: StatsHandle { store, tx },
            worker,
        }
    }

    pub fn handle(&self) -> StatsHandle {
        self.handle.clone()
    }

    /// Writes any pending change and stops the writer thread.
    pub fn shutdown(mut self) {
        let _ = self.handle.tx.send(WriterMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Stats writer panicked");
            }
        }
    }
}

fn run_writer(store: Arc<RwLock<StatsStore>>, path: PathBuf, rx: flume::Receiver<WriterMessage>) {
    info!("Stats writer started: {}", path.display());
    let mut dirty = false;

    while let Ok(first) = rx.recv() {
        // Coalesce whatever queued up while the last write was running.
        let mut replies = Vec::new();
        let mut stop = false;
        for msg in std::iter::once(first).chain(rx.try_iter()) {
            match msg {
                WriterMessage::Persist => dirty = true,
                WriterMessage::Flush(reply) => replies.push(reply),
                WriterMessage::Shutdown => stop = true,
            }
        }

        let result = if dirty {
            let written = write_snapshot(&store, &path);
            if written.is_ok() {
                dirty = false;
            }
            written
        } else {
            Ok(())
        };

        if let Err(e) = &result {
            error!("Failed to persist stats to {}: {}", path.display(), e);
        }

        let result = result.map_err(|e| e.to_string());
        for reply in replies {
            let _ = reply.send(result.clone());
        }

        if stop {
            break;
        }
    }

    info!("Stats writer stopped");
}

fn write_snapshot(store: &RwLock<StatsStore>, path: &Path) -> Result<(), StatsError> {
    let snapshot = store.read().to_snapshot();
    snapshot.write(path)?;
    debug!(
        "Stats persisted: {} songs, {:.0}s",
        snapshot.total_songs, snapshot.total_play_time
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mutations_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let service = StatsService::open(&path);
        let stats = service.handle();

        stats.record_song_request(UserId(1));
        stats.record_song_play("v1", "One", UserId(1));
        stats.record_play_time(UserId(1), 5.0);
        stats.flush().await.unwrap();

        let reloaded = StatsStore::load(&path);
        assert_eq!(reloaded.total_songs_played(), 1);
        assert_eq!(reloaded.total_play_seconds(), 5.0);
        assert_eq!(reloaded.unique_songs_for(UserId(1)), 1);

        service.shutdown();
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let service = StatsService::open(&path);

        let mut tasks = Vec::new();
        for guild in 0..8u64 {
            let stats = service.handle();
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    stats.record_play_time(UserId(guild), 5.0);
                    stats.record_song_request(UserId(guild));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        service.handle().flush().await.unwrap();
        let reloaded = StatsStore::load(&path);
        assert_eq!(reloaded.total_songs_played(), 200);
        assert_eq!(reloaded.total_play_seconds(), 1000.0);
        assert_eq!(reloaded.user(UserId(3)).unwrap().songs_requested, 25);

        service.shutdown();
    }

    #[tokio::test]
    async fn test_failed_write_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // parent "directory" is a regular file, so every write fails
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let service = StatsService::open(blocker.join("stats.json"));
        let stats = service.handle();

        stats.record_song_request(UserId(9));
        assert!(stats.flush().await.is_err());
        assert_eq!(stats.read(|s| s.total_songs_played()), 1);

        service.shutdown();
    }

    #[tokio::test]
    async fn test_flush_after_shutdown_reports_writer_gone() {
        let dir = tempfile::tempdir().unwrap();
        let service = StatsService::open(dir.path().join("stats.json"));
        let stats = service.handle();
        service.shutdown();

        assert!(matches!(stats.flush().await, Err(StatsError::WriterGone)));
    }
}
