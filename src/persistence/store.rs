//! Snapshot storage backends
//!
//! Layout of the file store inside `state_dir`:
//!
//! - `state.json`: queue snapshot, live match snapshot and every player record
//! - `history.jsonl` / `test_history.jsonl`: one closed match per line
//!
//! `state.json` is replaced by writing a temporary file and renaming it, so a
//! crash leaves either the previous commit or the new one, never a mix of the
//! two. Ratings and the match they were applied for always travel together.

use crate::error::{MatchmakingError, Result};
use crate::persistence::snapshot::{HistoryRecord, PersistedSnapshot};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const STATE_FILE: &str = "state.json";
const HISTORY_FILE: &str = "history.jsonl";
const TEST_HISTORY_FILE: &str = "test_history.jsonl";

/// Trait for snapshot and history storage
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot
    async fn save(&self, snapshot: &PersistedSnapshot) -> Result<()>;

    /// Load the stored snapshot, `None` on first start
    async fn load(&self) -> Result<Option<PersistedSnapshot>>;

    /// Append a closed match to the ranked or test history log
    async fn append_history(&self, record: &HistoryRecord) -> Result<()>;

    /// Read back a history log in append order
    async fn load_history(&self, test_mode: bool) -> Result<Vec<HistoryRecord>>;
}

fn io_error(action: &str, path: &Path, error: impl std::fmt::Display) -> MatchmakingError {
    MatchmakingError::PersistenceFailed {
        message: format!("failed to {} {}: {}", action, path.display(), error),
    }
}

/// JSON files in a state directory
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("create", &self.dir, e))
    }

    async fn write_json<T: Serialize + Sync>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let temp = self.dir.join(format!("{}.tmp", name));
        let body = serde_json::to_vec_pretty(value).map_err(|e| io_error("encode", &path, e))?;

        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| io_error("create", &temp, e))?;
        file.write_all(&body)
            .await
            .map_err(|e| io_error("write", &temp, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error("sync", &temp, e))?;
        drop(file);
        fs::rename(&temp, &path)
            .await
            .map_err(|e| io_error("rename", &path, e))?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir.join(name);
        match fs::read(&path).await {
            Ok(body) => serde_json::from_slice(&body)
                .map(Some)
                .map_err(|e| io_error("decode", &path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", &path, e)),
        }
    }

    fn history_path(&self, test_mode: bool) -> PathBuf {
        self.dir.join(if test_mode {
            TEST_HISTORY_FILE
        } else {
            HISTORY_FILE
        })
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        self.ensure_dir().await?;
        self.write_json(STATE_FILE, snapshot).await?;
        debug!(
            "Snapshot revision {} written to {}",
            snapshot.revision(),
            self.dir.display()
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedSnapshot>> {
        self.read_json(STATE_FILE).await
    }

    async fn append_history(&self, record: &HistoryRecord) -> Result<()> {
        self.ensure_dir().await?;
        let path = self.history_path(record.test_mode);
        let mut line = serde_json::to_vec(record).map_err(|e| io_error("encode", &path, e))?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error("open", &path, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| io_error("append to", &path, e))?;
        file.flush()
            .await
            .map_err(|e| io_error("flush", &path, e))?;
        Ok(())
    }

    async fn load_history(&self, test_mode: bool) -> Result<Vec<HistoryRecord>> {
        let path = self.history_path(test_mode);
        let body = match fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("read", &path, e)),
        };
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| io_error("decode", &path, e)))
            .collect()
    }
}

/// In-memory store for tests, with injectable write failures
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshot: Mutex<Option<PersistedSnapshot>>,
    history: Mutex<Vec<HistoryRecord>>,
    failures_remaining: AtomicU32,
    save_count: AtomicU64,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot, as if written by a previous process
    pub fn with_snapshot(snapshot: PersistedSnapshot) -> Self {
        let store = Self::default();
        if let Ok(mut slot) = store.snapshot.lock() {
            *slot = Some(snapshot);
        }
        store
    }

    /// Fail the next `count` save or append calls
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Successful saves so far
    pub fn save_count(&self) -> u64 {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<PersistedSnapshot> {
        self.snapshot.lock().ok().and_then(|slot| slot.clone())
    }

    fn injected_failure(&self) -> Result<()> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(MatchmakingError::PersistenceFailed {
                message: "injected write failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        self.injected_failure()?;
        let mut slot = self
            .snapshot
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("snapshot"))?;
        *slot = Some(snapshot.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedSnapshot>> {
        Ok(self
            .snapshot
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("snapshot"))?
            .clone())
    }

    async fn append_history(&self, record: &HistoryRecord) -> Result<()> {
        self.injected_failure()?;
        self.history
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("history"))?
            .push(record.clone());
        Ok(())
    }

    async fn load_history(&self, test_mode: bool) -> Result<Vec<HistoryRecord>> {
        Ok(self
            .history
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("history"))?
            .iter()
            .filter(|r| r.test_mode == test_mode)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::context::{MatchContext, MatchCounters};
    use crate::persistence::snapshot::{
        MatchOutcome, MatchSnapshot, QueueSnapshot, SNAPSHOT_VERSION,
    };
    use crate::types::{Player, RosterPlayer, TeamLabel};
    use crate::utils::current_timestamp;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("scrim-room-store-{}", uuid::Uuid::new_v4()))
    }

    fn sample(with_match: bool) -> PersistedSnapshot {
        let context = MatchContext::new(
            7,
            false,
            vec![
                RosterPlayer {
                    id: "a".to_string(),
                    mmr: 1500,
                },
                RosterPlayer {
                    id: "b".to_string(),
                    mmr: 1600,
                },
            ],
        );
        PersistedSnapshot {
            queue: QueueSnapshot {
                version: SNAPSHOT_VERSION,
                revision: 3,
                saved_at: current_timestamp(),
                active_match: with_match.then_some(context.match_id),
                entries: Vec::new(),
                counters: MatchCounters { ranked: 7, test: 0 },
            },
            active_match: with_match.then(|| MatchSnapshot {
                version: SNAPSHOT_VERSION,
                revision: 3,
                saved_at: current_timestamp(),
                context,
            }),
            players: vec![Player::new("a".to_string(), "A".to_string(), 1500)],
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = temp_dir();
        let store = FileSnapshotStore::new(&dir);
        assert!(store.load().await.unwrap().is_none());

        let snapshot = sample(true);
        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(snapshot));

        let idle = sample(false);
        store.save(&idle).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(idle));

        // One state file, no leftover temporaries
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec![STATE_FILE.to_string()]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_file_store_history_is_split_by_kind() {
        let dir = temp_dir();
        let store = FileSnapshotStore::new(&dir);
        let context = sample(true).active_match.unwrap().context;

        let ranked = HistoryRecord::from_context(
            &context,
            MatchOutcome::Finalized {
                winner: TeamLabel::A,
            },
            Vec::new(),
        );
        let mut test = ranked.clone();
        test.test_mode = true;

        store.append_history(&ranked).await.unwrap();
        store.append_history(&ranked).await.unwrap();
        store.append_history(&test).await.unwrap();

        assert_eq!(store.load_history(false).await.unwrap().len(), 2);
        assert_eq!(store.load_history(true).await.unwrap(), vec![test]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_in_memory_injected_failures() {
        let store = InMemorySnapshotStore::new();
        store.fail_next(1);
        assert!(store.save(&sample(false)).await.is_err());
        assert!(store.save(&sample(false)).await.is_ok());
        assert_eq!(store.save_count(), 1);
    }
}
