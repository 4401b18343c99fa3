//! Persistence gateway and background writer
//!
//! `commit` and `archive` only enqueue; a single writer task performs the
//! I/O. Consecutive snapshots are coalesced so only the newest is written,
//! while history records are appended in order. Each write retries with
//! capped exponential backoff. When retries run out the writer logs, marks
//! the gateway degraded and moves on; the next successful write clears it.

use crate::config::PersistenceSettings;
use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::persistence::snapshot::{HistoryRecord, PersistedSnapshot};
use crate::persistence::store::SnapshotStore;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

enum WriterMessage {
    Snapshot(Arc<PersistedSnapshot>),
    History(Box<HistoryRecord>),
    Flush(oneshot::Sender<()>),
}

/// Front door for all persistence I/O
pub struct PersistenceGateway {
    store: Arc<dyn SnapshotStore>,
    sender: mpsc::UnboundedSender<WriterMessage>,
    degraded: Arc<AtomicBool>,
    writer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceGateway {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(
        store: Arc<dyn SnapshotStore>,
        settings: &PersistenceSettings,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let degraded = Arc::new(AtomicBool::new(false));

        let writer = Writer {
            store: store.clone(),
            degraded: degraded.clone(),
            metrics,
            max_attempts: settings.max_retry_attempts.max(1),
            initial_delay: settings.retry_delay(),
            max_delay: settings.max_retry_delay(),
        };
        let handle = tokio::spawn(writer.run(receiver));

        info!(
            "Persistence writer started (max {} attempts, backoff {:?}..{:?})",
            settings.max_retry_attempts,
            settings.retry_delay(),
            settings.max_retry_delay()
        );

        Self {
            store,
            sender,
            degraded,
            writer: std::sync::Mutex::new(Some(handle)),
        }
    }

    /// Queue a snapshot for writing. Never blocks.
    pub fn commit(&self, snapshot: PersistedSnapshot) {
        let revision = snapshot.revision();
        if self
            .sender
            .send(WriterMessage::Snapshot(Arc::new(snapshot)))
            .is_err()
        {
            warn!(
                "Persistence writer is stopped, snapshot revision {} dropped",
                revision
            );
        }
    }

    /// Queue a history record for appending. Never blocks.
    pub fn archive(&self, record: HistoryRecord) {
        let label = record.label.clone();
        if self
            .sender
            .send(WriterMessage::History(Box::new(record)))
            .is_err()
        {
            warn!("Persistence writer is stopped, history for {} dropped", label);
        }
    }

    /// Wait until everything queued so far has been written or abandoned
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.sender
            .send(WriterMessage::Flush(done_tx))
            .map_err(|_| MatchmakingError::PersistenceFailed {
                message: "persistence writer is stopped".to_string(),
            })?;
        done_rx
            .await
            .map_err(|_| MatchmakingError::PersistenceFailed {
                message: "persistence writer exited before flushing".to_string(),
            })
    }

    /// Load and reconcile the stored snapshot
    pub async fn load(&self) -> Result<Option<PersistedSnapshot>> {
        let Some(snapshot) = self.store.load().await? else {
            info!("No stored snapshot, starting fresh");
            return Ok(None);
        };
        snapshot.check_version()?;
        info!(
            "Loaded snapshot revision {} ({} queued, match: {})",
            snapshot.revision(),
            snapshot.queue.entries.len(),
            snapshot.active_match.is_some()
        );
        Ok(Some(snapshot.reconcile()))
    }

    pub async fn history(&self, test_mode: bool) -> Result<Vec<HistoryRecord>> {
        self.store.load_history(test_mode).await
    }

    /// True while the last write was abandoned after exhausting retries
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Flush pending writes and wait for the writer, bounded by `timeout`
    pub async fn shutdown(&self, timeout: Duration) {
        match tokio::time::timeout(timeout, self.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Persistence flush failed during shutdown: {}", e),
            Err(_) => warn!("Persistence flush timed out after {:?}", timeout),
        }
        let handle = self.writer.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            handle.abort();
        }
        info!("Persistence writer stopped");
    }
}

struct Writer {
    store: Arc<dyn SnapshotStore>,
    degraded: Arc<AtomicBool>,
    metrics: Option<Arc<MetricsCollector>>,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl Writer {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<WriterMessage>) {
        while let Some(first) = receiver.recv().await {
            let mut batch = vec![first];
            while let Ok(next) = receiver.try_recv() {
                batch.push(next);
            }

            let mut latest: Option<Arc<PersistedSnapshot>> = None;
            let mut waiters = Vec::new();
            for message in batch {
                match message {
                    WriterMessage::Snapshot(snapshot) => {
                        if let Some(skipped) = latest.replace(snapshot) {
                            debug!("Coalesced snapshot revision {}", skipped.revision());
                        }
                    }
                    WriterMessage::History(record) => {
                        let store = self.store.clone();
                        let record = *record;
                        self.write_with_retry("history", &record.label, || {
                            let store = store.clone();
                            let record = record.clone();
                            async move { store.append_history(&record).await }
                        })
                        .await;
                    }
                    WriterMessage::Flush(done) => waiters.push(done),
                }
            }

            if let Some(snapshot) = latest {
                let store = self.store.clone();
                let what = format!("revision {}", snapshot.revision());
                self.write_with_retry("snapshot", &what, || {
                    let store = store.clone();
                    let snapshot = snapshot.clone();
                    async move { store.save(&snapshot).await }
                })
                .await;
            }

            for done in waiters {
                let _ = done.send(());
            }
        }
        debug!("Persistence writer channel closed");
    }

    async fn write_with_retry<F, Fut>(&self, target: &str, what: &str, mut attempt: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut retry_count = 0;
        let mut delay = self.initial_delay;

        loop {
            let started = Instant::now();
            let result = attempt().await;
            if let Some(metrics) = &self.metrics {
                metrics.record_persistence_write(target, result.is_ok(), started.elapsed());
            }

            match result {
                Ok(()) => {
                    if self.degraded.swap(false, Ordering::SeqCst) {
                        info!("Persistence recovered, {} {} written", target, what);
                        self.set_degraded_metric(false);
                    } else {
                        debug!("Wrote {} {}", target, what);
                    }
                    return;
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count >= self.max_attempts {
                        error!(
                            "Giving up on {} {} after {} attempts: {}",
                            target, what, retry_count, e
                        );
                        self.degraded.store(true, Ordering::SeqCst);
                        self.set_degraded_metric(true);
                        if let Some(metrics) = &self.metrics {
                            metrics.record_persistence_exhausted();
                        }
                        return;
                    }

                    warn!(
                        "Write attempt {} for {} {} failed: {}. Retrying in {:?}",
                        retry_count, target, what, e, delay
                    );
                    sleep(delay).await;
                    delay = (delay * 2).min(self.max_delay);
                }
            }
        }
    }

    fn set_degraded_metric(&self, degraded: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.set_persistence_degraded(degraded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::context::MatchCounters;
    use crate::persistence::snapshot::{QueueSnapshot, SNAPSHOT_VERSION};
    use crate::persistence::store::InMemorySnapshotStore;
    use crate::utils::current_timestamp;

    fn settings(attempts: u32) -> PersistenceSettings {
        PersistenceSettings {
            max_retry_attempts: attempts,
            retry_delay_ms: 1,
            max_retry_delay_ms: 4,
            ..PersistenceSettings::default()
        }
    }

    fn snapshot(revision: u64) -> PersistedSnapshot {
        PersistedSnapshot {
            queue: QueueSnapshot {
                version: SNAPSHOT_VERSION,
                revision,
                saved_at: current_timestamp(),
                active_match: None,
                entries: Vec::new(),
                counters: MatchCounters::default(),
            },
            active_match: None,
            players: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_commit_and_flush() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let gateway = PersistenceGateway::spawn(store.clone(), &settings(3), None);

        gateway.commit(snapshot(1));
        gateway.commit(snapshot(2));
        gateway.flush().await.unwrap();

        assert_eq!(store.current().map(|s| s.revision()), Some(2));
        assert!(!gateway.is_degraded());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let store = Arc::new(InMemorySnapshotStore::new());
        store.fail_next(2);
        let gateway = PersistenceGateway::spawn(store.clone(), &settings(3), None);

        gateway.commit(snapshot(1));
        gateway.flush().await.unwrap();

        assert_eq!(store.save_count(), 1);
        assert!(!gateway.is_degraded());
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade_then_recover() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        store.fail_next(2);
        let gateway = PersistenceGateway::spawn(store.clone(), &settings(2), Some(metrics.clone()));

        gateway.commit(snapshot(1));
        gateway.flush().await.unwrap();
        assert!(gateway.is_degraded());
        assert!(store.current().is_none());
        assert_eq!(metrics.persistence().degraded.get(), 1);

        gateway.commit(snapshot(2));
        gateway.flush().await.unwrap();
        assert!(!gateway.is_degraded());
        assert_eq!(store.current().map(|s| s.revision()), Some(2));
        assert_eq!(metrics.persistence().degraded.get(), 0);
    }

    #[tokio::test]
    async fn test_load_without_snapshot() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let gateway = PersistenceGateway::spawn(store, &settings(1), None);
        assert!(gateway.load().await.unwrap().is_none());
    }
}
