//! Crash-recoverable persistence
//!
//! Every committed lifecycle transition produces an immutable
//! [`PersistedSnapshot`]. The [`PersistenceGateway`] hands snapshots and
//! history records to a background writer so disk I/O never runs inside the
//! lifecycle's critical section.

pub mod gateway;
pub mod snapshot;
pub mod store;

pub use gateway::PersistenceGateway;
pub use snapshot::{
    HistoryRecord, MatchOutcome, MatchSnapshot, PersistedSnapshot, QueueSnapshot,
    SNAPSHOT_VERSION,
};
pub use store::{FileSnapshotStore, InMemorySnapshotStore, SnapshotStore};
