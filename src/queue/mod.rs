//! Shared player queue
//!
//! Holds waiting players in join order and signals when enough players have
//! joined to form two teams.

pub mod manager;

pub use manager::{JoinOutcome, QueueEntryView, QueueManager, QueueStatus};
