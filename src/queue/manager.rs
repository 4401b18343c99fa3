//! Queue manager implementation
//!
//! The queue preserves join order, rejects duplicates, and never grows past
//! its capacity. It knows nothing about match phases beyond what callers pass
//! in; the lifecycle decides when a full queue becomes a Pregame.

use crate::error::{MatchmakingError, Result};
use crate::rating::PlayerDirectory;
use crate::types::{MatchPhase, PlayerId, QueueEntry, HIDDEN_PLAYER_NAME};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Result of a successful join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub size: usize,
    pub capacity: usize,
    /// The join filled the queue
    pub queue_full: bool,
}

/// Public view of one queued player. Hidden players show a placeholder name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntryView {
    pub position: usize,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    pub waiting_seconds: i64,
}

/// Public view of the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub size: usize,
    pub capacity: usize,
    pub players_needed: usize,
    pub entries: Vec<QueueEntryView>,
}

/// Ordered queue of waiting players
#[derive(Debug, Clone, PartialEq)]
pub struct QueueManager {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
}

impl QueueManager {
    /// Create an empty queue
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild a queue from persisted entries, keeping at most `capacity`
    pub fn from_entries(capacity: usize, entries: Vec<QueueEntry>) -> Self {
        let mut queue = Self::new(capacity);
        for entry in entries {
            if queue.entries.len() >= capacity {
                break;
            }
            if !queue.contains(&entry.player_id) {
                queue.entries.push_back(entry);
            }
        }
        queue
    }

    /// Add a player to the back of the queue
    ///
    /// `live_roster` holds the players of the match currently in progress,
    /// if any; those players cannot queue again until it ends.
    pub fn join(&mut self, player_id: &str, live_roster: &[PlayerId]) -> Result<JoinOutcome> {
        if self.contains(player_id) {
            return Err(MatchmakingError::AlreadyQueued {
                player_id: player_id.to_string(),
            });
        }
        if live_roster.iter().any(|p| p == player_id) {
            return Err(MatchmakingError::AlreadyInMatch {
                player_id: player_id.to_string(),
            });
        }
        if self.is_full() {
            return Err(MatchmakingError::QueueFull {
                capacity: self.capacity,
            });
        }

        self.entries.push_back(QueueEntry {
            player_id: player_id.to_string(),
            joined_at: current_timestamp(),
        });

        info!(
            "Player '{}' joined the queue ({}/{})",
            player_id,
            self.entries.len(),
            self.capacity
        );

        Ok(JoinOutcome {
            size: self.entries.len(),
            capacity: self.capacity,
            queue_full: self.is_full(),
        })
    }

    /// Remove a player if present. Returns whether anything was removed.
    pub fn leave(&mut self, player_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.player_id != player_id);
        let removed = self.entries.len() != before;

        if removed {
            info!(
                "Player '{}' left the queue ({}/{})",
                player_id,
                self.entries.len(),
                self.capacity
            );
        } else {
            debug!("Leave ignored, player '{}' was not queued", player_id);
        }
        removed
    }

    /// Clear the queue. Not allowed while a match is in Pregame or Ingame.
    pub fn reset(&mut self, phase: MatchPhase) -> Result<usize> {
        if matches!(phase, MatchPhase::Pregame | MatchPhase::Ingame) {
            return Err(MatchmakingError::IllegalTransition {
                current: phase,
                requested: crate::types::LifecycleAction::ResetQueue,
            });
        }
        let cleared = self.entries.len();
        self.entries.clear();
        info!("Queue reset, {} players removed", cleared);
        Ok(cleared)
    }

    /// Take the first `capacity` players out of the queue, in join order
    pub fn drain_roster(&mut self) -> Vec<QueueEntry> {
        let take = self.capacity.min(self.entries.len());
        self.entries.drain(..take).collect()
    }

    /// Remove the given players, used when a roster is formed outside the queue
    pub fn remove_all(&mut self, player_ids: &[PlayerId]) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !player_ids.contains(&entry.player_id));
        before - self.entries.len()
    }

    /// Externally visible projection of the queue
    pub fn status(&self, directory: &dyn PlayerDirectory) -> QueueStatus {
        let now = current_timestamp();
        let entries = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let display_name = directory
                    .lookup(&entry.player_id)
                    .map(|player| player.display_name().to_string())
                    .unwrap_or_else(|| HIDDEN_PLAYER_NAME.to_string());
                QueueEntryView {
                    position: index + 1,
                    display_name,
                    joined_at: entry.joined_at,
                    waiting_seconds: (now - entry.joined_at).num_seconds().max(0),
                }
            })
            .collect();

        QueueStatus {
            size: self.entries.len(),
            capacity: self.capacity,
            players_needed: self.capacity.saturating_sub(self.entries.len()),
            entries,
        }
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.entries.iter().any(|entry| entry.player_id == player_id)
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue entries in join order
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.entries.iter().cloned().collect()
    }
}
