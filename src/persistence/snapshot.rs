//! Persisted record shapes
//!
//! The queue snapshot doubles as the commit record: it names the active match
//! by id and revision. All three parts are stored as one unit, and loading
//! still reconciles them so a hand-edited or mixed snapshot resumes Idle
//! instead of replaying a match against ratings from another revision.

use crate::error::{MatchmakingError, Result};
use crate::lifecycle::context::{MatchContext, MatchCounters, SwapRecord};
use crate::rating::RatingDelta;
use crate::types::{
    FormationMode, GameResult, MatchId, Player, PlayerId, QueueEntry, RosterPlayer, Team,
    TeamLabel,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Current on-disk format version
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub version: u32,
    /// Lifecycle revision this snapshot was taken at
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
    /// Id of the match live at this revision, if any
    pub active_match: Option<MatchId>,
    pub entries: Vec<QueueEntry>,
    pub counters: MatchCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub version: u32,
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
    pub context: MatchContext,
}

/// Everything needed to resume after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub queue: QueueSnapshot,
    pub active_match: Option<MatchSnapshot>,
    pub players: Vec<Player>,
}

impl PersistedSnapshot {
    pub fn revision(&self) -> u64 {
        self.queue.revision
    }

    /// Reject snapshots written by a newer format
    pub fn check_version(&self) -> Result<()> {
        let newest = self
            .active_match
            .as_ref()
            .map_or(self.queue.version, |m| m.version.max(self.queue.version));
        if newest > SNAPSHOT_VERSION {
            return Err(MatchmakingError::PersistenceFailed {
                message: format!(
                    "snapshot version {} is newer than supported version {}",
                    newest, SNAPSHOT_VERSION
                ),
            });
        }
        Ok(())
    }

    /// Make the queue and match snapshots agree
    ///
    /// The match snapshot is trusted only when the queue snapshot names it at
    /// the same revision. Queue entries for players in the live roster, and
    /// duplicates, are dropped.
    pub fn reconcile(mut self) -> Self {
        let stored = self.active_match.as_ref().map(|m| m.context.match_id);
        let stored_revision = self.active_match.as_ref().map(|m| m.revision);
        match (self.queue.active_match, stored) {
            (Some(expected), Some(found))
                if found == expected && stored_revision != Some(self.queue.revision) =>
            {
                error!(
                    "Match snapshot {} is at revision {:?} but the queue is at {}, resuming Idle",
                    found, stored_revision, self.queue.revision
                );
                self.active_match = None;
                self.queue.active_match = None;
            }
            (None, Some(stale)) => {
                warn!(
                    "Discarding match snapshot {} not referenced by the queue snapshot",
                    stale
                );
                self.active_match = None;
            }
            (Some(expected), Some(found)) if found != expected => {
                error!(
                    "Match snapshot {} does not match committed match {}, resuming Idle",
                    found, expected
                );
                self.active_match = None;
                self.queue.active_match = None;
            }
            (Some(expected), None) => {
                error!(
                    "Committed match {} has no match snapshot, resuming Idle",
                    expected
                );
                self.queue.active_match = None;
            }
            _ => {}
        }

        let mut seen: Vec<PlayerId> = Vec::new();
        let live: Vec<PlayerId> = self
            .active_match
            .as_ref()
            .map(|m| m.context.roster_ids())
            .unwrap_or_default();
        let before = self.queue.entries.len();
        self.queue.entries.retain(|entry| {
            if live.contains(&entry.player_id) || seen.contains(&entry.player_id) {
                return false;
            }
            seen.push(entry.player_id.clone());
            true
        });
        if self.queue.entries.len() != before {
            warn!(
                "Dropped {} queue entries during reconciliation",
                before - self.queue.entries.len()
            );
        }
        self
    }
}

/// How a match left the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    Finalized { winner: TeamLabel },
    Cancelled,
}

/// Append-only audit record of a closed match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub match_id: MatchId,
    pub match_number: u64,
    pub label: String,
    pub test_mode: bool,
    pub outcome: MatchOutcome,
    pub roster: Vec<RosterPlayer>,
    pub mode: Option<FormationMode>,
    pub team_a: Team,
    pub team_b: Team,
    pub games: Vec<GameResult>,
    pub rating_deltas: Vec<RatingDelta>,
    pub swaps: Vec<SwapRecord>,
    pub started_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Build the record for `context` closing with `outcome`
    pub fn from_context(
        context: &MatchContext,
        outcome: MatchOutcome,
        rating_deltas: Vec<RatingDelta>,
    ) -> Self {
        let (team_a, team_b) = context.current_teams();
        Self {
            match_id: context.match_id,
            match_number: context.match_number,
            label: context.label(),
            test_mode: context.test_mode,
            outcome,
            roster: context.roster.clone(),
            mode: context.mode,
            team_a,
            team_b,
            games: context
                .series
                .as_ref()
                .map(|s| s.games().to_vec())
                .unwrap_or_default(),
            rating_deltas,
            swaps: context.swaps.clone(),
            started_at: context.created_at,
            closed_at: crate::utils::current_timestamp(),
        }
    }
}
