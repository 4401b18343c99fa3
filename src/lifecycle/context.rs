//! The live match aggregate
//!
//! A [`MatchContext`] exists only while a match is in Pregame, Ingame or
//! Postgame; Idle is represented by its absence. Everything in it is plain
//! serializable data so a snapshot restores it exactly.

use crate::accounts::multistream_url;
use crate::rating::PlayerDirectory;
use crate::series::{Series, SeriesStatus};
use crate::teams::{DraftProgress, DraftState};
use crate::types::{
    FormationMode, MatchId, MatchPhase, PlayerId, RosterPlayer, Team, TeamLabel,
    HIDDEN_PLAYER_NAME,
};
use crate::utils::{current_timestamp, generate_match_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last issued match numbers; ranked and test matches count separately
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCounters {
    pub ranked: u64,
    pub test: u64,
}

impl MatchCounters {
    /// Issue the next number for a match of the given kind
    pub fn next(&mut self, test_mode: bool) -> u64 {
        let counter = if test_mode {
            &mut self.test
        } else {
            &mut self.ranked
        };
        *counter += 1;
        *counter
    }
}

/// One exchange of players between the teams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub first: PlayerId,
    pub second: PlayerId,
    pub phase: MatchPhase,
    pub swapped_at: DateTime<Utc>,
}

/// Single mutable aggregate for the live match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchContext {
    pub match_id: MatchId,
    pub match_number: u64,
    pub test_mode: bool,
    pub phase: MatchPhase,
    /// Players and the MMR they had when the match started, in queue order
    pub roster: Vec<RosterPlayer>,
    pub mode: Option<FormationMode>,
    pub team_a: Team,
    pub team_b: Team,
    pub draft: Option<DraftState>,
    pub series: Option<Series>,
    pub swaps: Vec<SwapRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchContext {
    /// New Pregame context with empty teams
    pub fn new(match_number: u64, test_mode: bool, roster: Vec<RosterPlayer>) -> Self {
        let now = current_timestamp();
        Self {
            match_id: generate_match_id(),
            match_number,
            test_mode,
            phase: MatchPhase::Pregame,
            roster,
            mode: None,
            team_a: Team::empty(TeamLabel::A),
            team_b: Team::empty(TeamLabel::B),
            draft: None,
            series: None,
            swaps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// "Series N" for ranked matches, "Test N" for test matches
    pub fn label(&self) -> String {
        if self.test_mode {
            format!("Test {}", self.match_number)
        } else {
            format!("Series {}", self.match_number)
        }
    }

    pub fn roster_ids(&self) -> Vec<PlayerId> {
        self.roster.iter().map(|p| p.id.clone()).collect()
    }

    pub fn in_roster(&self, player_id: &str) -> bool {
        self.roster.iter().any(|p| p.id == player_id)
    }

    pub fn roster_mmr(&self, player_id: &str) -> Option<i64> {
        self.roster
            .iter()
            .find(|p| p.id == player_id)
            .map(|p| p.mmr)
    }

    pub fn team(&self, label: TeamLabel) -> &Team {
        match label {
            TeamLabel::A => &self.team_a,
            TeamLabel::B => &self.team_b,
        }
    }

    /// Teams as currently placed, including a draft in progress
    pub fn current_teams(&self) -> (Team, Team) {
        match &self.draft {
            Some(draft) => (
                draft.team(TeamLabel::A).clone(),
                draft.team(TeamLabel::B).clone(),
            ),
            None => (self.team_a.clone(), self.team_b.clone()),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = current_timestamp();
    }

    /// Externally visible projection of the match
    pub fn summary(&self, directory: &dyn PlayerDirectory) -> MatchSummary {
        let (team_a, team_b) = self.current_teams();
        let view = |team: &Team| TeamView {
            label: team.label,
            captain: team.captain.clone(),
            total_mmr: team
                .players
                .iter()
                .filter_map(|id| self.roster_mmr(id))
                .sum(),
            players: team
                .players
                .iter()
                .map(|id| TeamMemberView {
                    player_id: id.clone(),
                    display_name: directory
                        .lookup(id)
                        .map(|p| p.display_name().to_string())
                        .unwrap_or_else(|| HIDDEN_PLAYER_NAME.to_string()),
                    mmr: self.roster_mmr(id).unwrap_or_default(),
                })
                .collect(),
        };

        let handles: Vec<String> = team_a
            .players
            .iter()
            .chain(team_b.players.iter())
            .filter_map(|id| directory.lookup(id).and_then(|p| p.linked_handle))
            .collect();

        MatchSummary {
            match_id: self.match_id,
            match_number: self.match_number,
            label: self.label(),
            test_mode: self.test_mode,
            phase: self.phase,
            mode: self.mode,
            team_a: view(&team_a),
            team_b: view(&team_b),
            score: self
                .series
                .as_ref()
                .map(|s| s.score())
                .unwrap_or_default(),
            series: self.series.as_ref().map(|s| s.status()),
            draft: self.draft.as_ref().map(|d| d.progress()),
            multistream_url: multistream_url(handles.iter().map(String::as_str)),
        }
    }
}

/// Public view of a team member; hidden players show a placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMemberView {
    pub player_id: PlayerId,
    pub display_name: String,
    pub mmr: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamView {
    pub label: TeamLabel,
    pub captain: Option<PlayerId>,
    pub players: Vec<TeamMemberView>,
    pub total_mmr: i64,
}

/// Public view of the live match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub match_number: u64,
    pub label: String,
    pub test_mode: bool,
    pub phase: MatchPhase,
    pub mode: Option<FormationMode>,
    pub team_a: TeamView,
    pub team_b: TeamView,
    /// (Team A wins, Team B wins)
    pub score: (u32, u32),
    pub series: Option<SeriesStatus>,
    pub draft: Option<DraftProgress>,
    pub multistream_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Player;

    struct NoPlayers;

    impl PlayerDirectory for NoPlayers {
        fn lookup(&self, _player_id: &str) -> Option<Player> {
            None
        }
    }

    fn roster() -> Vec<RosterPlayer> {
        (0..4)
            .map(|i| RosterPlayer {
                id: format!("p{}", i),
                mmr: 1500 + i * 100,
            })
            .collect()
    }

    #[test]
    fn test_counters_are_independent() {
        let mut counters = MatchCounters::default();
        assert_eq!(counters.next(false), 1);
        assert_eq!(counters.next(false), 2);
        assert_eq!(counters.next(true), 1);
        assert_eq!(counters, MatchCounters { ranked: 2, test: 1 });
    }

    #[test]
    fn test_labels() {
        assert_eq!(MatchContext::new(12, false, roster()).label(), "Series 12");
        assert_eq!(MatchContext::new(3, true, roster()).label(), "Test 3");
    }

    #[test]
    fn test_summary_uses_roster_mmr() {
        let mut context = MatchContext::new(1, false, roster());
        context.team_a.players = vec!["p0".to_string(), "p3".to_string()];
        context.team_b.players = vec!["p1".to_string(), "p2".to_string()];

        let summary = context.summary(&NoPlayers);
        assert_eq!(summary.phase, MatchPhase::Pregame);
        assert_eq!(summary.team_a.total_mmr, 1500 + 1800);
        assert_eq!(summary.team_b.total_mmr, 1600 + 1700);
        assert_eq!(summary.team_a.players[0].display_name, HIDDEN_PLAYER_NAME);
        assert_eq!(summary.multistream_url, None);
        assert_eq!(summary.score, (0, 0));
    }
}
