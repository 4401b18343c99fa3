//! Team formation engine
//!
//! This module turns a roster into two teams. Balanced MMR uses a snake
//! assignment followed by single-swap improvement; captains draft and players
//! pick take their decisions from the caller and only validate them.

use crate::error::{MatchmakingError, Result};
use crate::teams::draft::DraftState;
use crate::types::{FormationMode, PlayerId, RosterPlayer, Team, TeamLabel};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// How the caller wants teams formed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormationRequest {
    /// Minimise the MMR sum difference
    Balanced,
    /// Run a whole draft: captain A takes `picks[0]`, captain B `picks[1]`, ...
    CaptainsDraft {
        captains: Option<(PlayerId, PlayerId)>,
        picks: Vec<PlayerId>,
    },
    /// Use exactly this split
    PlayersPick {
        team_a: Vec<PlayerId>,
        team_b: Vec<PlayerId>,
    },
}

impl FormationRequest {
    pub fn mode(&self) -> FormationMode {
        match self {
            FormationRequest::Balanced => FormationMode::BalancedMmr,
            FormationRequest::CaptainsDraft { .. } => FormationMode::CaptainsDraft,
            FormationRequest::PlayersPick { .. } => FormationMode::PlayersPick,
        }
    }
}

/// Sum of the roster MMR of a team's players
pub fn team_mmr(team: &Team, roster: &[RosterPlayer]) -> i64 {
    team.players
        .iter()
        .filter_map(|id| roster.iter().find(|p| &p.id == id))
        .map(|p| p.mmr)
        .sum()
}

/// Exchange `first` and `second` between two teams
pub(crate) fn swap_between(
    team_a: &mut Team,
    team_b: &mut Team,
    first: &str,
    second: &str,
) -> Result<()> {
    let locate = |player: &str, a: &Team, b: &Team| -> Result<TeamLabel> {
        if a.contains(player) {
            Ok(TeamLabel::A)
        } else if b.contains(player) {
            Ok(TeamLabel::B)
        } else {
            Err(MatchmakingError::NotInMatch {
                player_id: player.to_string(),
            })
        }
    };
    let first_side = locate(first, team_a, team_b)?;
    let second_side = locate(second, team_a, team_b)?;
    if first_side == second_side {
        return Err(MatchmakingError::InvalidSwap {
            reason: format!("{} and {} are on the same team", first, second),
        });
    }

    let (from_a, from_b) = if first_side == TeamLabel::A {
        (first, second)
    } else {
        (second, first)
    };
    for slot in team_a.players.iter_mut().filter(|p| p.as_str() == from_a) {
        *slot = from_b.to_string();
    }
    for slot in team_b.players.iter_mut().filter(|p| p.as_str() == from_b) {
        *slot = from_a.to_string();
    }
    if team_a.captain.as_deref() == Some(from_a) {
        team_a.captain = Some(from_b.to_string());
    }
    if team_b.captain.as_deref() == Some(from_b) {
        team_b.captain = Some(from_a.to_string());
    }
    Ok(())
}

/// Produces two equal teams from a roster
#[derive(Debug, Clone)]
pub struct TeamFormationEngine {
    team_size: usize,
}

impl TeamFormationEngine {
    pub fn new(team_size: usize) -> Self {
        Self { team_size }
    }

    pub fn team_size(&self) -> usize {
        self.team_size
    }

    /// Form teams according to `request`
    pub fn form(&self, roster: &[RosterPlayer], request: &FormationRequest) -> Result<(Team, Team)> {
        let teams = match request {
            FormationRequest::Balanced => self.balanced(roster)?,
            FormationRequest::CaptainsDraft { captains, picks } => {
                self.captains_draft(roster, captains.clone(), picks)?
            }
            FormationRequest::PlayersPick { team_a, team_b } => {
                self.players_pick(roster, team_a, team_b)?
            }
        };

        info!(
            "Teams formed by {} - A: {} MMR, B: {} MMR",
            request.mode(),
            team_mmr(&teams.0, roster),
            team_mmr(&teams.1, roster)
        );
        Ok(teams)
    }

    /// Roster must hold exactly two teams' worth of distinct players
    pub fn check_roster(&self, roster: &[RosterPlayer]) -> Result<()> {
        let expected = self.team_size * 2;
        if roster.len() != expected {
            return Err(MatchmakingError::InvalidRosterSize {
                expected,
                actual: roster.len(),
            });
        }
        let unique: HashSet<&PlayerId> = roster.iter().map(|p| &p.id).collect();
        if unique.len() != roster.len() {
            return Err(MatchmakingError::InvalidPartition {
                reason: "roster contains the same player twice".to_string(),
            });
        }
        Ok(())
    }

    /// Snake assignment by descending MMR (A, B, B, A, A, B, B, A, ...), then
    /// repeatedly apply the single cross-team swap that most reduces the sum
    /// difference until no swap helps. Equal MMR keeps queue order.
    pub fn balanced(&self, roster: &[RosterPlayer]) -> Result<(Team, Team)> {
        self.check_roster(roster)?;

        let mut ranked: Vec<&RosterPlayer> = roster.iter().collect();
        ranked.sort_by(|x, y| y.mmr.cmp(&x.mmr));

        let mut side_a: Vec<&RosterPlayer> = Vec::with_capacity(self.team_size);
        let mut side_b: Vec<&RosterPlayer> = Vec::with_capacity(self.team_size);
        for (rank, player) in ranked.into_iter().enumerate() {
            let round_is_even = (rank / 2) % 2 == 0;
            let first_of_pair = rank % 2 == 0;
            if round_is_even == first_of_pair {
                side_a.push(player);
            } else {
                side_b.push(player);
            }
        }

        let sum = |side: &[&RosterPlayer]| side.iter().map(|p| p.mmr).sum::<i64>();
        loop {
            let sum_a = sum(&side_a);
            let sum_b = sum(&side_b);
            let mut best_diff = (sum_a - sum_b).abs();
            let mut best_swap = None;

            for (i, a) in side_a.iter().enumerate() {
                for (j, b) in side_b.iter().enumerate() {
                    let diff = ((sum_a - a.mmr + b.mmr) - (sum_b - b.mmr + a.mmr)).abs();
                    if diff < best_diff {
                        best_diff = diff;
                        best_swap = Some((i, j));
                    }
                }
            }

            match best_swap {
                Some((i, j)) => {
                    debug!(
                        "Balancing swap '{}' <-> '{}', difference now {}",
                        side_a[i].id, side_b[j].id, best_diff
                    );
                    std::mem::swap(&mut side_a[i], &mut side_b[j]);
                }
                None => break,
            }
        }

        // Present each team strongest first; stable so ties keep queue order
        side_a.sort_by(|x, y| y.mmr.cmp(&x.mmr));
        side_b.sort_by(|x, y| y.mmr.cmp(&x.mmr));

        let to_team = |label, side: Vec<&RosterPlayer>| Team {
            label,
            players: side.into_iter().map(|p| p.id.clone()).collect(),
            captain: None,
        };
        Ok((to_team(TeamLabel::A, side_a), to_team(TeamLabel::B, side_b)))
    }

    /// Run a complete captains draft from an ordered pick list
    pub fn captains_draft(
        &self,
        roster: &[RosterPlayer],
        captains: Option<(PlayerId, PlayerId)>,
        picks: &[PlayerId],
    ) -> Result<(Team, Team)> {
        self.check_roster(roster)?;

        let mut draft = DraftState::new(roster, captains)?;
        for player in picks {
            let captain = draft
                .next_picker()
                .cloned()
                .ok_or_else(|| MatchmakingError::InvalidPick {
                    reason: "more picks than players in the pool".to_string(),
                })?;
            draft.pick(&captain, player)?;
        }
        draft.into_teams()
    }

    /// Accept a caller-supplied split if it partitions the roster into equal halves
    pub fn players_pick(
        &self,
        roster: &[RosterPlayer],
        team_a: &[PlayerId],
        team_b: &[PlayerId],
    ) -> Result<(Team, Team)> {
        self.check_roster(roster)?;

        if team_a.len() != self.team_size || team_b.len() != self.team_size {
            return Err(MatchmakingError::InvalidPartition {
                reason: format!(
                    "teams must have {} players each, got {} and {}",
                    self.team_size,
                    team_a.len(),
                    team_b.len()
                ),
            });
        }

        let roster_ids: HashSet<&PlayerId> = roster.iter().map(|p| &p.id).collect();
        let mut seen = HashSet::new();
        for player in team_a.iter().chain(team_b.iter()) {
            if !roster_ids.contains(player) {
                return Err(MatchmakingError::InvalidPartition {
                    reason: format!("{} is not in the roster", player),
                });
            }
            if !seen.insert(player) {
                return Err(MatchmakingError::InvalidPartition {
                    reason: format!("{} is assigned twice", player),
                });
            }
        }

        Ok((
            Team {
                label: TeamLabel::A,
                players: team_a.to_vec(),
                captain: None,
            },
            Team {
                label: TeamLabel::B,
                players: team_b.to_vec(),
                captain: None,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(mmrs: &[i64]) -> Vec<RosterPlayer> {
        mmrs.iter()
            .enumerate()
            .map(|(i, mmr)| RosterPlayer {
                id: format!("p{}", i),
                mmr: *mmr,
            })
            .collect()
    }

    fn mmrs_of(team: &Team, roster: &[RosterPlayer]) -> Vec<i64> {
        team.players
            .iter()
            .map(|id| roster.iter().find(|p| &p.id == id).unwrap().mmr)
            .collect()
    }

    #[test]
    fn test_balanced_reference_roster() {
        let players = roster(&[2000, 1900, 1800, 1700, 1600, 1500, 1400, 1300]);
        let engine = TeamFormationEngine::new(4);
        let (a, b) = engine.balanced(&players).unwrap();

        assert_eq!(mmrs_of(&a, &players), vec![2000, 1700, 1600, 1300]);
        assert_eq!(mmrs_of(&b, &players), vec![1900, 1800, 1500, 1400]);
        assert_eq!(team_mmr(&a, &players), 6600);
        assert_eq!(team_mmr(&b, &players), 6600);
    }

    #[test]
    fn test_balanced_improves_on_snake() {
        // Snake alone gives A = 100+10+10+0, B = 90+80+10+10 (difference 70)
        let players = roster(&[100, 90, 80, 10, 10, 10, 10, 0]);
        let engine = TeamFormationEngine::new(4);
        let (a, b) = engine.balanced(&players).unwrap();
        let diff = (team_mmr(&a, &players) - team_mmr(&b, &players)).abs();
        assert_eq!(diff, 50);
        assert_eq!(a.len(), 4);
        assert_eq!(b.len(), 4);
    }

    #[test]
    fn test_balanced_is_deterministic() {
        let players = roster(&[1510, 1490, 1700, 1320, 1600, 1600, 1450, 1980]);
        let engine = TeamFormationEngine::new(4);
        assert_eq!(engine.balanced(&players).unwrap(), engine.balanced(&players).unwrap());
    }

    #[test]
    fn test_wrong_roster_size() {
        let engine = TeamFormationEngine::new(4);
        let err = engine.balanced(&roster(&[1500; 7])).unwrap_err();
        assert!(matches!(
            err,
            MatchmakingError::InvalidRosterSize {
                expected: 8,
                actual: 7
            }
        ));
    }

    #[test]
    fn test_captains_draft_batch() {
        let players = roster(&[2000, 1900, 1800, 1700, 1600, 1500, 1400, 1300]);
        let engine = TeamFormationEngine::new(4);
        let picks: Vec<PlayerId> = ["p7", "p2", "p6", "p3", "p5", "p4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (a, b) = engine.captains_draft(&players, None, &picks).unwrap();

        assert_eq!(a.captain.as_deref(), Some("p0"));
        assert_eq!(b.captain.as_deref(), Some("p1"));
        assert_eq!(a.players, vec!["p0", "p7", "p6", "p5"]);
        assert_eq!(b.players, vec!["p1", "p2", "p3", "p4"]);
    }

    #[test]
    fn test_captains_draft_incomplete_picks() {
        let players = roster(&[2000, 1900, 1800, 1700, 1600, 1500, 1400, 1300]);
        let engine = TeamFormationEngine::new(4);
        let picks = vec!["p2".to_string()];
        let err = engine.captains_draft(&players, None, &picks).unwrap_err();
        assert!(matches!(err, MatchmakingError::InvalidPick { .. }));
    }

    #[test]
    fn test_players_pick_validates_partition() {
        let players = roster(&[1500; 4]);
        let engine = TeamFormationEngine::new(2);
        let ids = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert!(engine
            .players_pick(&players, &ids(&["p0", "p3"]), &ids(&["p1", "p2"]))
            .is_ok());

        let duplicate = engine
            .players_pick(&players, &ids(&["p0", "p0"]), &ids(&["p1", "p2"]))
            .unwrap_err();
        assert!(matches!(duplicate, MatchmakingError::InvalidPartition { .. }));

        let stranger = engine
            .players_pick(&players, &ids(&["p0", "zz"]), &ids(&["p1", "p2"]))
            .unwrap_err();
        assert!(matches!(stranger, MatchmakingError::InvalidPartition { .. }));

        let uneven = engine
            .players_pick(&players, &ids(&["p0"]), &ids(&["p1", "p2", "p3"]))
            .unwrap_err();
        assert!(matches!(uneven, MatchmakingError::InvalidPartition { .. }));
    }

    #[test]
    fn test_swap_between_moves_captaincy() {
        let mut a = Team {
            label: TeamLabel::A,
            players: vec!["a1".to_string(), "a2".to_string()],
            captain: Some("a1".to_string()),
        };
        let mut b = Team {
            label: TeamLabel::B,
            players: vec!["b1".to_string(), "b2".to_string()],
            captain: Some("b1".to_string()),
        };
        swap_between(&mut a, &mut b, "b1", "a1").unwrap();
        assert_eq!(a.players, vec!["b1", "a2"]);
        assert_eq!(b.players, vec!["a1", "b2"]);
        assert_eq!(a.captain.as_deref(), Some("b1"));
        assert_eq!(b.captain.as_deref(), Some("a1"));

        let err = swap_between(&mut a, &mut b, "b1", "a2").unwrap_err();
        assert!(matches!(err, MatchmakingError::InvalidSwap { .. }));
    }
}
