//! Captains draft state
//!
//! Captain A picks first, then the captains strictly alternate until the pool
//! is empty. The state is serializable so an in-progress draft survives a
//! restart.

use crate::error::{MatchmakingError, Result};
use crate::types::{PlayerId, RosterPlayer, Team, TeamLabel};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a draft stands after a pick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftProgress {
    /// Captain whose turn it is, `None` once the draft is complete
    pub next_picker: Option<PlayerId>,
    pub remaining: Vec<PlayerId>,
    pub team_a: Vec<PlayerId>,
    pub team_b: Vec<PlayerId>,
}

/// In-progress captains draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftState {
    team_a: Team,
    team_b: Team,
    pool: Vec<PlayerId>,
    turn: TeamLabel,
}

impl DraftState {
    /// Start a draft over `roster`
    ///
    /// With no explicit captains the two highest-MMR players captain, ties
    /// going to whoever queued first; the highest is captain A.
    pub fn new(roster: &[RosterPlayer], captains: Option<(PlayerId, PlayerId)>) -> Result<Self> {
        let (captain_a, captain_b) = match captains {
            Some((a, b)) => {
                if a == b {
                    return Err(MatchmakingError::InvalidCaptains {
                        reason: "captains must be two different players".to_string(),
                    });
                }
                for captain in [&a, &b] {
                    if !roster.iter().any(|p| &p.id == captain) {
                        return Err(MatchmakingError::InvalidCaptains {
                            reason: format!("{} is not in the roster", captain),
                        });
                    }
                }
                (a, b)
            }
            None => {
                if roster.len() < 2 {
                    return Err(MatchmakingError::InvalidCaptains {
                        reason: "roster is too small to choose captains".to_string(),
                    });
                }
                let mut ranked: Vec<&RosterPlayer> = roster.iter().collect();
                // Stable sort keeps queue order among equal MMR
                ranked.sort_by(|x, y| y.mmr.cmp(&x.mmr));
                (ranked[0].id.clone(), ranked[1].id.clone())
            }
        };

        let pool = roster
            .iter()
            .filter(|p| p.id != captain_a && p.id != captain_b)
            .map(|p| p.id.clone())
            .collect();

        debug!("Draft started, captains '{}' and '{}'", captain_a, captain_b);

        Ok(Self {
            team_a: Team {
                label: TeamLabel::A,
                players: vec![captain_a.clone()],
                captain: Some(captain_a),
            },
            team_b: Team {
                label: TeamLabel::B,
                players: vec![captain_b.clone()],
                captain: Some(captain_b),
            },
            pool,
            turn: TeamLabel::A,
        })
    }

    /// Captain on the clock, `None` when the draft is complete
    pub fn next_picker(&self) -> Option<&PlayerId> {
        if self.is_complete() {
            return None;
        }
        self.team(self.turn).captain.as_ref()
    }

    /// Record `captain` picking `player`
    pub fn pick(&mut self, captain: &str, player: &str) -> Result<DraftProgress> {
        let expected = match self.next_picker() {
            Some(expected) => expected.clone(),
            None => {
                return Err(MatchmakingError::InvalidPick {
                    reason: "the draft is already complete".to_string(),
                })
            }
        };
        if expected != captain {
            return Err(MatchmakingError::InvalidPick {
                reason: format!("it is {}'s turn to pick", expected),
            });
        }
        let index = self
            .pool
            .iter()
            .position(|p| p == player)
            .ok_or_else(|| MatchmakingError::InvalidPick {
                reason: format!("{} is not available to pick", player),
            })?;

        let picked = self.pool.remove(index);
        let turn = self.turn;
        self.team_mut(turn).players.push(picked);
        self.turn = turn.opponent();

        debug!(
            "Captain '{}' picked '{}', {} left in pool",
            captain,
            player,
            self.pool.len()
        );
        Ok(self.progress())
    }

    pub fn is_complete(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn progress(&self) -> DraftProgress {
        DraftProgress {
            next_picker: self.next_picker().cloned(),
            remaining: self.pool.clone(),
            team_a: self.team_a.players.clone(),
            team_b: self.team_b.players.clone(),
        }
    }

    pub fn team(&self, label: TeamLabel) -> &Team {
        match label {
            TeamLabel::A => &self.team_a,
            TeamLabel::B => &self.team_b,
        }
    }

    fn team_mut(&mut self, label: TeamLabel) -> &mut Team {
        match label {
            TeamLabel::A => &mut self.team_a,
            TeamLabel::B => &mut self.team_b,
        }
    }

    /// Swap two players already placed on opposite teams; captaincy follows the slot
    pub(crate) fn swap(&mut self, first: &str, second: &str) -> Result<()> {
        crate::teams::formation::swap_between(&mut self.team_a, &mut self.team_b, first, second)
    }

    /// Finished teams; fails while players remain in the pool
    pub fn into_teams(self) -> Result<(Team, Team)> {
        if !self.is_complete() {
            return Err(MatchmakingError::InvalidPick {
                reason: format!("draft incomplete, {} players unpicked", self.pool.len()),
            });
        }
        Ok((self.team_a, self.team_b))
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

    #[test]
    fn test_default_captains_are_top_two_mmr() {
        let draft = DraftState::new(&roster(&[1500, 1900, 1400, 2000]), None).unwrap();
        assert_eq!(draft.team(TeamLabel::A).captain.as_deref(), Some("p3"));
        assert_eq!(draft.team(TeamLabel::B).captain.as_deref(), Some("p1"));
        assert_eq!(draft.next_picker().map(String::as_str), Some("p3"));
    }

    #[test]
    fn test_captain_ties_follow_queue_order() {
        let draft = DraftState::new(&roster(&[1500, 1500, 1500, 1500]), None).unwrap();
        assert_eq!(draft.team(TeamLabel::A).captain.as_deref(), Some("p0"));
        assert_eq!(draft.team(TeamLabel::B).captain.as_deref(), Some("p1"));
    }

    #[test]
    fn test_out_of_turn_pick_rejected() {
        let players = roster(&[2000, 1900, 1800, 1700]);
        let mut draft = DraftState::new(&players, None).unwrap();
        let err = draft.pick("p1", "p2").unwrap_err();
        assert!(matches!(err, MatchmakingError::InvalidPick { .. }));
        assert_eq!(draft.progress().remaining.len(), 2);
    }

    #[test]
    fn test_picks_alternate_until_complete() {
        let players = roster(&[2000, 1900, 1800, 1700, 1600, 1500, 1400, 1300]);
        let mut draft = DraftState::new(&players, None).unwrap();

        let order = ["p2", "p3", "p4", "p5", "p6", "p7"];
        let mut captain = "p0";
        for player in order {
            draft.pick(captain, player).unwrap();
            captain = if captain == "p0" { "p1" } else { "p0" };
        }

        assert!(draft.is_complete());
        assert!(draft.next_picker().is_none());
        let (a, b) = draft.into_teams().unwrap();
        assert_eq!(a.players, vec!["p0", "p2", "p4", "p6"]);
        assert_eq!(b.players, vec!["p1", "p3", "p5", "p7"]);
    }

    #[test]
    fn test_explicit_captains_must_be_in_roster() {
        let players = roster(&[2000, 1900]);
        let err =
            DraftState::new(&players, Some(("p0".to_string(), "nobody".to_string()))).unwrap_err();
        assert!(matches!(err, MatchmakingError::InvalidCaptains { .. }));
    }
}
