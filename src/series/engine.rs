//! Series state machine
//!
//! A series cycles AwaitingVotes(game) -> InProgress(game, choice) -> result,
//! until one team reaches the win threshold and the series is Complete.

use crate::config::SeriesConfig;
use crate::error::{MatchmakingError, Result};
use crate::types::{GameResult, PlayerId, TeamLabel};
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Where the series currently stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesStatus {
    /// Players are voting on the map for this game
    AwaitingVotes { game_index: u32 },
    /// Voting closed; the game is being played on `choice`
    InProgress { game_index: u32, choice: String },
    Complete { winner: TeamLabel },
}

/// What happened after a game result was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOutcome {
    /// Voting reopened for the next game
    NextGame { game_index: u32 },
    SeriesComplete { winner: TeamLabel },
}

/// Vote count for one choice, in map pool order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub choice: String,
    pub votes: usize,
}

/// State of one best-of-N series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    length: u32,
    threshold: u32,
    map_pool: Vec<String>,
    participants: Vec<PlayerId>,
    games: Vec<GameResult>,
    votes: BTreeMap<PlayerId, String>,
    current_choice: Option<String>,
    winner: Option<TeamLabel>,
}

impl Series {
    /// Start a series for `participants` (every player on either team)
    pub fn new(config: &SeriesConfig, participants: Vec<PlayerId>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            length: config.length,
            threshold: config.threshold(),
            map_pool: config.map_pool.clone(),
            participants,
            games: Vec::new(),
            votes: BTreeMap::new(),
            current_choice: None,
            winner: None,
        })
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// 1-based index of the game currently being voted on or played
    pub fn game_index(&self) -> u32 {
        self.games.len() as u32 + 1
    }

    pub fn games(&self) -> &[GameResult] {
        &self.games
    }

    pub fn has_results(&self) -> bool {
        !self.games.is_empty()
    }

    pub fn winner(&self) -> Option<TeamLabel> {
        self.winner
    }

    pub fn is_complete(&self) -> bool {
        self.winner.is_some()
    }

    pub fn wins(&self, label: TeamLabel) -> u32 {
        self.games.iter().filter(|g| g.winner == label).count() as u32
    }

    /// (Team A wins, Team B wins)
    pub fn score(&self) -> (u32, u32) {
        (self.wins(TeamLabel::A), self.wins(TeamLabel::B))
    }

    pub fn status(&self) -> SeriesStatus {
        match (&self.winner, &self.current_choice) {
            (Some(winner), _) => SeriesStatus::Complete { winner: *winner },
            (None, Some(choice)) => SeriesStatus::InProgress {
                game_index: self.game_index(),
                choice: choice.clone(),
            },
            (None, None) => SeriesStatus::AwaitingVotes {
                game_index: self.game_index(),
            },
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_complete() {
            return Err(MatchmakingError::SeriesComplete);
        }
        Ok(())
    }

    /// Record a map vote; a later vote from the same player replaces the earlier one
    pub fn cast_vote(&mut self, player_id: &str, choice: &str) -> Result<Vec<VoteTally>> {
        self.ensure_open()?;
        if !self.participants.iter().any(|p| p == player_id) {
            return Err(MatchmakingError::NotInMatch {
                player_id: player_id.to_string(),
            });
        }
        if self.current_choice.is_some() {
            return Err(MatchmakingError::VotingClosed {
                game_index: self.game_index(),
            });
        }
        if !self.map_pool.iter().any(|c| c == choice) {
            return Err(MatchmakingError::UnknownChoice {
                choice: choice.to_string(),
            });
        }

        if let Some(previous) = self
            .votes
            .insert(player_id.to_string(), choice.to_string())
        {
            debug!(
                "Player '{}' changed vote from '{}' to '{}'",
                player_id, previous, choice
            );
        }
        Ok(self.tally())
    }

    /// Current vote counts for every choice, in map pool order
    pub fn tally(&self) -> Vec<VoteTally> {
        self.map_pool
            .iter()
            .map(|choice| VoteTally {
                choice: choice.clone(),
                votes: self.votes.values().filter(|v| *v == choice).count(),
            })
            .collect()
    }

    /// Close voting for the current game and commit the winning choice
    ///
    /// Ties go to the choice listed first in the map pool, which also means
    /// the first choice wins when nobody voted.
    pub fn close_voting(&mut self) -> Result<String> {
        self.ensure_open()?;
        if self.current_choice.is_some() {
            return Err(MatchmakingError::VotingClosed {
                game_index: self.game_index(),
            });
        }

        let mut best: Option<VoteTally> = None;
        for entry in self.tally() {
            if best.as_ref().map_or(true, |b| entry.votes > b.votes) {
                best = Some(entry);
            }
        }
        let chosen = best
            .map(|b| b.choice)
            .ok_or_else(|| MatchmakingError::ConfigurationError {
                message: "map pool is empty".to_string(),
            })?;

        info!(
            "Voting closed for game {}: '{}' ({} votes cast)",
            self.game_index(),
            chosen,
            self.votes.len()
        );
        self.votes.clear();
        self.current_choice = Some(chosen.clone());
        Ok(chosen)
    }

    /// Record the winner of the current game
    ///
    /// If votes were cast but voting was never closed, the vote is closed
    /// first so the game carries its map.
    pub fn record_game_result(&mut self, winner: TeamLabel) -> Result<GameOutcome> {
        self.ensure_open()?;
        if self.current_choice.is_none() && !self.votes.is_empty() {
            self.close_voting()?;
        }

        let game_index = self.game_index();
        self.games.push(GameResult {
            game_index,
            choice: self.current_choice.take(),
            winner,
            recorded_at: current_timestamp(),
        });
        self.votes.clear();

        let (a, b) = self.score();
        info!(
            "Game {} won by {} - score A {} : {} B",
            game_index, winner, a, b
        );

        Ok(self.evaluate())
    }

    /// Change the winner of an already recorded game
    pub fn correct_game_result(&mut self, game_index: u32, winner: TeamLabel) -> Result<GameOutcome> {
        self.ensure_open()?;
        let game = self
            .games
            .iter_mut()
            .find(|g| g.game_index == game_index)
            .ok_or(MatchmakingError::InvalidGameIndex { game_index })?;

        if game.winner != winner {
            info!(
                "Game {} corrected from {} to {}",
                game_index, game.winner, winner
            );
            game.winner = winner;
        }
        Ok(self.evaluate())
    }

    fn evaluate(&mut self) -> GameOutcome {
        for label in [TeamLabel::A, TeamLabel::B] {
            if self.wins(label) >= self.threshold {
                self.winner = Some(label);
                self.current_choice = None;
                info!(
                    "Series complete: {} wins {} games to {}",
                    label,
                    self.wins(label),
                    self.wins(label.opponent())
                );
                return GameOutcome::SeriesComplete { winner: label };
            }
        }
        GameOutcome::NextGame {
            game_index: self.game_index(),
        }
    }
}
