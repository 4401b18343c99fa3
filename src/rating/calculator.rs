//! Rating delta calculators
//!
//! A calculator turns the two teams' pre-match average MMR into the MMR each
//! winner gains and each loser loses. The two amounts are computed
//! independently and need not sum to zero.

use crate::config::DeltaFormula;
use serde::{Deserialize, Serialize};
use skillratings::elo::{expected_score, EloRating};

/// MMR movement for one series, as positive magnitudes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamDeltas {
    /// Added to every winner's MMR
    pub winner_gain: i64,
    /// Subtracted from every loser's MMR
    pub loser_loss: i64,
}

/// Trait for computing MMR changes after a series
pub trait RatingDeltaCalculator: Send + Sync + std::fmt::Debug {
    /// Deltas for a series won by the team averaging `winner_avg`
    fn deltas(&self, winner_avg: f64, loser_avg: f64) -> TeamDeltas;

    /// Short name for logging
    fn name(&self) -> &'static str;
}

/// Elo-style deltas: beating a stronger team pays more, losing to one costs less
#[derive(Debug, Clone, PartialEq)]
pub struct EloDeltaCalculator {
    win_k: f64,
    loss_k: f64,
}

impl EloDeltaCalculator {
    pub fn new(win_k: f64, loss_k: f64) -> Self {
        Self { win_k, loss_k }
    }
}

impl RatingDeltaCalculator for EloDeltaCalculator {
    fn deltas(&self, winner_avg: f64, loser_avg: f64) -> TeamDeltas {
        let (winner_expected, loser_expected) = expected_score(
            &EloRating { rating: winner_avg },
            &EloRating { rating: loser_avg },
        );
        TeamDeltas {
            winner_gain: (self.win_k * (1.0 - winner_expected)).round() as i64,
            loser_loss: (self.loss_k * loser_expected).round() as i64,
        }
    }

    fn name(&self) -> &'static str {
        "elo"
    }
}

/// Flat deltas regardless of the opponent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedDeltaCalculator {
    win: i64,
    loss: i64,
}

impl FixedDeltaCalculator {
    pub fn new(win: i64, loss: i64) -> Self {
        Self { win, loss }
    }
}

impl RatingDeltaCalculator for FixedDeltaCalculator {
    fn deltas(&self, _winner_avg: f64, _loser_avg: f64) -> TeamDeltas {
        TeamDeltas {
            winner_gain: self.win,
            loser_loss: self.loss,
        }
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Build the calculator selected by configuration
pub fn calculator_for(formula: &DeltaFormula) -> Box<dyn RatingDeltaCalculator> {
    match formula {
        DeltaFormula::Elo { win_k, loss_k } => Box::new(EloDeltaCalculator::new(*win_k, *loss_k)),
        DeltaFormula::Fixed { win, loss } => Box::new(FixedDeltaCalculator::new(*win, *loss)),
    }
}
