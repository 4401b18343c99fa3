//! Rating system configuration
//!
//! Every number that shapes MMR and XP progression lives here so a community
//! can tune it without code changes.

use crate::error::{MatchmakingError, Result};
use serde::{Deserialize, Serialize};

/// Number of progression levels
pub const MAX_LEVEL: usize = 50;

/// How MMR changes after a series. Winner and loser deltas are computed
/// independently from the two teams' pre-match average MMR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeltaFormula {
    /// Elo-style: expected score from the average MMRs scales each side's delta
    Elo { win_k: f64, loss_k: f64 },
    /// Flat amounts regardless of opponent strength
    Fixed { win: i64, loss: i64 },
}

impl Default for DeltaFormula {
    fn default() -> Self {
        DeltaFormula::Elo {
            win_k: 32.0,
            loss_k: 32.0,
        }
    }
}

/// Rating and progression configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// MMR assigned to a player created on first queue join
    pub default_mmr: i64,
    /// MMR never drops below this value
    pub mmr_floor: i64,
    pub formula: DeltaFormula,
    /// XP every player earns per game played
    pub xp_per_game: i64,
    /// Extra XP per game won
    pub xp_win_bonus: i64,
    /// Minimum XP for levels 1..=50, ascending, first entry 0
    pub level_thresholds: Vec<i64>,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            default_mmr: 1500,
            mmr_floor: 0,
            formula: DeltaFormula::default(),
            xp_per_game: 10,
            xp_win_bonus: 40,
            level_thresholds: default_level_thresholds(),
        }
    }
}

impl RatingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.level_thresholds.len() != MAX_LEVEL {
            return Err(MatchmakingError::ConfigurationError {
                message: format!(
                    "level_thresholds must have {} entries, got {}",
                    MAX_LEVEL,
                    self.level_thresholds.len()
                ),
            });
        }
        if self.level_thresholds[0] != 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "level 1 must start at 0 XP".to_string(),
            });
        }
        if self
            .level_thresholds
            .windows(2)
            .any(|pair| pair[1] <= pair[0])
        {
            return Err(MatchmakingError::ConfigurationError {
                message: "level_thresholds must be strictly increasing".to_string(),
            });
        }
        if self.xp_per_game < 0 || self.xp_win_bonus < 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "XP rewards must be non-negative".to_string(),
            });
        }
        if self.default_mmr < self.mmr_floor {
            return Err(MatchmakingError::ConfigurationError {
                message: "default_mmr cannot be below mmr_floor".to_string(),
            });
        }
        match &self.formula {
            DeltaFormula::Elo { win_k, loss_k } if *win_k < 0.0 || *loss_k < 0.0 => {
                Err(MatchmakingError::ConfigurationError {
                    message: "Elo K factors must be non-negative".to_string(),
                })
            }
            DeltaFormula::Fixed { win, loss } if *win < 0 || *loss < 0 => {
                Err(MatchmakingError::ConfigurationError {
                    message: "fixed deltas are magnitudes and must be non-negative".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// The community's stock progression curve: 100 XP per level up to 12,
/// 200 up to 17, then 250 per level to 50.
pub fn default_level_thresholds() -> Vec<i64> {
    let mut thresholds = Vec::with_capacity(MAX_LEVEL);
    thresholds.push(0);
    let mut next = 89;
    for level in 2..=MAX_LEVEL {
        thresholds.push(next);
        next += match level {
            2..=12 => 100,
            13..=16 => 200,
            _ => 250,
        };
    }
    thresholds
}
