//! Player ratings and progression
//!
//! This module holds the player directory: MMR updates after a series, XP and
//! the derived 1-50 level, plus the read-only rank and leaderboard projections.

pub mod calculator;
pub mod levels;
pub mod storage;

// Re-export commonly used types
pub use calculator::{
    calculator_for, EloDeltaCalculator, FixedDeltaCalculator, RatingDeltaCalculator, TeamDeltas,
};
pub use levels::{LevelTable, RankProgress};
pub use storage::{
    LeaderboardEntry, LeaderboardSort, PlayerDirectory, PlayerStats, RankChange, RankInfo,
    RatingDelta, RatingStore,
};
