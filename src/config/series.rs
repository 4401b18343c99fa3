//! Series configuration

use crate::error::{MatchmakingError, Result};
use crate::utils::majority_of;
use serde::{Deserialize, Serialize};

/// Best-of-N series settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Maximum number of games; must be odd so a series cannot end in a draw
    pub length: u32,
    /// Map/mode choices players vote on. Earlier entries win vote ties.
    pub map_pool: Vec<String>,
    /// Finalize the match as soon as the series completes
    pub auto_finalize: bool,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            length: 7,
            map_pool: vec![
                "Midship - MLG Team Slayer".to_string(),
                "Midship - MLG CTF5".to_string(),
                "Lockout - MLG Team Slayer".to_string(),
                "Beaver Creek - MLG Team Slayer".to_string(),
                "Warlock - MLG CTF5".to_string(),
                "Sanctuary - MLG CTF3".to_string(),
            ],
            auto_finalize: true,
        }
    }
}

impl SeriesConfig {
    /// Games a team must win to take the series
    pub fn threshold(&self) -> u32 {
        majority_of(self.length)
    }

    pub fn validate(&self) -> Result<()> {
        if self.length == 0 || self.length % 2 == 0 {
            return Err(MatchmakingError::InvalidSeriesLength {
                length: self.length,
            });
        }
        if self.map_pool.is_empty() {
            return Err(MatchmakingError::ConfigurationError {
                message: "map_pool must contain at least one choice".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for choice in &self.map_pool {
            if !seen.insert(choice) {
                return Err(MatchmakingError::ConfigurationError {
                    message: format!("map_pool contains '{}' more than once", choice),
                });
            }
        }
        Ok(())
    }
}
