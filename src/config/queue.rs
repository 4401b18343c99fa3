//! Queue configuration

use crate::error::{MatchmakingError, Result};
use serde::{Deserialize, Serialize};

/// Queue sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Players per team; the queue holds two teams' worth of players
    pub team_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { team_size: 4 }
    }
}

impl QueueConfig {
    /// Number of players that fills the queue
    pub fn capacity(&self) -> usize {
        self.team_size * 2
    }

    pub fn validate(&self) -> Result<()> {
        if self.team_size < 2 {
            return Err(MatchmakingError::ConfigurationError {
                message: "team_size must be at least 2".to_string(),
            });
        }
        Ok(())
    }
}
