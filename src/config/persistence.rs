//! Persistence configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where snapshots live and how hard to retry writing them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    /// Directory holding queue, match, player and history files
    pub state_dir: PathBuf,
    /// Attempts per write before the gateway logs and moves on
    pub max_retry_attempts: u32,
    /// First backoff delay in milliseconds; doubles per attempt
    pub retry_delay_ms: u64,
    /// Upper bound for the backoff delay in milliseconds
    pub max_retry_delay_ms: u64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            max_retry_attempts: 5,
            retry_delay_ms: 200,
            max_retry_delay_ms: 5000,
        }
    }
}

impl PersistenceSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}
