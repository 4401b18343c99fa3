//! Utility functions for the match lifecycle service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Average of a set of MMR values, 0.0 for an empty set
pub fn average_mmr(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<i64>() as f64 / values.len() as f64
}

/// Smallest value >= `n / 2` rounded up; the number of wins a series needs
pub fn majority_of(n: u32) -> u32 {
    n / 2 + 1
}
