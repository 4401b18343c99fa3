//! Best-of-N series tracking
//!
//! Drives per-game map voting, score keeping and win detection for the two
//! teams of an active match.

pub mod engine;

pub use engine::{GameOutcome, Series, SeriesStatus, VoteTally};
