//! Scrim Room - match lifecycle engine for community scrims
//!
//! Players join a shared queue; a full queue becomes a match whose roster is
//! split into two teams, plays a best-of-N series with per-game map voting,
//! and feeds the result back into MMR and XP ratings. Every committed change
//! is snapshotted so a restart resumes the live match.

pub mod accounts;
pub mod collaborators;
pub mod commands;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod persistence;
pub mod queue;
pub mod rating;
pub mod series;
pub mod service;
pub mod teams;
pub mod types;
pub mod utils;

pub use error::{ErrorKind, MatchmakingError, Result};
pub use types::*;

pub use commands::{Command, CommandDispatcher, CommandOutcome, CommandResponse};
pub use lifecycle::{MatchLifecycle, MatchSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
