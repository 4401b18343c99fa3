//! Match lifecycle
//!
//! Owns the queue and the single live match, and moves the match through
//! Idle, Pregame, Ingame and Postgame.

pub mod context;
pub mod machine;

pub use context::{
    MatchContext, MatchCounters, MatchSummary, SwapRecord, TeamMemberView, TeamView,
};
pub use machine::{
    DraftPickResult, GameRecorded, JoinResult, MatchClosed, MatchLifecycle, RecoveryReport,
    SwapResult,
};
