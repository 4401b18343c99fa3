//! Error types for the match lifecycle service
//!
//! Core operations return the typed [`MatchmakingError`] so the transport
//! adapter can render each failure. Configuration and service bootstrap use
//! anyhow for context-rich startup errors.

use crate::types::{LifecycleAction, MatchPhase, PlayerId};

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, MatchmakingError>;

/// Broad classification of a failure, used for rendering and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input shape; state unchanged
    Validation,
    /// Operation not allowed in the current state; state unchanged
    StateConflict,
    /// Snapshot read/write failure
    Persistence,
    /// Voice channel or account link failure
    Collaborator,
    /// Bug or poisoned lock
    Internal,
}

impl ErrorKind {
    /// Label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Collaborator => "collaborator",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, Clone, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Player {player_id} is already in the queue")]
    AlreadyQueued { player_id: PlayerId },

    #[error("Player {player_id} is already in an active match")]
    AlreadyInMatch { player_id: PlayerId },

    #[error("Queue is full ({capacity} players)")]
    QueueFull { capacity: usize },

    #[error("Invalid roster size: expected {expected} players, got {actual}")]
    InvalidRosterSize { expected: usize, actual: usize },

    #[error("Invalid team partition: {reason}")]
    InvalidPartition { reason: String },

    #[error("Invalid captain selection: {reason}")]
    InvalidCaptains { reason: String },

    #[error("Draft pick rejected: {reason}")]
    InvalidPick { reason: String },

    #[error("Player {player_id} is not on either active team")]
    NotInMatch { player_id: PlayerId },

    #[error("Invalid series length {length}: must be a positive odd number")]
    InvalidSeriesLength { length: u32 },

    #[error("Unknown map choice '{choice}'")]
    UnknownChoice { choice: String },

    #[error("Voting for game {game_index} is already closed")]
    VotingClosed { game_index: u32 },

    #[error("Series is already complete; no further games can be played")]
    SeriesComplete,

    #[error("No recorded game with index {game_index}")]
    InvalidGameIndex { game_index: u32 },

    #[error("Illegal transition: cannot {requested} while {current}")]
    IllegalTransition {
        current: MatchPhase,
        requested: LifecycleAction,
    },

    #[error("Players can only be swapped before the first game result (phase: {phase})")]
    InvalidSwapState { phase: MatchPhase },

    #[error("Invalid swap: {reason}")]
    InvalidSwap { reason: String },

    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: PlayerId },

    #[error("Match not found: {match_number}")]
    MatchNotFound { match_number: u64 },

    #[error("Invalid account handle '{handle}'")]
    InvalidHandle { handle: String },

    #[error("Persistence failure: {message}")]
    PersistenceFailed { message: String },

    #[error("Collaborator call failed: {message}")]
    CollaboratorFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchmakingError::InvalidRosterSize { .. }
            | MatchmakingError::InvalidPartition { .. }
            | MatchmakingError::InvalidCaptains { .. }
            | MatchmakingError::InvalidPick { .. }
            | MatchmakingError::InvalidSeriesLength { .. }
            | MatchmakingError::UnknownChoice { .. }
            | MatchmakingError::InvalidGameIndex { .. }
            | MatchmakingError::InvalidSwap { .. }
            | MatchmakingError::PlayerNotFound { .. }
            | MatchmakingError::MatchNotFound { .. }
            | MatchmakingError::InvalidHandle { .. }
            | MatchmakingError::ConfigurationError { .. } => ErrorKind::Validation,

            MatchmakingError::AlreadyQueued { .. }
            | MatchmakingError::AlreadyInMatch { .. }
            | MatchmakingError::QueueFull { .. }
            | MatchmakingError::NotInMatch { .. }
            | MatchmakingError::VotingClosed { .. }
            | MatchmakingError::SeriesComplete
            | MatchmakingError::IllegalTransition { .. }
            | MatchmakingError::InvalidSwapState { .. } => ErrorKind::StateConflict,

            MatchmakingError::PersistenceFailed { .. } => ErrorKind::Persistence,
            MatchmakingError::CollaboratorFailed { .. } => ErrorKind::Collaborator,
            MatchmakingError::InternalError { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn lock_poisoned(what: &str) -> Self {
        MatchmakingError::InternalError {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}
