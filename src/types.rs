//! Common types used throughout the match lifecycle service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for players (the chat platform's user id)
pub type PlayerId = String;

/// Unique identifier for matches
pub type MatchId = Uuid;

/// Label of one of the two teams in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TeamLabel {
    A,
    B,
}

impl TeamLabel {
    /// The other team
    pub fn opponent(self) -> Self {
        match self {
            TeamLabel::A => TeamLabel::B,
            TeamLabel::B => TeamLabel::A,
        }
    }
}

impl std::fmt::Display for TeamLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamLabel::A => write!(f, "Team A"),
            TeamLabel::B => write!(f, "Team B"),
        }
    }
}

/// Persistent player record
///
/// Level is not stored: every read derives it from `xp` through the configured
/// level table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub alias: String,
    pub mmr: i64,
    pub xp: i64,
    /// Level last announced to the player. Never read as the current level;
    /// rank refreshes compare it with the derived level to report changes.
    pub published_level: u8,
    pub linked_handle: Option<String>,
    pub hide_name: bool,
    pub wins: u32,
    pub losses: u32,
    pub series_wins: u32,
    pub series_losses: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Player {
    /// Create a new player with starting MMR and no XP
    pub fn new(id: PlayerId, alias: String, mmr: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            alias,
            mmr,
            xp: 0,
            published_level: 1,
            linked_handle: None,
            hide_name: false,
            wins: 0,
            losses: 0,
            series_wins: 0,
            series_losses: 0,
            created_at: now,
            last_updated: now,
        }
    }

    /// Name shown in public projections such as the queue list
    pub fn display_name(&self) -> &str {
        if self.hide_name {
            HIDDEN_PLAYER_NAME
        } else {
            &self.alias
        }
    }
}

/// Placeholder shown instead of a hidden player's alias
pub const HIDDEN_PLAYER_NAME: &str = "Hidden player";

/// Player position in the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub joined_at: DateTime<Utc>,
}

/// A player as captured in a match roster, with the MMR used for balancing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterPlayer {
    pub id: PlayerId,
    pub mmr: i64,
}

/// One side of a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub label: TeamLabel,
    pub players: Vec<PlayerId>,
    pub captain: Option<PlayerId>,
}

impl Team {
    /// Create an empty team
    pub fn empty(label: TeamLabel) -> Self {
        Self {
            label,
            players: Vec::new(),
            captain: None,
        }
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p == player_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

/// How the two teams are formed from the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormationMode {
    BalancedMmr,
    CaptainsDraft,
    PlayersPick,
}

impl std::fmt::Display for FormationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormationMode::BalancedMmr => write!(f, "Balanced (MMR)"),
            FormationMode::CaptainsDraft => write!(f, "Captains Draft"),
            FormationMode::PlayersPick => write!(f, "Players Pick"),
        }
    }
}

/// Outcome of one completed game in a series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    /// 1-based game number
    pub game_index: u32,
    /// Map/mode committed by the vote, if voting was closed for this game
    pub choice: Option<String>,
    pub winner: TeamLabel,
    pub recorded_at: DateTime<Utc>,
}

/// Phase of the match lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchPhase {
    Idle,
    Pregame,
    Ingame,
    Postgame,
}

impl std::fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchPhase::Idle => write!(f, "Idle"),
            MatchPhase::Pregame => write!(f, "Pregame"),
            MatchPhase::Ingame => write!(f, "Ingame"),
            MatchPhase::Postgame => write!(f, "Postgame"),
        }
    }
}

/// An operation requested of the lifecycle, named in `IllegalTransition` errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleAction {
    StartPregame,
    StartTestMatch,
    SelectTeams,
    DraftPick,
    Vote,
    RecordGame,
    CorrectGame,
    Finalize,
    Cancel,
    ResetQueue,
}

impl LifecycleAction {
    /// Phase the action moves the lifecycle to, or keeps it in
    pub fn target_phase(&self) -> MatchPhase {
        match self {
            LifecycleAction::StartPregame
            | LifecycleAction::StartTestMatch
            | LifecycleAction::DraftPick => MatchPhase::Pregame,
            LifecycleAction::SelectTeams
            | LifecycleAction::Vote
            | LifecycleAction::RecordGame
            | LifecycleAction::CorrectGame => MatchPhase::Ingame,
            LifecycleAction::Finalize | LifecycleAction::Cancel | LifecycleAction::ResetQueue => {
                MatchPhase::Idle
            }
        }
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            LifecycleAction::StartPregame => "start pregame",
            LifecycleAction::StartTestMatch => "start a test match",
            LifecycleAction::SelectTeams => "finalize teams",
            LifecycleAction::DraftPick => "make a draft pick",
            LifecycleAction::Vote => "vote",
            LifecycleAction::RecordGame => "record a game result",
            LifecycleAction::CorrectGame => "correct a game result",
            LifecycleAction::Finalize => "finalize the match",
            LifecycleAction::Cancel => "cancel the match",
            LifecycleAction::ResetQueue => "reset the queue",
        };
        write!(f, "{} (-> {})", verb, self.target_phase())
    }
}
