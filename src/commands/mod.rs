//! Command surface
//!
//! A closed set of commands, each mapped onto one lifecycle or rating
//! operation. Transports only build a [`Command`] and render the
//! [`CommandResponse`].

pub mod dispatcher;

pub use dispatcher::CommandDispatcher;

use crate::lifecycle::{
    DraftPickResult, GameRecorded, JoinResult, MatchClosed, MatchSummary, SwapResult,
};
use crate::queue::QueueStatus;
use crate::rating::{LeaderboardEntry, LeaderboardSort, PlayerStats, RankChange, RankInfo};
use crate::series::{GameOutcome, VoteTally};
use crate::teams::{DraftProgress, FormationRequest};
use crate::types::{PlayerId, TeamLabel};
use serde::{Deserialize, Serialize};

/// Entries returned by a leaderboard request with no explicit limit
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    JoinQueue {
        player_id: PlayerId,
        alias: String,
    },
    LeaveQueue {
        player_id: PlayerId,
    },
    PingQueue,
    QueueStatus,
    ResetQueue,
    MatchStatus,
    StartTestMatch {
        roster: Vec<PlayerId>,
    },
    /// Chosen by any player on the live roster
    SelectTeams {
        requested_by: PlayerId,
        request: FormationRequest,
    },
    BeginDraft {
        requested_by: PlayerId,
        captains: Option<(PlayerId, PlayerId)>,
    },
    DraftPick {
        captain: PlayerId,
        player: PlayerId,
    },
    SwapPlayers {
        first: PlayerId,
        second: PlayerId,
    },
    CastVote {
        player_id: PlayerId,
        choice: String,
    },
    CloseVoting,
    ReportWinner {
        team: TeamLabel,
    },
    CorrectGame {
        game_index: u32,
        team: TeamLabel,
    },
    FinalizeMatch,
    CancelMatch {
        match_number: u64,
        /// Target test match `match_number` instead of the ranked one
        #[serde(default)]
        test_mode: bool,
    },
    CancelCurrent,
    GetRank {
        player_id: PlayerId,
    },
    GetLeaderboard {
        sort: LeaderboardSort,
        limit: Option<usize>,
    },
    GetStats {
        player_id: PlayerId,
    },
    SetMmr {
        player_id: PlayerId,
        value: i64,
    },
    RefreshRanks,
    LinkAccount {
        player_id: PlayerId,
        handle: String,
    },
    UnlinkAccount {
        player_id: PlayerId,
    },
    SetAlias {
        player_id: PlayerId,
        alias: String,
    },
    HidePlayerNames {
        player_id: PlayerId,
    },
    ShowPlayerNames {
        player_id: PlayerId,
    },
}

impl Command {
    /// Stable name used in logs and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            Command::JoinQueue { .. } => "join_queue",
            Command::LeaveQueue { .. } => "leave_queue",
            Command::PingQueue => "ping_queue",
            Command::QueueStatus => "queue_status",
            Command::ResetQueue => "reset_queue",
            Command::MatchStatus => "match_status",
            Command::StartTestMatch { .. } => "start_test_match",
            Command::SelectTeams { .. } => "select_teams",
            Command::BeginDraft { .. } => "begin_draft",
            Command::DraftPick { .. } => "draft_pick",
            Command::SwapPlayers { .. } => "swap_players",
            Command::CastVote { .. } => "cast_vote",
            Command::CloseVoting => "close_voting",
            Command::ReportWinner { .. } => "report_winner",
            Command::CorrectGame { .. } => "correct_game",
            Command::FinalizeMatch => "finalize_match",
            Command::CancelMatch { .. } => "cancel_match",
            Command::CancelCurrent => "cancel_current",
            Command::GetRank { .. } => "get_rank",
            Command::GetLeaderboard { .. } => "get_leaderboard",
            Command::GetStats { .. } => "get_stats",
            Command::SetMmr { .. } => "set_mmr",
            Command::RefreshRanks => "refresh_ranks",
            Command::LinkAccount { .. } => "link_account",
            Command::UnlinkAccount { .. } => "unlink_account",
            Command::SetAlias { .. } => "set_alias",
            Command::HidePlayerNames { .. } => "hide_player_names",
            Command::ShowPlayerNames { .. } => "show_player_names",
        }
    }

    /// Whether the command can change persisted state
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Command::PingQueue
                | Command::QueueStatus
                | Command::MatchStatus
                | Command::GetRank { .. }
                | Command::GetLeaderboard { .. }
                | Command::GetStats { .. }
        )
    }
}

/// What a command produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Joined(JoinResult),
    Left {
        removed: bool,
    },
    Queue(QueueStatus),
    QueueReset {
        cleared: usize,
    },
    Match {
        summary: Option<MatchSummary>,
    },
    MatchStarted(MatchSummary),
    TeamsSelected(MatchSummary),
    DraftStarted(DraftProgress),
    DraftPicked(DraftPickResult),
    Swapped(SwapResult),
    Votes {
        tally: Vec<VoteTally>,
    },
    VotingClosed {
        choice: String,
    },
    GameRecorded {
        recorded: GameRecorded,
        /// Set when the series completed and the match was finalized right away
        finalized: Option<Box<MatchClosed>>,
        /// Automatic finalize failed; the recorded game still stands
        finalize_error: Option<String>,
    },
    GameCorrected {
        outcome: GameOutcome,
        finalized: Option<Box<MatchClosed>>,
        finalize_error: Option<String>,
    },
    MatchClosed(Box<MatchClosed>),
    Rank(RankInfo),
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
    Stats(PlayerStats),
    MmrSet {
        player_id: PlayerId,
        old_mmr: i64,
        new_mmr: i64,
    },
    RanksRefreshed {
        changes: Vec<RankChange>,
    },
    AccountLinked {
        handle: String,
    },
    AccountUnlinked {
        handle: Option<String>,
    },
    AliasSet {
        alias: String,
    },
    PrivacySet {
        hidden: bool,
    },
}

/// Result of a dispatched command
///
/// `collaborator_errors` lists failures of external calls made after the
/// state change committed; the outcome stands regardless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub outcome: CommandOutcome,
    pub collaborator_errors: Vec<String>,
}

impl CommandResponse {
    pub fn new(outcome: CommandOutcome) -> Self {
        Self {
            outcome,
            collaborator_errors: Vec::new(),
        }
    }
}
