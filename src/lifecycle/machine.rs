//! Match lifecycle state machine
//!
//! Idle -> Pregame -> Ingame -> Postgame -> Idle, with cancellation from
//! Pregame or Ingame. All state-affecting operations are serialized through
//! one async mutex. Each operation works on a copy of the state and only
//! replaces the live state when it succeeds, so a rejected operation never
//! leaves a partial change behind. Rating results are staged by the operation
//! and written after it succeeds. The snapshot for the new state is queued
//! for writing before the lock is released.

use crate::config::{QueueConfig, SeriesConfig};
use crate::error::{MatchmakingError, Result};
use crate::lifecycle::context::{MatchContext, MatchCounters, MatchSummary, SwapRecord};
use crate::metrics::MetricsCollector;
use crate::persistence::{
    HistoryRecord, MatchOutcome, MatchSnapshot, PersistedSnapshot, PersistenceGateway,
    QueueSnapshot, SNAPSHOT_VERSION,
};
use crate::queue::{JoinOutcome, QueueManager, QueueStatus};
use crate::rating::{RankChange, RatingDelta, RatingStore};
use crate::series::{GameOutcome, Series, VoteTally};
use crate::teams::formation::swap_between;
use crate::teams::{DraftProgress, DraftState, FormationRequest, TeamFormationEngine};
use crate::types::{
    FormationMode, GameResult, LifecycleAction, MatchPhase, PlayerId, RosterPlayer, Team,
    TeamLabel,
};
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Queue and live match, mutated only as a unit
#[derive(Debug, Clone)]
struct LifecycleState {
    queue: QueueManager,
    active: Option<MatchContext>,
    counters: MatchCounters,
    revision: u64,
}

impl LifecycleState {
    fn phase(&self) -> MatchPhase {
        self.active
            .as_ref()
            .map_or(MatchPhase::Idle, |context| context.phase)
    }

    fn live_roster(&self) -> Vec<PlayerId> {
        self.active
            .as_ref()
            .map(|context| context.roster_ids())
            .unwrap_or_default()
    }

    /// The live context, if its phase allows `action`
    fn active_in(
        &mut self,
        action: LifecycleAction,
        allowed: &[MatchPhase],
    ) -> Result<&mut MatchContext> {
        let current = self.phase();
        match self.active.as_mut() {
            Some(context) if allowed.contains(&context.phase) => Ok(context),
            _ => Err(MatchmakingError::IllegalTransition {
                current,
                requested: action,
            }),
        }
    }
}

/// Writes an operation hands back to `transact` for after it succeeds
#[derive(Default)]
struct Staged {
    archived: Vec<HistoryRecord>,
    result: Option<StagedResult>,
}

struct StagedResult {
    winner: TeamLabel,
    deltas: Vec<RatingDelta>,
    games: Vec<GameResult>,
}

fn series_mut(context: &mut MatchContext) -> Result<&mut Series> {
    context
        .series
        .as_mut()
        .ok_or_else(|| MatchmakingError::InternalError {
            message: format!("{} is Ingame without a series", context.match_id),
        })
}

fn require_roster_member(context: &MatchContext, player_id: &str) -> Result<()> {
    if context.roster.iter().any(|player| player.id == player_id) {
        return Ok(());
    }
    Err(MatchmakingError::NotInMatch {
        player_id: player_id.to_string(),
    })
}

/// Result of a successful queue join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResult {
    pub outcome: JoinOutcome,
    /// Set when this join filled the queue and started a Pregame
    pub started: Option<MatchSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPickResult {
    pub progress: DraftProgress,
    /// Set when the last pick finalized the teams
    pub teams_finalized: Option<MatchSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResult {
    pub swap: SwapRecord,
    pub summary: MatchSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecorded {
    pub game: GameResult,
    pub outcome: GameOutcome,
    pub summary: MatchSummary,
}

/// A match leaving the lifecycle by finalization or cancellation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchClosed {
    pub record: HistoryRecord,
    /// Pregame started from a queue that filled while the match was live
    pub started: Option<MatchSummary>,
}

/// What `recover` found on startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub revision: u64,
    pub phase: MatchPhase,
    pub queued: usize,
    pub players: usize,
    pub resumed: Option<MatchSummary>,
    pub started: Option<MatchSummary>,
}

/// Owner of the queue and the single live match
pub struct MatchLifecycle {
    state: Mutex<LifecycleState>,
    ratings: Arc<RatingStore>,
    formation: TeamFormationEngine,
    series_config: SeriesConfig,
    gateway: Arc<PersistenceGateway>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl MatchLifecycle {
    pub fn new(
        queue_config: &QueueConfig,
        series_config: SeriesConfig,
        ratings: Arc<RatingStore>,
        gateway: Arc<PersistenceGateway>,
    ) -> Result<Self> {
        queue_config.validate()?;
        series_config.validate()?;

        info!(
            "Match lifecycle ready: {}v{}, best of {}",
            queue_config.team_size, queue_config.team_size, series_config.length
        );

        Ok(Self {
            state: Mutex::new(LifecycleState {
                queue: QueueManager::new(queue_config.capacity()),
                active: None,
                counters: MatchCounters::default(),
                revision: 0,
            }),
            ratings,
            formation: TeamFormationEngine::new(queue_config.team_size),
            series_config,
            gateway,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn ratings(&self) -> &Arc<RatingStore> {
        &self.ratings
    }

    pub fn gateway(&self) -> &Arc<PersistenceGateway> {
        &self.gateway
    }

    pub fn series_config(&self) -> &SeriesConfig {
        &self.series_config
    }

    pub fn capacity(&self) -> usize {
        self.formation.team_size() * 2
    }

    /// Run `op` against a copy of the state and commit it on success
    ///
    /// `op` may create default player records through `get_or_create`; those
    /// survive a rejected operation. Every other rating write is staged and
    /// applied here.
    async fn transact<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut LifecycleState, &mut Staged) -> Result<T>,
    {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let mut staged = Staged::default();

        let value = op(&mut next, &mut staged)?;

        if let Some(result) = &staged.result {
            self.ratings
                .commit_result(result.winner, &result.deltas, &result.games)?;
        }
        next.revision += 1;
        let snapshot = self.snapshot_of(&next)?;
        *guard = next;

        for record in staged.archived {
            self.gateway.archive(record);
        }
        self.gateway.commit(snapshot);
        self.update_gauges(&guard);
        Ok(value)
    }

    fn snapshot_of(&self, state: &LifecycleState) -> Result<PersistedSnapshot> {
        let saved_at = current_timestamp();
        Ok(PersistedSnapshot {
            queue: QueueSnapshot {
                version: SNAPSHOT_VERSION,
                revision: state.revision,
                saved_at,
                active_match: state.active.as_ref().map(|context| context.match_id),
                entries: state.queue.entries(),
                counters: state.counters,
            },
            active_match: state.active.as_ref().map(|context| MatchSnapshot {
                version: SNAPSHOT_VERSION,
                revision: state.revision,
                saved_at,
                context: context.clone(),
            }),
            players: self.ratings.snapshot()?,
        })
    }

    fn update_gauges(&self, state: &LifecycleState) {
        if let Some(metrics) = &self.metrics {
            metrics.set_match_phase(state.phase());
            metrics.set_players_waiting(state.queue.len());
        }
    }

    fn summary(&self, context: &MatchContext) -> MatchSummary {
        context.summary(self.ratings.as_ref())
    }

    /// Start a Pregame if the queue is full and nothing is live
    fn start_pregame(&self, state: &mut LifecycleState) -> Result<Option<MatchSummary>> {
        if state.active.is_some() {
            if state.queue.is_full() {
                info!("Queue is full, next match starts when the live match ends");
            }
            return Ok(None);
        }
        if !state.queue.is_full() {
            return Ok(None);
        }

        let now = current_timestamp();
        let entries = state.queue.drain_roster();
        let mut roster = Vec::with_capacity(entries.len());
        let mut waits = Vec::with_capacity(entries.len());
        for entry in &entries {
            let player = self.ratings.get_or_create(&entry.player_id, &entry.player_id)?;
            roster.push(RosterPlayer {
                id: player.id,
                mmr: player.mmr,
            });
            waits.push((now - entry.joined_at).to_std().unwrap_or_default());
        }

        let number = state.counters.next(false);
        let context = MatchContext::new(number, false, roster);
        info!(
            "{} entering Pregame with {} players (match {})",
            context.label(),
            context.roster.len(),
            context.match_id
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_match_started(false, &waits);
        }

        let summary = self.summary(&context);
        state.active = Some(context);
        Ok(Some(summary))
    }

    fn enter_ingame(
        &self,
        context: &mut MatchContext,
        mode: FormationMode,
        team_a: Team,
        team_b: Team,
    ) -> Result<()> {
        let series = Series::new(&self.series_config, context.roster_ids())?;
        context.team_a = team_a;
        context.team_b = team_b;
        context.mode = Some(mode);
        context.draft = None;
        context.series = Some(series);
        context.phase = MatchPhase::Ingame;
        context.touch();
        info!(
            "{} is Ingame ({}), best of {}",
            context.label(),
            mode,
            self.series_config.length
        );
        Ok(())
    }

    /// Close the live match as cancelled
    ///
    /// With `expected` set, only a match with that number and kind is closed.
    /// Ranked and test matches are numbered independently.
    fn cancel_in(
        &self,
        state: &mut LifecycleState,
        staged: &mut Staged,
        expected: Option<(u64, bool)>,
    ) -> Result<MatchClosed> {
        let context = state.active_in(
            LifecycleAction::Cancel,
            &[MatchPhase::Pregame, MatchPhase::Ingame],
        )?;
        if let Some((number, test_mode)) = expected {
            if context.match_number != number || context.test_mode != test_mode {
                return Err(MatchmakingError::MatchNotFound {
                    match_number: number,
                });
            }
        }

        let record = HistoryRecord::from_context(context, MatchOutcome::Cancelled, Vec::new());
        info!(
            "{} cancelled during {} after {} games, no ratings changed",
            record.label,
            context.phase,
            record.games.len()
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_match_closed(context.test_mode, true);
        }

        state.active = None;
        staged.archived.push(record.clone());
        let started = self.start_pregame(state)?;
        Ok(MatchClosed { record, started })
    }

    /// Add a player to the queue; a join that fills the queue starts a Pregame
    pub async fn join_queue(&self, player_id: &str, alias: &str) -> Result<JoinResult> {
        self.transact(|state, _| {
            let live = state.live_roster();
            let outcome = state.queue.join(player_id, &live)?;
            self.ratings.get_or_create(player_id, alias)?;
            if let Some(metrics) = &self.metrics {
                metrics.record_queue_join(outcome.size);
            }

            let started = if outcome.queue_full {
                self.start_pregame(state)?
            } else {
                None
            };
            Ok(JoinResult { outcome, started })
        })
        .await
    }

    /// Remove a player from the queue; returns whether they were queued
    pub async fn leave_queue(&self, player_id: &str) -> Result<bool> {
        self.transact(|state, _| {
            let removed = state.queue.leave(player_id);
            if removed {
                if let Some(metrics) = &self.metrics {
                    metrics.record_queue_leave(state.queue.len());
                }
            }
            Ok(removed)
        })
        .await
    }

    /// Clear the queue; refused while a match is in Pregame or Ingame
    pub async fn reset_queue(&self) -> Result<usize> {
        self.transact(|state, _| {
            let phase = state.phase();
            state.queue.reset(phase)
        })
        .await
    }

    pub async fn queue_status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        state.queue.status(self.ratings.as_ref())
    }

    /// Queue status for a "players needed" announcement
    pub async fn ping_queue(&self) -> QueueStatus {
        let status = self.queue_status().await;
        info!(
            "Queue ping: {}/{} waiting, {} needed",
            status.size, status.capacity, status.players_needed
        );
        status
    }

    /// Start a non-scoring match for an explicit roster
    pub async fn start_test_match(&self, roster_ids: Vec<PlayerId>) -> Result<MatchSummary> {
        self.transact(|state, _| {
            let current = state.phase();
            if current != MatchPhase::Idle {
                return Err(MatchmakingError::IllegalTransition {
                    current,
                    requested: LifecycleAction::StartTestMatch,
                });
            }
            let expected = self.capacity();
            if roster_ids.len() != expected {
                return Err(MatchmakingError::InvalidRosterSize {
                    expected,
                    actual: roster_ids.len(),
                });
            }
            let unique: HashSet<&PlayerId> = roster_ids.iter().collect();
            if unique.len() != roster_ids.len() {
                return Err(MatchmakingError::InvalidPartition {
                    reason: "roster contains the same player twice".to_string(),
                });
            }

            let mut roster = Vec::with_capacity(roster_ids.len());
            for id in &roster_ids {
                let player = self.ratings.get_or_create(id, id)?;
                roster.push(RosterPlayer {
                    id: player.id,
                    mmr: player.mmr,
                });
            }
            let pulled = state.queue.remove_all(&roster_ids);
            if pulled > 0 {
                debug!("{} test match players removed from the queue", pulled);
            }

            let number = state.counters.next(true);
            let context = MatchContext::new(number, true, roster);
            info!("{} entering Pregame (non-scoring)", context.label());
            if let Some(metrics) = &self.metrics {
                metrics.record_match_started(true, &[]);
            }

            let summary = self.summary(&context);
            state.active = Some(context);
            Ok(summary)
        })
        .await
    }

    /// Form teams and start the series (Pregame -> Ingame)
    ///
    /// Any roster member may choose the formation; in a test match the
    /// roster is the set of testers.
    pub async fn select_teams(
        &self,
        requested_by: &str,
        request: FormationRequest,
    ) -> Result<MatchSummary> {
        self.transact(|state, _| {
            let context = state.active_in(LifecycleAction::SelectTeams, &[MatchPhase::Pregame])?;
            require_roster_member(context, requested_by)?;
            let (team_a, team_b) = self.formation.form(&context.roster, &request)?;
            debug!(
                "{}: '{}' chose {} formation",
                context.label(),
                requested_by,
                request.mode()
            );
            self.enter_ingame(context, request.mode(), team_a, team_b)?;
            Ok(self.summary(context))
        })
        .await
    }

    /// Start a live captains draft; the highest-MMR pair captains by default
    pub async fn begin_captains_draft(
        &self,
        requested_by: &str,
        captains: Option<(PlayerId, PlayerId)>,
    ) -> Result<DraftProgress> {
        self.transact(|state, _| {
            let context = state.active_in(LifecycleAction::DraftPick, &[MatchPhase::Pregame])?;
            require_roster_member(context, requested_by)?;
            if context.draft.is_some() {
                return Err(MatchmakingError::InvalidPick {
                    reason: "a draft is already in progress".to_string(),
                });
            }
            self.formation.check_roster(&context.roster)?;

            let draft = DraftState::new(&context.roster, captains)?;
            let progress = draft.progress();
            info!(
                "{} captains draft started, {:?} picks first",
                context.label(),
                progress.next_picker
            );
            context.mode = Some(FormationMode::CaptainsDraft);
            context.draft = Some(draft);
            context.touch();
            Ok(progress)
        })
        .await
    }

    /// Record one draft pick; the final pick moves the match Ingame
    pub async fn draft_pick(&self, captain: &str, player: &str) -> Result<DraftPickResult> {
        self.transact(|state, _| {
            let context = state.active_in(LifecycleAction::DraftPick, &[MatchPhase::Pregame])?;
            let draft = context
                .draft
                .as_mut()
                .ok_or_else(|| MatchmakingError::InvalidPick {
                    reason: "no draft is in progress".to_string(),
                })?;
            let progress = draft.pick(captain, player)?;
            let complete = draft.is_complete();

            let mut teams_finalized = None;
            if complete {
                if let Some(draft) = context.draft.take() {
                    let (team_a, team_b) = draft.into_teams()?;
                    self.enter_ingame(context, FormationMode::CaptainsDraft, team_a, team_b)?;
                    teams_finalized = Some(self.summary(context));
                }
            } else {
                context.touch();
            }
            Ok(DraftPickResult {
                progress,
                teams_finalized,
            })
        })
        .await
    }

    /// Exchange two players between teams, allowed until the first result
    pub async fn swap_players(&self, first: &str, second: &str) -> Result<SwapResult> {
        self.transact(|state, _| {
            let phase = state.phase();
            let context = match state.active.as_mut() {
                Some(context) if matches!(phase, MatchPhase::Pregame | MatchPhase::Ingame) => {
                    context
                }
                _ => return Err(MatchmakingError::InvalidSwapState { phase }),
            };
            if context
                .series
                .as_ref()
                .is_some_and(|series| series.has_results())
            {
                return Err(MatchmakingError::InvalidSwapState { phase });
            }
            if first == second {
                return Err(MatchmakingError::InvalidSwap {
                    reason: "a player cannot be swapped with themselves".to_string(),
                });
            }

            match context.draft.as_mut() {
                Some(draft) => draft.swap(first, second)?,
                None => {
                    if context.team_a.is_empty() && context.team_b.is_empty() {
                        return Err(MatchmakingError::InvalidSwap {
                            reason: "teams have not been formed yet".to_string(),
                        });
                    }
                    swap_between(&mut context.team_a, &mut context.team_b, first, second)?;
                }
            }

            let swap = SwapRecord {
                first: first.to_string(),
                second: second.to_string(),
                phase,
                swapped_at: current_timestamp(),
            };
            info!("{}: swapped '{}' and '{}'", context.label(), first, second);
            context.swaps.push(swap.clone());
            context.touch();
            Ok(SwapResult {
                swap,
                summary: self.summary(context),
            })
        })
        .await
    }

    pub async fn cast_vote(&self, player_id: &str, choice: &str) -> Result<Vec<VoteTally>> {
        self.transact(|state, _| {
            let context = state.active_in(LifecycleAction::Vote, &[MatchPhase::Ingame])?;
            series_mut(context)?.cast_vote(player_id, choice)
        })
        .await
    }

    /// Close voting for the current game; returns the committed choice
    pub async fn close_voting(&self) -> Result<String> {
        self.transact(|state, _| {
            let context = state.active_in(LifecycleAction::Vote, &[MatchPhase::Ingame])?;
            series_mut(context)?.close_voting()
        })
        .await
    }

    /// Record the winner of the current game; a series win moves to Postgame
    pub async fn record_game_result(&self, winner: TeamLabel) -> Result<GameRecorded> {
        self.transact(|state, _| {
            let context = state.active_in(LifecycleAction::RecordGame, &[MatchPhase::Ingame])?;
            let series = series_mut(context)?;
            let outcome = series.record_game_result(winner)?;
            let game = series
                .games()
                .last()
                .cloned()
                .ok_or_else(|| MatchmakingError::InternalError {
                    message: "recorded game missing from series".to_string(),
                })?;

            if let GameOutcome::SeriesComplete { winner } = outcome {
                context.phase = MatchPhase::Postgame;
                info!("{} is Postgame, {} won", context.label(), winner);
            }
            context.touch();
            if let Some(metrics) = &self.metrics {
                metrics.record_game_recorded();
            }
            Ok(GameRecorded {
                game,
                outcome,
                summary: self.summary(context),
            })
        })
        .await
    }

    /// Correct the winner of a recorded game
    pub async fn correct_game_result(
        &self,
        game_index: u32,
        winner: TeamLabel,
    ) -> Result<GameOutcome> {
        self.transact(|state, _| {
            let context = state.active_in(LifecycleAction::CorrectGame, &[MatchPhase::Ingame])?;
            let outcome = series_mut(context)?.correct_game_result(game_index, winner)?;
            if let GameOutcome::SeriesComplete { winner } = outcome {
                context.phase = MatchPhase::Postgame;
                info!(
                    "{} is Postgame after correction, {} won",
                    context.label(),
                    winner
                );
            }
            context.touch();
            Ok(outcome)
        })
        .await
    }

    /// Apply ratings (ranked only), archive the match and return to Idle
    pub async fn finalize_match(&self) -> Result<MatchClosed> {
        self.transact(|state, staged| {
            let context = state.active_in(LifecycleAction::Finalize, &[MatchPhase::Postgame])?;
            let series = context
                .series
                .as_ref()
                .ok_or_else(|| MatchmakingError::InternalError {
                    message: "Postgame match has no series".to_string(),
                })?;
            let winner = series
                .winner()
                .ok_or_else(|| MatchmakingError::InternalError {
                    message: "Postgame series has no winner".to_string(),
                })?;

            let deltas = if context.test_mode {
                info!("{} is a test match, ratings unchanged", context.label());
                Vec::new()
            } else {
                let deltas = self.ratings.preview_result(
                    context.team(winner),
                    context.team(winner.opponent()),
                    series.games(),
                )?;
                staged.result = Some(StagedResult {
                    winner,
                    deltas: deltas.clone(),
                    games: series.games().to_vec(),
                });
                deltas
            };

            let record = HistoryRecord::from_context(
                context,
                MatchOutcome::Finalized { winner },
                deltas,
            );
            info!(
                "{} finalized: {} won {}-{}",
                record.label,
                winner,
                series.wins(winner),
                series.wins(winner.opponent())
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_match_closed(context.test_mode, false);
            }

            state.active = None;
            staged.archived.push(record.clone());
            let started = self.start_pregame(state)?;
            Ok(MatchClosed { record, started })
        })
        .await
    }

    /// Cancel whatever match is live
    pub async fn cancel_current(&self) -> Result<MatchClosed> {
        self.transact(|state, staged| self.cancel_in(state, staged, None))
            .await
    }

    /// Cancel the live match only if it is ranked or test match `match_number`
    pub async fn cancel_match(&self, match_number: u64, test_mode: bool) -> Result<MatchClosed> {
        self.transact(|state, staged| {
            self.cancel_in(state, staged, Some((match_number, test_mode)))
        })
        .await
    }

    pub async fn link_account(&self, player_id: &str, handle: &str) -> Result<String> {
        self.transact(|_, _| self.ratings.link_account(player_id, handle))
            .await
    }

    pub async fn unlink_account(&self, player_id: &str) -> Result<Option<String>> {
        self.transact(|_, _| self.ratings.unlink_account(player_id))
            .await
    }

    pub async fn set_alias(&self, player_id: &str, alias: &str) -> Result<()> {
        self.transact(|_, _| self.ratings.set_alias(player_id, alias))
            .await
    }

    pub async fn set_hide_name(&self, player_id: &str, hide: bool) -> Result<()> {
        self.transact(|_, _| self.ratings.set_hide_name(player_id, hide))
            .await
    }

    /// Administrative MMR override; returns (old, new)
    pub async fn set_mmr(&self, player_id: &str, value: i64) -> Result<(i64, i64)> {
        self.transact(|_, _| self.ratings.set_mmr(player_id, value))
            .await
    }

    pub async fn refresh_ranks(&self) -> Result<Vec<RankChange>> {
        self.transact(|_, _| self.ratings.refresh_all_ranks())
            .await
    }

    pub async fn phase(&self) -> MatchPhase {
        self.state.lock().await.phase()
    }

    pub async fn match_status(&self) -> Option<MatchSummary> {
        let state = self.state.lock().await;
        state.active.as_ref().map(|context| self.summary(context))
    }

    /// Copy of the live match aggregate
    pub async fn match_context(&self) -> Option<MatchContext> {
        self.state.lock().await.active.clone()
    }

    /// Restore state from the stored snapshot
    ///
    /// A queue that was full while a match was live starts its Pregame here
    /// if the restored state is Idle.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let loaded = self.gateway.load().await?;
        let mut guard = self.state.lock().await;

        let Some(snapshot) = loaded else {
            return Ok(RecoveryReport {
                revision: guard.revision,
                phase: guard.phase(),
                queued: guard.queue.len(),
                players: self.ratings.len()?,
                resumed: None,
                started: None,
            });
        };

        let revision = snapshot.active_match.as_ref().map_or(snapshot.queue.revision, |m| {
            m.revision.max(snapshot.queue.revision)
        });
        let active = snapshot.active_match.map(|m| m.context);
        if let Some(context) = &active {
            if context.roster.len() != self.capacity() {
                warn!(
                    "{} has {} players but the queue now holds {}",
                    context.label(),
                    context.roster.len(),
                    self.capacity()
                );
            }
        }

        let mut next = LifecycleState {
            queue: QueueManager::from_entries(self.capacity(), snapshot.queue.entries),
            active,
            counters: snapshot.queue.counters,
            revision,
        };
        self.ratings.restore(snapshot.players)?;

        let resumed = next.active.as_ref().map(|context| self.summary(context));
        let started = self.start_pregame(&mut next)?;
        if started.is_some() {
            next.revision += 1;
            let snapshot = self.snapshot_of(&next)?;
            self.gateway.commit(snapshot);
        }

        let report = RecoveryReport {
            revision: next.revision,
            phase: next.phase(),
            queued: next.queue.len(),
            players: self.ratings.len()?,
            resumed,
            started,
        };
        *guard = next;
        self.update_gauges(&guard);

        info!(
            "Recovered at revision {}: {} with {} queued",
            report.revision, report.phase, report.queued
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RatingConfig;
    use crate::persistence::InMemorySnapshotStore;

    async fn lifecycle_with(store: Arc<InMemorySnapshotStore>) -> MatchLifecycle {
        let ratings = Arc::new(RatingStore::new(RatingConfig::default()).unwrap());
        let gateway = Arc::new(PersistenceGateway::spawn(
            store,
            &crate::config::PersistenceSettings::default(),
            None,
        ));
        MatchLifecycle::new(
            &QueueConfig::default(),
            SeriesConfig::default(),
            ratings,
            gateway,
        )
        .unwrap()
    }

    async fn lifecycle() -> MatchLifecycle {
        lifecycle_with(Arc::new(InMemorySnapshotStore::new())).await
    }

    async fn fill_queue(lifecycle: &MatchLifecycle) -> Option<MatchSummary> {
        let mut started = None;
        for i in 0..8 {
            let id = format!("p{}", i);
            let result = lifecycle.join_queue(&id, &id).await.unwrap();
            if result.started.is_some() {
                started = result.started;
            }
        }
        started
    }

    #[tokio::test]
    async fn test_full_queue_starts_pregame() {
        let lifecycle = lifecycle().await;
        let started = fill_queue(&lifecycle).await.expect("pregame should start");

        assert_eq!(started.label, "Series 1");
        assert_eq!(lifecycle.phase().await, MatchPhase::Pregame);
        assert_eq!(lifecycle.queue_status().await.size, 0);
    }

    #[tokio::test]
    async fn test_cancel_from_idle_is_illegal() {
        let lifecycle = lifecycle().await;
        let err = lifecycle.cancel_current().await.unwrap_err();
        assert!(matches!(
            err,
            MatchmakingError::IllegalTransition {
                current: MatchPhase::Idle,
                requested: LifecycleAction::Cancel
            }
        ));
    }

    #[tokio::test]
    async fn test_rejected_operation_leaves_state_unchanged() {
        let lifecycle = lifecycle().await;
        fill_queue(&lifecycle).await;
        let before = lifecycle.match_context().await;

        let err = lifecycle
            .select_teams("p0", FormationRequest::PlayersPick {
                team_a: vec!["p0".to_string()],
                team_b: vec!["p1".to_string()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MatchmakingError::InvalidPartition { .. }));
        assert_eq!(lifecycle.match_context().await, before);
    }

    #[tokio::test]
    async fn test_player_in_live_match_cannot_queue() {
        let lifecycle = lifecycle().await;
        fill_queue(&lifecycle).await;
        let err = lifecycle.join_queue("p3", "p3").await.unwrap_err();
        assert!(matches!(err, MatchmakingError::AlreadyInMatch { .. }));
    }

    #[tokio::test]
    async fn test_swap_blocked_after_first_result() {
        let lifecycle = lifecycle().await;
        fill_queue(&lifecycle).await;
        let summary = lifecycle
            .select_teams("p0", FormationRequest::Balanced)
            .await
            .unwrap();
        let a = summary.team_a.players[0].player_id.clone();
        let b = summary.team_b.players[0].player_id.clone();

        lifecycle.swap_players(&a, &b).await.unwrap();
        lifecycle.record_game_result(TeamLabel::A).await.unwrap();

        let err = lifecycle.swap_players(&a, &b).await.unwrap_err();
        assert!(matches!(
            err,
            MatchmakingError::InvalidSwapState {
                phase: MatchPhase::Ingame
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_match_checks_number() {
        let lifecycle = lifecycle().await;
        fill_queue(&lifecycle).await;

        let err = lifecycle.cancel_match(2, false).await.unwrap_err();
        assert!(matches!(err, MatchmakingError::MatchNotFound { match_number: 2 }));

        let closed = lifecycle.cancel_match(1, false).await.unwrap();
        assert_eq!(closed.record.outcome, MatchOutcome::Cancelled);
        assert_eq!(lifecycle.phase().await, MatchPhase::Idle);
        // Roster is not put back in the queue
        assert_eq!(lifecycle.queue_status().await.size, 0);
    }

    #[tokio::test]
    async fn test_live_draft_finalizes_on_last_pick() {
        let lifecycle = lifecycle().await;
        fill_queue(&lifecycle).await;

        let progress = lifecycle
            .begin_captains_draft("p3", Some(("p0".to_string(), "p1".to_string())))
            .await
            .unwrap();
        assert_eq!(progress.next_picker.as_deref(), Some("p0"));

        let picks = [
            ("p0", "p2"),
            ("p1", "p3"),
            ("p0", "p4"),
            ("p1", "p5"),
            ("p0", "p6"),
        ];
        for (captain, player) in picks {
            let result = lifecycle.draft_pick(captain, player).await.unwrap();
            assert!(result.teams_finalized.is_none());
        }
        let err = lifecycle.draft_pick("p0", "p7").await.unwrap_err();
        assert!(matches!(err, MatchmakingError::InvalidPick { .. }));

        let last = lifecycle.draft_pick("p1", "p7").await.unwrap();
        let summary = last.teams_finalized.expect("teams should be final");
        assert_eq!(summary.phase, MatchPhase::Ingame);
        assert_eq!(summary.mode, Some(FormationMode::CaptainsDraft));
    }

    #[tokio::test]
    async fn test_test_match_skips_ratings() {
        let lifecycle = lifecycle().await;
        let roster: Vec<PlayerId> = (0..8).map(|i| format!("t{}", i)).collect();
        let summary = lifecycle.start_test_match(roster).await.unwrap();
        assert_eq!(summary.label, "Test 1");
        assert!(summary.test_mode);

        lifecycle
            .select_teams("t3", FormationRequest::Balanced)
            .await
            .unwrap();
        for _ in 0..4 {
            lifecycle.record_game_result(TeamLabel::B).await.unwrap();
        }
        let closed = lifecycle.finalize_match().await.unwrap();
        assert!(closed.record.rating_deltas.is_empty());
        assert_eq!(lifecycle.ratings().require("t0").unwrap().mmr, 1500);
        assert_eq!(lifecycle.ratings().require("t0").unwrap().xp, 0);
    }

    #[tokio::test]
    async fn test_correction_moves_to_postgame() {
        let lifecycle = lifecycle().await;
        fill_queue(&lifecycle).await;
        lifecycle
            .select_teams("p0", FormationRequest::Balanced)
            .await
            .unwrap();
        for winner in [TeamLabel::A, TeamLabel::A, TeamLabel::A, TeamLabel::B] {
            lifecycle.record_game_result(winner).await.unwrap();
        }
        assert_eq!(lifecycle.phase().await, MatchPhase::Ingame);

        let outcome = lifecycle
            .correct_game_result(4, TeamLabel::A)
            .await
            .unwrap();
        assert_eq!(outcome, GameOutcome::SeriesComplete { winner: TeamLabel::A });
        assert_eq!(lifecycle.phase().await, MatchPhase::Postgame);

        let err = lifecycle.cancel_current().await.unwrap_err();
        assert!(matches!(
            err,
            MatchmakingError::IllegalTransition {
                current: MatchPhase::Postgame,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_recover_resumes_live_match() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let first = lifecycle_with(store.clone()).await;
        fill_queue(&first).await;
        first
            .select_teams("p0", FormationRequest::Balanced)
            .await
            .unwrap();
        first.record_game_result(TeamLabel::A).await.unwrap();
        first.join_queue("late", "Late").await.unwrap();
        first.gateway().flush().await.unwrap();
        let expected = first.match_context().await;

        let second = lifecycle_with(store).await;
        let report = second.recover().await.unwrap();
        assert_eq!(report.phase, MatchPhase::Ingame);
        assert_eq!(report.queued, 1);
        assert_eq!(second.match_context().await, expected);
        assert_eq!(second.ratings().require("late").unwrap().alias, "Late");
    }

    #[tokio::test]
    async fn test_cancel_match_checks_kind() {
        let lifecycle = lifecycle().await;
        let testers: Vec<PlayerId> = (0..8).map(|i| format!("t{}", i)).collect();
        lifecycle.start_test_match(testers).await.unwrap();

        // Ranked and test numbering both start at 1
        let err = lifecycle.cancel_match(1, false).await.unwrap_err();
        assert!(matches!(err, MatchmakingError::MatchNotFound { match_number: 1 }));
        assert_eq!(lifecycle.phase().await, MatchPhase::Pregame);

        let closed = lifecycle.cancel_match(1, true).await.unwrap();
        assert_eq!(closed.record.label, "Test 1");
        assert_eq!(lifecycle.phase().await, MatchPhase::Idle);
    }

    #[tokio::test]
    async fn test_only_roster_members_choose_formation() {
        let lifecycle = lifecycle().await;
        fill_queue(&lifecycle).await;

        let err = lifecycle
            .select_teams("outsider", FormationRequest::Balanced)
            .await
            .unwrap_err();
        assert!(matches!(err, MatchmakingError::NotInMatch { .. }));
        let err = lifecycle
            .begin_captains_draft("outsider", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MatchmakingError::NotInMatch { .. }));
        assert_eq!(lifecycle.phase().await, MatchPhase::Pregame);

        let summary = lifecycle
            .select_teams("p5", FormationRequest::Balanced)
            .await
            .unwrap();
        assert_eq!(summary.phase, MatchPhase::Ingame);
    }

    #[tokio::test]
    async fn test_only_testers_choose_test_match_formation() {
        let lifecycle = lifecycle().await;
        fill_queue(&lifecycle).await;
        lifecycle.cancel_current().await.unwrap();

        let testers: Vec<PlayerId> = (0..8).map(|i| format!("t{}", i)).collect();
        lifecycle.start_test_match(testers).await.unwrap();
        let err = lifecycle
            .select_teams("p0", FormationRequest::Balanced)
            .await
            .unwrap_err();
        assert!(matches!(err, MatchmakingError::NotInMatch { .. }));
        lifecycle
            .select_teams("t7", FormationRequest::Balanced)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_finalize_writes_no_ratings() {
        let lifecycle = lifecycle().await;
        fill_queue(&lifecycle).await;
        lifecycle
            .select_teams("p0", FormationRequest::Balanced)
            .await
            .unwrap();
        for _ in 0..4 {
            lifecycle.record_game_result(TeamLabel::A).await.unwrap();
        }

        // One roster record goes missing, so the result cannot be computed
        let mut records = lifecycle.ratings().snapshot().unwrap();
        records.retain(|player| player.id != "p7");
        lifecycle.ratings().restore(records).unwrap();

        let err = lifecycle.finalize_match().await.unwrap_err();
        assert!(matches!(err, MatchmakingError::PlayerNotFound { .. }));
        assert_eq!(lifecycle.phase().await, MatchPhase::Postgame);
        for i in 0..7 {
            let player = lifecycle.ratings().require(&format!("p{}", i)).unwrap();
            assert_eq!((player.mmr, player.xp), (1500, 0));
        }
    }
}
