//! Maps commands onto lifecycle and rating operations
//!
//! Collaborator calls happen only after the lifecycle has committed the
//! change; their failures are collected on the response.

use crate::collaborators::{AccountLinker, VoiceChannels};
use crate::commands::{Command, CommandOutcome, CommandResponse, DEFAULT_LEADERBOARD_LIMIT};
use crate::error::{MatchmakingError, Result};
use crate::lifecycle::{GameRecorded, MatchClosed, MatchLifecycle, MatchSummary};
use crate::metrics::MetricsCollector;
use crate::series::GameOutcome;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Entry point for every transport
pub struct CommandDispatcher {
    lifecycle: Arc<MatchLifecycle>,
    voice: Arc<dyn VoiceChannels>,
    linker: Arc<dyn AccountLinker>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl CommandDispatcher {
    pub fn new(
        lifecycle: Arc<MatchLifecycle>,
        voice: Arc<dyn VoiceChannels>,
        linker: Arc<dyn AccountLinker>,
    ) -> Self {
        Self {
            lifecycle,
            voice,
            linker,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn lifecycle(&self) -> &Arc<MatchLifecycle> {
        &self.lifecycle
    }

    /// Run one command to completion
    pub async fn dispatch(&self, command: Command) -> Result<CommandResponse> {
        let name = command.name();
        let started = Instant::now();
        debug!("Dispatching {}", name);

        let result = self.execute(command).await;

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_command(name, result.as_ref().err().map(|e| e.kind()), elapsed);
        }
        match &result {
            Ok(response) if !response.collaborator_errors.is_empty() => warn!(
                "{} committed with {} collaborator failures",
                name,
                response.collaborator_errors.len()
            ),
            Ok(_) => debug!("{} completed in {:.2}ms", name, elapsed.as_secs_f64() * 1000.0),
            Err(e) => warn!("{} rejected ({}): {}", name, e.kind().as_str(), e),
        }
        result
    }

    async fn execute(&self, command: Command) -> Result<CommandResponse> {
        let lifecycle = &self.lifecycle;
        let ratings = lifecycle.ratings();

        let response = match command {
            Command::JoinQueue { player_id, alias } => {
                let joined = lifecycle.join_queue(&player_id, &alias).await?;
                CommandResponse::new(CommandOutcome::Joined(joined))
            }
            Command::LeaveQueue { player_id } => {
                let removed = lifecycle.leave_queue(&player_id).await?;
                CommandResponse::new(CommandOutcome::Left { removed })
            }
            Command::PingQueue => CommandResponse::new(CommandOutcome::Queue(
                lifecycle.ping_queue().await,
            )),
            Command::QueueStatus => CommandResponse::new(CommandOutcome::Queue(
                lifecycle.queue_status().await,
            )),
            Command::ResetQueue => {
                let cleared = lifecycle.reset_queue().await?;
                CommandResponse::new(CommandOutcome::QueueReset { cleared })
            }
            Command::MatchStatus => CommandResponse::new(CommandOutcome::Match {
                summary: lifecycle.match_status().await,
            }),
            Command::StartTestMatch { roster } => {
                let summary = lifecycle.start_test_match(roster).await?;
                CommandResponse::new(CommandOutcome::MatchStarted(summary))
            }
            Command::SelectTeams {
                requested_by,
                request,
            } => {
                let summary = lifecycle.select_teams(&requested_by, request).await?;
                let mut response =
                    CommandResponse::new(CommandOutcome::TeamsSelected(summary.clone()));
                self.prepare_voice(&summary, &mut response.collaborator_errors)
                    .await;
                response
            }
            Command::BeginDraft {
                requested_by,
                captains,
            } => {
                let progress = lifecycle
                    .begin_captains_draft(&requested_by, captains)
                    .await?;
                CommandResponse::new(CommandOutcome::DraftStarted(progress))
            }
            Command::DraftPick { captain, player } => {
                let picked = lifecycle.draft_pick(&captain, &player).await?;
                let summary = picked.teams_finalized.clone();
                let mut response = CommandResponse::new(CommandOutcome::DraftPicked(picked));
                if let Some(summary) = summary {
                    self.prepare_voice(&summary, &mut response.collaborator_errors)
                        .await;
                }
                response
            }
            Command::SwapPlayers { first, second } => {
                let swapped = lifecycle.swap_players(&first, &second).await?;
                CommandResponse::new(CommandOutcome::Swapped(swapped))
            }
            Command::CastVote { player_id, choice } => {
                let tally = lifecycle.cast_vote(&player_id, &choice).await?;
                CommandResponse::new(CommandOutcome::Votes { tally })
            }
            Command::CloseVoting => {
                let choice = lifecycle.close_voting().await?;
                CommandResponse::new(CommandOutcome::VotingClosed { choice })
            }
            Command::ReportWinner { team } => {
                let recorded = lifecycle.record_game_result(team).await?;
                self.game_recorded_response(recorded).await
            }
            Command::CorrectGame { game_index, team } => {
                let outcome = lifecycle.correct_game_result(game_index, team).await?;
                let mut errors = Vec::new();
                let (finalized, finalize_error) = self.auto_finalize(outcome, &mut errors).await;
                CommandResponse {
                    outcome: CommandOutcome::GameCorrected {
                        outcome,
                        finalized,
                        finalize_error,
                    },
                    collaborator_errors: errors,
                }
            }
            Command::FinalizeMatch => {
                let closed = lifecycle.finalize_match().await?;
                self.closed_response(closed).await
            }
            Command::CancelMatch {
                match_number,
                test_mode,
            } => {
                let closed = lifecycle.cancel_match(match_number, test_mode).await?;
                self.closed_response(closed).await
            }
            Command::CancelCurrent => {
                let closed = lifecycle.cancel_current().await?;
                self.closed_response(closed).await
            }
            Command::GetRank { player_id } => {
                CommandResponse::new(CommandOutcome::Rank(ratings.rank_info(&player_id)?))
            }
            Command::GetLeaderboard { sort, limit } => {
                let entries =
                    ratings.leaderboard(sort, limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT))?;
                CommandResponse::new(CommandOutcome::Leaderboard { entries })
            }
            Command::GetStats { player_id } => {
                CommandResponse::new(CommandOutcome::Stats(ratings.stats(&player_id)?))
            }
            Command::SetMmr { player_id, value } => {
                let (old_mmr, new_mmr) = lifecycle.set_mmr(&player_id, value).await?;
                CommandResponse::new(CommandOutcome::MmrSet {
                    player_id,
                    old_mmr,
                    new_mmr,
                })
            }
            Command::RefreshRanks => {
                let changes = lifecycle.refresh_ranks().await?;
                CommandResponse::new(CommandOutcome::RanksRefreshed { changes })
            }
            Command::LinkAccount { player_id, handle } => {
                let handle = lifecycle.link_account(&player_id, &handle).await?;
                let mut response = CommandResponse::new(CommandOutcome::AccountLinked {
                    handle: handle.clone(),
                });
                if let Err(e) = self.linker.account_linked(&player_id, &handle).await {
                    response.collaborator_errors.push(collaborator_failure(
                        "account link notification",
                        e,
                    ));
                }
                response
            }
            Command::UnlinkAccount { player_id } => {
                let handle = lifecycle.unlink_account(&player_id).await?;
                let mut response = CommandResponse::new(CommandOutcome::AccountUnlinked {
                    handle: handle.clone(),
                });
                if let Some(handle) = handle {
                    if let Err(e) = self.linker.account_unlinked(&player_id, &handle).await {
                        response.collaborator_errors.push(collaborator_failure(
                            "account unlink notification",
                            e,
                        ));
                    }
                }
                response
            }
            Command::SetAlias { player_id, alias } => {
                lifecycle.set_alias(&player_id, &alias).await?;
                CommandResponse::new(CommandOutcome::AliasSet { alias })
            }
            Command::HidePlayerNames { player_id } => {
                lifecycle.set_hide_name(&player_id, true).await?;
                CommandResponse::new(CommandOutcome::PrivacySet { hidden: true })
            }
            Command::ShowPlayerNames { player_id } => {
                lifecycle.set_hide_name(&player_id, false).await?;
                CommandResponse::new(CommandOutcome::PrivacySet { hidden: false })
            }
        };
        Ok(response)
    }

    /// Response for a game result that has already committed
    async fn game_recorded_response(&self, recorded: GameRecorded) -> CommandResponse {
        let mut errors = Vec::new();
        let (finalized, finalize_error) = self.auto_finalize(recorded.outcome, &mut errors).await;
        CommandResponse {
            outcome: CommandOutcome::GameRecorded {
                recorded,
                finalized,
                finalize_error,
            },
            collaborator_errors: errors,
        }
    }

    /// Finalize right away when the series is over and auto-finalize is on
    ///
    /// Runs as its own transaction after the result committed, so another
    /// caller may have closed the match first. A failure is returned as a
    /// message rather than rejecting the committed result.
    async fn auto_finalize(
        &self,
        outcome: GameOutcome,
        errors: &mut Vec<String>,
    ) -> (Option<Box<MatchClosed>>, Option<String>) {
        if !matches!(outcome, GameOutcome::SeriesComplete { .. })
            || !self.lifecycle.series_config().auto_finalize
        {
            return (None, None);
        }

        match self.lifecycle.finalize_match().await {
            Ok(closed) => {
                info!("{} auto-finalized", closed.record.label);
                self.release_voice(&closed.record.label, errors).await;
                (Some(Box::new(closed)), None)
            }
            Err(e) => {
                warn!("Automatic finalize skipped: {}", e);
                (None, Some(format!("automatic finalize failed: {}", e)))
            }
        }
    }

    async fn closed_response(&self, closed: MatchClosed) -> CommandResponse {
        let mut errors = Vec::new();
        self.release_voice(&closed.record.label, &mut errors).await;
        CommandResponse {
            outcome: CommandOutcome::MatchClosed(Box::new(closed)),
            collaborator_errors: errors,
        }
    }

    async fn prepare_voice(&self, summary: &MatchSummary, errors: &mut Vec<String>) {
        if let Err(e) = self.voice.prepare_match(summary).await {
            errors.push(collaborator_failure("voice channel setup", e));
        }
    }

    async fn release_voice(&self, label: &str, errors: &mut Vec<String>) {
        if let Err(e) = self.voice.release_match(label).await {
            errors.push(collaborator_failure("voice channel cleanup", e));
        }
    }
}

fn collaborator_failure(what: &str, error: MatchmakingError) -> String {
    warn!("{} failed: {}", what, error);
    format!("{} failed: {}", what, error)
}
