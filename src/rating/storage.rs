//! Player record storage and rating updates
//!
//! The store owns every [`Player`] record. Records are created lazily and
//! never deleted. A series result is computed in full before any record is
//! written, so a failure leaves every player untouched.

use crate::accounts::normalize_handle;
use crate::config::RatingConfig;
use crate::error::{MatchmakingError, Result};
use crate::rating::calculator::{calculator_for, RatingDeltaCalculator};
use crate::rating::levels::LevelTable;
use crate::types::{GameResult, Player, PlayerId, Team, TeamLabel};
use crate::utils::{average_mmr, current_timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Read-only player lookup, used by public projections
pub trait PlayerDirectory {
    fn lookup(&self, player_id: &str) -> Option<Player>;
}

/// Change applied to one player by a finalized series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingDelta {
    pub player_id: PlayerId,
    pub team: TeamLabel,
    pub old_mmr: i64,
    pub new_mmr: i64,
    pub xp_gained: i64,
    pub old_level: u8,
    pub new_level: u8,
}

impl RatingDelta {
    pub fn mmr_change(&self) -> i64 {
        self.new_mmr - self.old_mmr
    }
}

/// A published level that moved during a rank refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankChange {
    pub player_id: PlayerId,
    pub old_level: u8,
    pub new_level: u8,
}

/// Leaderboard ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LeaderboardSort {
    /// Level, then XP
    #[default]
    Level,
    Mmr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub position: usize,
    pub player_id: PlayerId,
    pub display_name: String,
    pub level: u8,
    pub xp: i64,
    pub mmr: i64,
    pub wins: u32,
    pub losses: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player_id: PlayerId,
    pub alias: String,
    pub mmr: i64,
    pub level: u8,
    pub xp: i64,
    pub wins: u32,
    pub losses: u32,
    pub series_wins: u32,
    pub series_losses: u32,
    /// Fraction of games won, 0.0 with no games played
    pub win_rate: f64,
    pub linked_handle: Option<String>,
}

/// Rank card for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankInfo {
    pub player_id: PlayerId,
    pub display_name: String,
    pub level: u8,
    pub xp: i64,
    pub xp_into_level: i64,
    pub xp_to_next: Option<i64>,
    pub mmr: i64,
}

/// In-memory player directory with rating update rules
#[derive(Debug)]
pub struct RatingStore {
    players: RwLock<HashMap<PlayerId, Player>>,
    config: RatingConfig,
    levels: LevelTable,
    calculator: Box<dyn RatingDeltaCalculator>,
}

impl RatingStore {
    /// Create an empty store from validated configuration
    pub fn new(config: RatingConfig) -> Result<Self> {
        config.validate()?;
        let levels = LevelTable::new(&config.level_thresholds);
        let calculator = calculator_for(&config.formula);
        info!(
            "Rating store ready: formula={}, default_mmr={}, xp_per_game={}, xp_win_bonus={}",
            calculator.name(),
            config.default_mmr,
            config.xp_per_game,
            config.xp_win_bonus
        );
        Ok(Self {
            players: RwLock::new(HashMap::new()),
            config,
            levels,
            calculator,
        })
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<PlayerId, Player>>> {
        self.players
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("players"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<PlayerId, Player>>> {
        self.players
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("players"))
    }

    /// Fetch a player, creating the record with default MMR on first sight
    pub fn get_or_create(&self, player_id: &str, alias: &str) -> Result<Player> {
        let mut players = self.write()?;
        let player = players.entry(player_id.to_string()).or_insert_with(|| {
            info!("Created player record for '{}'", player_id);
            let alias = if alias.trim().is_empty() {
                player_id
            } else {
                alias.trim()
            };
            Player::new(
                player_id.to_string(),
                alias.to_string(),
                self.config.default_mmr,
            )
        });
        Ok(player.clone())
    }

    pub fn get(&self, player_id: &str) -> Result<Option<Player>> {
        Ok(self.read()?.get(player_id).cloned())
    }

    /// Fetch a player that must already exist
    pub fn require(&self, player_id: &str) -> Result<Player> {
        self.get(player_id)?
            .ok_or_else(|| MatchmakingError::PlayerNotFound {
                player_id: player_id.to_string(),
            })
    }

    /// Compute the changes a series result would apply, without writing them
    pub fn preview_result(
        &self,
        winning: &Team,
        losing: &Team,
        games: &[GameResult],
    ) -> Result<Vec<RatingDelta>> {
        let players = self.read()?;
        let lookup = |id: &PlayerId| {
            players
                .get(id)
                .ok_or_else(|| MatchmakingError::PlayerNotFound {
                    player_id: id.clone(),
                })
        };

        let mmrs = |team: &Team| -> Result<Vec<i64>> {
            team.players.iter().map(|id| lookup(id).map(|p| p.mmr)).collect()
        };
        let winner_avg = average_mmr(&mmrs(winning)?);
        let loser_avg = average_mmr(&mmrs(losing)?);
        let team_deltas = self.calculator.deltas(winner_avg, loser_avg);

        debug!(
            "Series deltas: winners avg {:.1} +{}, losers avg {:.1} -{}",
            winner_avg, team_deltas.winner_gain, loser_avg, team_deltas.loser_loss
        );

        let games_played = games.len() as i64;
        let mut deltas = Vec::with_capacity(winning.len() + losing.len());
        for (team, mmr_change) in [
            (winning, team_deltas.winner_gain),
            (losing, -team_deltas.loser_loss),
        ] {
            let games_won = games.iter().filter(|g| g.winner == team.label).count() as i64;
            let xp_gained =
                self.config.xp_per_game * games_played + self.config.xp_win_bonus * games_won;
            for id in &team.players {
                let player = lookup(id)?;
                let new_xp = player.xp + xp_gained;
                deltas.push(RatingDelta {
                    player_id: id.clone(),
                    team: team.label,
                    old_mmr: player.mmr,
                    new_mmr: (player.mmr + mmr_change).max(self.config.mmr_floor),
                    xp_gained,
                    old_level: self.levels.level_for(player.xp),
                    new_level: self.levels.level_for(new_xp),
                });
            }
        }
        Ok(deltas)
    }

    /// Apply a completed series to every player on both teams
    pub fn apply_result(
        &self,
        winning: &Team,
        losing: &Team,
        games: &[GameResult],
    ) -> Result<Vec<RatingDelta>> {
        let deltas = self.preview_result(winning, losing, games)?;
        self.commit_result(winning.label, &deltas, games)?;
        Ok(deltas)
    }

    /// Write deltas produced by [`RatingStore::preview_result`]
    pub fn commit_result(
        &self,
        winner: TeamLabel,
        deltas: &[RatingDelta],
        games: &[GameResult],
    ) -> Result<()> {
        let now = current_timestamp();

        let mut players = self.write()?;
        for delta in deltas {
            // Records are never removed
            let Some(player) = players.get_mut(&delta.player_id) else {
                continue;
            };
            let games_won = games.iter().filter(|g| g.winner == delta.team).count() as u32;
            let games_lost = games.len() as u32 - games_won;

            player.mmr = delta.new_mmr;
            player.xp += delta.xp_gained;
            player.published_level = self.levels.level_for(player.xp);
            player.wins += games_won;
            player.losses += games_lost;
            if delta.team == winner {
                player.series_wins += 1;
            } else {
                player.series_losses += 1;
            }
            player.last_updated = now;
        }

        info!(
            "Applied series result: {} won over {} games, {} players updated",
            winner,
            games.len(),
            deltas.len()
        );
        Ok(())
    }

    /// Administrative MMR override; returns (old, new)
    pub fn set_mmr(&self, player_id: &str, value: i64) -> Result<(i64, i64)> {
        let mut players = self.write()?;
        let player = players
            .get_mut(player_id)
            .ok_or_else(|| MatchmakingError::PlayerNotFound {
                player_id: player_id.to_string(),
            })?;

        let new_mmr = if value < self.config.mmr_floor {
            warn!(
                "Requested MMR {} for '{}' is below the floor, clamping to {}",
                value, player_id, self.config.mmr_floor
            );
            self.config.mmr_floor
        } else {
            value
        };
        let old_mmr = player.mmr;
        player.mmr = new_mmr;
        player.last_updated = current_timestamp();

        info!("MMR for '{}' set {} -> {}", player_id, old_mmr, new_mmr);
        Ok((old_mmr, new_mmr))
    }

    /// Recompute every published level from XP. MMR and XP are untouched.
    pub fn refresh_all_ranks(&self) -> Result<Vec<RankChange>> {
        let mut players = self.write()?;
        let mut changes = Vec::new();
        for player in players.values_mut() {
            let level = self.levels.level_for(player.xp);
            if level != player.published_level {
                changes.push(RankChange {
                    player_id: player.id.clone(),
                    old_level: player.published_level,
                    new_level: level,
                });
                player.published_level = level;
            }
        }
        changes.sort_by(|a, b| a.player_id.cmp(&b.player_id));

        info!(
            "Rank refresh complete: {} of {} players changed level",
            changes.len(),
            players.len()
        );
        Ok(changes)
    }

    pub fn rank_info(&self, player_id: &str) -> Result<RankInfo> {
        let player = self.require(player_id)?;
        let progress = self.levels.progress(player.xp);
        Ok(RankInfo {
            display_name: player.display_name().to_string(),
            player_id: player.id,
            level: progress.level,
            xp: player.xp,
            xp_into_level: progress.xp_into_level,
            xp_to_next: progress.xp_to_next,
            mmr: player.mmr,
        })
    }

    pub fn stats(&self, player_id: &str) -> Result<PlayerStats> {
        let player = self.require(player_id)?;
        let played = player.wins + player.losses;
        let win_rate = if played == 0 {
            0.0
        } else {
            player.wins as f64 / played as f64
        };
        Ok(PlayerStats {
            level: self.levels.level_for(player.xp),
            player_id: player.id,
            alias: player.alias,
            mmr: player.mmr,
            xp: player.xp,
            wins: player.wins,
            losses: player.losses,
            series_wins: player.series_wins,
            series_losses: player.series_losses,
            win_rate,
            linked_handle: player.linked_handle,
        })
    }

    /// Players ranked by `sort`, ties broken by player id
    pub fn leaderboard(&self, sort: LeaderboardSort, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let players = self.read()?;
        let mut ranked: Vec<&Player> = players.values().collect();
        match sort {
            LeaderboardSort::Level => ranked.sort_by(|a, b| {
                b.xp.cmp(&a.xp)
                    .then_with(|| b.mmr.cmp(&a.mmr))
                    .then_with(|| a.id.cmp(&b.id))
            }),
            LeaderboardSort::Mmr => ranked.sort_by(|a, b| {
                b.mmr
                    .cmp(&a.mmr)
                    .then_with(|| b.xp.cmp(&a.xp))
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }

        Ok(ranked
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(index, player)| LeaderboardEntry {
                position: index + 1,
                player_id: player.id.clone(),
                display_name: player.display_name().to_string(),
                level: self.levels.level_for(player.xp),
                xp: player.xp,
                mmr: player.mmr,
                wins: player.wins,
                losses: player.losses,
            })
            .collect())
    }

    fn update<F>(&self, player_id: &str, apply: F) -> Result<Player>
    where
        F: FnOnce(&mut Player),
    {
        let mut players = self.write()?;
        let player = players
            .entry(player_id.to_string())
            .or_insert_with(|| {
                Player::new(
                    player_id.to_string(),
                    player_id.to_string(),
                    self.config.default_mmr,
                )
            });
        apply(player);
        player.last_updated = current_timestamp();
        Ok(player.clone())
    }

    /// Link a streaming handle; returns the normalized handle
    pub fn link_account(&self, player_id: &str, handle: &str) -> Result<String> {
        let handle = normalize_handle(handle)?;
        let linked = handle.clone();
        self.update(player_id, move |player| player.linked_handle = Some(linked))?;
        info!("Player '{}' linked handle '{}'", player_id, handle);
        Ok(handle)
    }

    /// Remove a linked handle; returns the handle that was removed, if any
    pub fn unlink_account(&self, player_id: &str) -> Result<Option<String>> {
        let mut removed = None;
        self.update(player_id, |player| removed = player.linked_handle.take())?;
        if let Some(handle) = &removed {
            info!("Player '{}' unlinked handle '{}'", player_id, handle);
        }
        Ok(removed)
    }

    pub fn set_alias(&self, player_id: &str, alias: &str) -> Result<()> {
        let alias = alias.trim();
        if alias.is_empty() {
            return Err(MatchmakingError::InvalidHandle {
                handle: alias.to_string(),
            });
        }
        self.update(player_id, |player| player.alias = alias.to_string())?;
        debug!("Player '{}' alias set to '{}'", player_id, alias);
        Ok(())
    }

    pub fn set_hide_name(&self, player_id: &str, hide: bool) -> Result<()> {
        self.update(player_id, |player| player.hide_name = hide)?;
        debug!("Player '{}' hide_name={}", player_id, hide);
        Ok(())
    }

    /// All records ordered by id, for persistence
    pub fn snapshot(&self) -> Result<Vec<Player>> {
        let mut players: Vec<Player> = self.read()?.values().cloned().collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(players)
    }

    /// Replace every record with persisted ones
    pub fn restore(&self, records: Vec<Player>) -> Result<()> {
        let mut players = self.write()?;
        players.clear();
        for record in records {
            players.insert(record.id.clone(), record);
        }
        info!("Restored {} player records", players.len());
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}

impl PlayerDirectory for RatingStore {
    fn lookup(&self, player_id: &str) -> Option<Player> {
        self.get(player_id).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeltaFormula;

    fn store() -> RatingStore {
        RatingStore::new(RatingConfig::default()).unwrap()
    }

    fn team(label: TeamLabel, ids: &[&str]) -> Team {
        Team {
            label,
            players: ids.iter().map(|id| id.to_string()).collect(),
            captain: None,
        }
    }

    fn game(index: u32, winner: TeamLabel) -> GameResult {
        GameResult {
            game_index: index,
            choice: None,
            winner,
            recorded_at: current_timestamp(),
        }
    }

    fn seed(store: &RatingStore, ids: &[&str]) {
        for id in ids {
            store.get_or_create(id, id).unwrap();
        }
    }

    #[test]
    fn test_get_or_create_is_lazy_and_stable() {
        let store = store();
        let first = store.get_or_create("42", "Chief").unwrap();
        assert_eq!(first.mmr, 1500);
        let again = store.get_or_create("42", "Someone else").unwrap();
        assert_eq!(again.alias, "Chief");
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_apply_result_updates_both_teams() {
        let store = store();
        seed(&store, &["a1", "a2", "b1", "b2"]);
        let winners = team(TeamLabel::A, &["a1", "a2"]);
        let losers = team(TeamLabel::B, &["b1", "b2"]);
        let games = vec![
            game(1, TeamLabel::A),
            game(2, TeamLabel::B),
            game(3, TeamLabel::A),
        ];

        let deltas = store.apply_result(&winners, &losers, &games).unwrap();
        assert_eq!(deltas.len(), 4);

        let a1 = store.require("a1").unwrap();
        assert_eq!(a1.mmr, 1516);
        assert_eq!(a1.xp, 3 * 10 + 2 * 40);
        assert_eq!((a1.wins, a1.losses), (2, 1));
        assert_eq!(a1.series_wins, 1);

        let b1 = store.require("b1").unwrap();
        assert_eq!(b1.mmr, 1484);
        assert_eq!(b1.xp, 3 * 10 + 40);
        assert_eq!(b1.series_losses, 1);
        assert_eq!(b1.published_level, store.levels().level_for(b1.xp));
    }

    #[test]
    fn test_apply_result_missing_player_changes_nothing() {
        let store = store();
        seed(&store, &["a1", "b1"]);
        let winners = team(TeamLabel::A, &["a1"]);
        let losers = team(TeamLabel::B, &["b1", "ghost"]);

        let err = store
            .apply_result(&winners, &losers, &[game(1, TeamLabel::A)])
            .unwrap_err();
        assert!(matches!(err, MatchmakingError::PlayerNotFound { .. }));
        assert_eq!(store.require("a1").unwrap().mmr, 1500);
        assert_eq!(store.require("a1").unwrap().xp, 0);
    }

    #[test]
    fn test_preview_writes_nothing_until_committed() {
        let store = store();
        seed(&store, &["a1", "b1"]);
        let winners = team(TeamLabel::A, &["a1"]);
        let losers = team(TeamLabel::B, &["b1"]);
        let games = vec![game(1, TeamLabel::A)];

        let deltas = store.preview_result(&winners, &losers, &games).unwrap();
        assert_eq!(store.require("a1").unwrap().mmr, 1500);
        assert_eq!(store.require("a1").unwrap().xp, 0);

        store.commit_result(TeamLabel::A, &deltas, &games).unwrap();
        let a1 = store.require("a1").unwrap();
        assert_eq!(a1.mmr, deltas[0].new_mmr);
        assert_eq!(a1.xp, deltas[0].xp_gained);
        assert_eq!((a1.series_wins, a1.series_losses), (1, 0));
        assert_eq!(store.require("b1").unwrap().series_losses, 1);
    }

    #[test]
    fn test_mmr_floor_respected() {
        let config = RatingConfig {
            formula: DeltaFormula::Fixed { win: 10, loss: 50 },
            mmr_floor: 100,
            ..RatingConfig::default()
        };
        let store = RatingStore::new(config).unwrap();
        seed(&store, &["a", "b"]);
        store.set_mmr("b", 120).unwrap();

        store
            .apply_result(
                &team(TeamLabel::A, &["a"]),
                &team(TeamLabel::B, &["b"]),
                &[game(1, TeamLabel::A)],
            )
            .unwrap();
        assert_eq!(store.require("b").unwrap().mmr, 100);
    }

    #[test]
    fn test_set_mmr_unknown_player() {
        let store = store();
        assert!(matches!(
            store.set_mmr("nobody", 1800),
            Err(MatchmakingError::PlayerNotFound { .. })
        ));
    }

    #[test]
    fn test_refresh_ranks_is_idempotent() {
        let store = store();
        let mut record = Player::new("vet".to_string(), "Vet".to_string(), 1500);
        record.xp = 500;
        store.restore(vec![record]).unwrap();

        let changes = store.refresh_all_ranks().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_level, 6);
        assert!(store.refresh_all_ranks().unwrap().is_empty());

        let vet = store.require("vet").unwrap();
        assert_eq!(vet.xp, 500);
        assert_eq!(vet.mmr, 1500);
    }

    #[test]
    fn test_level_reads_derive_from_xp() {
        let store = store();
        let mut stale = Player::new("vet".to_string(), "Vet".to_string(), 1500);
        stale.xp = 500;
        store.restore(vec![stale]).unwrap();
        assert_eq!(store.require("vet").unwrap().published_level, 1);

        assert_eq!(store.rank_info("vet").unwrap().level, 6);
        assert_eq!(store.stats("vet").unwrap().level, 6);
        assert_eq!(
            store.leaderboard(LeaderboardSort::Level, 1).unwrap()[0].level,
            6
        );
    }

    #[test]
    fn test_leaderboard_sorting() {
        let store = store();
        let mut high_xp = Player::new("x".to_string(), "X".to_string(), 1400);
        high_xp.xp = 900;
        let mut high_mmr = Player::new("m".to_string(), "M".to_string(), 1900);
        high_mmr.xp = 100;
        store.restore(vec![high_xp, high_mmr]).unwrap();

        let by_level = store.leaderboard(LeaderboardSort::Level, 10).unwrap();
        assert_eq!(by_level[0].player_id, "x");
        assert_eq!(by_level[0].position, 1);

        let by_mmr = store.leaderboard(LeaderboardSort::Mmr, 1).unwrap();
        assert_eq!(by_mmr.len(), 1);
        assert_eq!(by_mmr[0].player_id, "m");
    }

    #[test]
    fn test_link_and_unlink_account() {
        let store = store();
        let handle = store.link_account("42", "twitch.tv/chief_117").unwrap();
        assert_eq!(handle, "chief_117");
        assert_eq!(
            store.require("42").unwrap().linked_handle.as_deref(),
            Some("chief_117")
        );
        assert_eq!(store.unlink_account("42").unwrap().as_deref(), Some("chief_117"));
        assert_eq!(store.unlink_account("42").unwrap(), None);
        assert!(store.link_account("42", "no").is_err());
    }

    #[test]
    fn test_rank_info_respects_privacy() {
        let store = store();
        store.get_or_create("42", "Chief").unwrap();
        store.set_hide_name("42", true).unwrap();
        let info = store.rank_info("42").unwrap();
        assert_eq!(info.display_name, crate::types::HIDDEN_PLAYER_NAME);
        assert_eq!(info.level, 1);
        assert_eq!(info.xp_to_next, Some(89));
    }
}
