//! Test fixtures and recording collaborators for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use scrim_room::collaborators::{AccountLinker, VoiceChannels};
use scrim_room::commands::{Command, CommandDispatcher};
use scrim_room::config::{PersistenceSettings, QueueConfig, RatingConfig, SeriesConfig};
use scrim_room::error::{MatchmakingError, Result};
use scrim_room::lifecycle::{MatchLifecycle, MatchSummary};
use scrim_room::persistence::{InMemorySnapshotStore, PersistenceGateway, SnapshotStore};
use scrim_room::rating::RatingStore;
use scrim_room::types::PlayerId;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// A voice call seen by `RecordingVoiceChannels`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCall {
    Prepared { label: String, players: usize },
    Released { label: String },
}

/// Voice collaborator that records calls and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingVoiceChannels {
    calls: Mutex<Vec<VoiceCall>>,
    failing: Mutex<bool>,
}

impl RecordingVoiceChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let voice = Self::default();
        voice.set_failing(true);
        voice
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn calls(&self) -> Vec<VoiceCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: VoiceCall) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.failing.lock().map(|flag| *flag).unwrap_or(false) {
            return Err(MatchmakingError::CollaboratorFailed {
                message: "voice server unreachable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VoiceChannels for RecordingVoiceChannels {
    async fn prepare_match(&self, summary: &MatchSummary) -> Result<()> {
        self.record(VoiceCall::Prepared {
            label: summary.label.clone(),
            players: summary.team_a.players.len() + summary.team_b.players.len(),
        })
    }

    async fn release_match(&self, label: &str) -> Result<()> {
        self.record(VoiceCall::Released {
            label: label.to_string(),
        })
    }
}

/// Account collaborator that records (player, handle, linked) notifications
#[derive(Debug, Default)]
pub struct RecordingAccountLinker {
    notifications: Mutex<Vec<(PlayerId, String, bool)>>,
}

impl RecordingAccountLinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<(PlayerId, String, bool)> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    fn record(&self, player_id: &str, handle: &str, linked: bool) {
        if let Ok(mut notifications) = self.notifications.lock() {
            notifications.push((player_id.to_string(), handle.to_string(), linked));
        }
    }
}

#[async_trait]
impl AccountLinker for RecordingAccountLinker {
    async fn account_linked(&self, player_id: &str, handle: &str) -> Result<()> {
        self.record(player_id, handle, true);
        Ok(())
    }

    async fn account_unlinked(&self, player_id: &str, handle: &str) -> Result<()> {
        self.record(player_id, handle, false);
        Ok(())
    }
}

/// Lifecycle over `store` with default queue and rating settings
pub fn lifecycle_on(store: Arc<dyn SnapshotStore>, series: SeriesConfig) -> Arc<MatchLifecycle> {
    let ratings = Arc::new(RatingStore::new(RatingConfig::default()).unwrap());
    let gateway = Arc::new(PersistenceGateway::spawn(
        store,
        &PersistenceSettings::default(),
        None,
    ));
    Arc::new(MatchLifecycle::new(&QueueConfig::default(), series, ratings, gateway).unwrap())
}

/// In-memory lifecycle with the default best-of-7 series
pub fn create_lifecycle() -> Arc<MatchLifecycle> {
    lifecycle_on(Arc::new(InMemorySnapshotStore::new()), SeriesConfig::default())
}

/// Dispatcher wired to recording collaborators
pub fn create_dispatcher(
    series: SeriesConfig,
) -> (
    CommandDispatcher,
    Arc<RecordingVoiceChannels>,
    Arc<RecordingAccountLinker>,
) {
    let voice = Arc::new(RecordingVoiceChannels::new());
    let linker = Arc::new(RecordingAccountLinker::new());
    let lifecycle = lifecycle_on(Arc::new(InMemorySnapshotStore::new()), series);
    let dispatcher = CommandDispatcher::new(lifecycle, voice.clone(), linker.clone());
    (dispatcher, voice, linker)
}

pub fn player_ids(prefix: &str, count: usize) -> Vec<PlayerId> {
    (1..=count).map(|i| format!("{}{}", prefix, i)).collect()
}

/// Queue `ids` in order and return the Pregame the last join started, if any
pub async fn fill_queue(lifecycle: &MatchLifecycle, ids: &[PlayerId]) -> Option<MatchSummary> {
    let mut started = None;
    for id in ids {
        let result = lifecycle.join_queue(id, id).await.unwrap();
        if result.started.is_some() {
            started = result.started;
        }
    }
    started
}

pub fn join_command(player_id: &str) -> Command {
    Command::JoinQueue {
        player_id: player_id.to_string(),
        alias: player_id.to_string(),
    }
}

/// Fresh state directory under the system temp dir
pub fn temp_state_dir() -> PathBuf {
    std::env::temp_dir().join(format!("scrim-room-test-{}", uuid::Uuid::new_v4()))
}
