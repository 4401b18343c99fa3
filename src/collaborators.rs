//! External collaborator interfaces
//!
//! Voice channels and the streaming-account service live outside the core.
//! They are only called after a state transition has committed, and a
//! failure is reported back to the caller without undoing the transition.

use crate::error::Result;
use crate::lifecycle::MatchSummary;
use async_trait::async_trait;
use tracing::debug;

/// Voice channel plumbing for a live match
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceChannels: Send + Sync {
    /// Create team channels and move each team into its channel
    async fn prepare_match(&self, summary: &MatchSummary) -> Result<()>;

    /// Move players back to the lobby and remove the match channels
    async fn release_match(&self, label: &str) -> Result<()>;
}

/// Streaming-account service notified of link changes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountLinker: Send + Sync {
    async fn account_linked(&self, player_id: &str, handle: &str) -> Result<()>;

    async fn account_unlinked(&self, player_id: &str, handle: &str) -> Result<()>;
}

/// Voice collaborator for deployments without voice channels
#[derive(Debug, Default, Clone)]
pub struct NoopVoiceChannels;

#[async_trait]
impl VoiceChannels for NoopVoiceChannels {
    async fn prepare_match(&self, summary: &MatchSummary) -> Result<()> {
        debug!("No voice channels configured for {}", summary.label);
        Ok(())
    }

    async fn release_match(&self, label: &str) -> Result<()> {
        debug!("No voice channels to release for {}", label);
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct NoopAccountLinker;

#[async_trait]
impl AccountLinker for NoopAccountLinker {
    async fn account_linked(&self, player_id: &str, handle: &str) -> Result<()> {
        debug!("Account '{}' linked to '{}'", handle, player_id);
        Ok(())
    }

    async fn account_unlinked(&self, player_id: &str, handle: &str) -> Result<()> {
        debug!("Account '{}' unlinked from '{}'", handle, player_id);
        Ok(())
    }
}
