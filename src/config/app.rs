//! Main application configuration
//!
//! This module defines the primary configuration structures for the scrim-room
//! service, including file and environment variable loading and validation.

use crate::config::persistence::PersistenceSettings;
use crate::config::queue::QueueConfig;
use crate::config::rating::RatingConfig;
use crate::config::series::SeriesConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub queue: QueueConfig,
    pub series: SeriesConfig,
    pub rating: RatingConfig,
    pub persistence: PersistenceSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health and metrics endpoints
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "scrim-room".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

/// Read and parse an environment variable if it is set
fn env_override<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", name, raw)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from a TOML file; missing keys fall back to defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Some(port) = env_override("HEALTH_PORT")? {
            config.service.health_port = port;
        }
        if let Some(timeout) = env_override("SHUTDOWN_TIMEOUT_SECONDS")? {
            config.service.shutdown_timeout_seconds = timeout;
        }

        // Queue and series settings
        if let Some(team_size) = env_override("TEAM_SIZE")? {
            config.queue.team_size = team_size;
        }
        if let Some(length) = env_override("SERIES_LENGTH")? {
            config.series.length = length;
        }
        if let Ok(pool) = env::var("MAP_POOL") {
            config.series.map_pool = pool
                .split(',')
                .map(|choice| choice.trim().to_string())
                .filter(|choice| !choice.is_empty())
                .collect();
        }
        if let Some(auto_finalize) = env_override("AUTO_FINALIZE")? {
            config.series.auto_finalize = auto_finalize;
        }

        // Rating settings
        if let Some(default_mmr) = env_override("DEFAULT_MMR")? {
            config.rating.default_mmr = default_mmr;
        }
        if let Some(xp) = env_override("XP_PER_GAME")? {
            config.rating.xp_per_game = xp;
        }
        if let Some(bonus) = env_override("XP_WIN_BONUS")? {
            config.rating.xp_win_bonus = bonus;
        }

        // Persistence settings
        if let Ok(dir) = env::var("STATE_DIR") {
            config.persistence.state_dir = dir.into();
        }
        if let Some(retries) = env_override("PERSISTENCE_MAX_RETRIES")? {
            config.persistence.max_retry_attempts = retries;
        }
        if let Some(delay) = env_override("PERSISTENCE_RETRY_DELAY_MS")? {
            config.persistence.retry_delay_ms = delay;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    config.queue.validate()?;
    config.series.validate()?;
    config.rating.validate()?;

    if config.persistence.max_retry_attempts == 0 {
        return Err(anyhow!("Persistence retry attempts must be greater than 0"));
    }
    if config.persistence.retry_delay_ms > config.persistence.max_retry_delay_ms {
        return Err(anyhow!("Persistence retry delay exceeds its maximum"));
    }

    Ok(())
}
