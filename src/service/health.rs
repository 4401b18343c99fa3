//! Health checks for the scrim-room service
//!
//! The service is degraded, not down, while the persistence writer is
//! failing: gameplay continues in memory.

use crate::lifecycle::MatchLifecycle;
use crate::persistence::PersistenceGateway;
use crate::types::MatchPhase;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// How long a health check waits for the lifecycle lock
const LIFECYCLE_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value (0=unhealthy, 1=degraded, 2=healthy)
    pub fn as_gauge(self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.as_gauge() <= other.as_gauge() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Handles the health checks read from
#[derive(Clone)]
pub struct ServiceProbe {
    pub name: String,
    pub lifecycle: Arc<MatchLifecycle>,
    pub gateway: Arc<PersistenceGateway>,
    pub is_running: Arc<RwLock<bool>>,
    pub started_at: Instant,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Set when the component is not healthy
    pub message: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Phase of the live match, `None` if the lifecycle did not answer in time
    pub phase: Option<MatchPhase>,
    pub match_label: Option<String>,
    pub players_waiting: usize,
    pub persistence_degraded: bool,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Check every component and gather service statistics
    pub async fn check(probe: &ServiceProbe) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(probe).await,
            Self::check_lifecycle(probe).await,
            Self::check_persistence(probe),
        ];
        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

        let summary = tokio::time::timeout(LIFECYCLE_PROBE_TIMEOUT, probe.lifecycle.match_status())
            .await
            .ok();
        let queue = tokio::time::timeout(LIFECYCLE_PROBE_TIMEOUT, probe.lifecycle.queue_status())
            .await
            .ok();

        let stats = ServiceStats {
            phase: summary
                .as_ref()
                .map(|s| s.as_ref().map_or(MatchPhase::Idle, |m| m.phase)),
            match_label: summary.flatten().map(|m| m.label),
            players_waiting: queue.map_or(0, |q| q.size),
            persistence_degraded: probe.gateway.is_degraded(),
            uptime_seconds: probe.started_at.elapsed().as_secs(),
        };

        Ok(HealthCheck {
            status,
            service: probe.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Healthy while running, degraded while persistence is failing
    pub async fn liveness_check(probe: &ServiceProbe) -> Result<HealthStatus> {
        if !*probe.is_running.read().await {
            return Ok(HealthStatus::Unhealthy);
        }
        Ok(Self::check_persistence(probe).status)
    }

    async fn check_service_running(probe: &ServiceProbe) -> ComponentCheck {
        let start = Instant::now();
        let (status, message) = if *probe.is_running.read().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The lifecycle lock must be obtainable within the probe timeout
    async fn check_lifecycle(probe: &ServiceProbe) -> ComponentCheck {
        let start = Instant::now();
        let (status, message) =
            match tokio::time::timeout(LIFECYCLE_PROBE_TIMEOUT, probe.lifecycle.phase()).await {
                Ok(phase) => {
                    debug!("Lifecycle answered health probe in {}", phase);
                    (HealthStatus::Healthy, None)
                }
                Err(_) => {
                    warn!(
                        "Lifecycle did not answer health probe within {:?}",
                        LIFECYCLE_PROBE_TIMEOUT
                    );
                    (
                        HealthStatus::Degraded,
                        Some("Lifecycle is busy".to_string()),
                    )
                }
            };

        ComponentCheck {
            name: "match_lifecycle".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_persistence(probe: &ServiceProbe) -> ComponentCheck {
        let start = Instant::now();
        let (status, message) = if probe.gateway.is_degraded() {
            (
                HealthStatus::Degraded,
                Some("Snapshot writes are failing, state is held in memory".to_string()),
            )
        } else {
            (HealthStatus::Healthy, None)
        };

        ComponentCheck {
            name: "persistence".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}
