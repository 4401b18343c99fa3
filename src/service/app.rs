//! Main application state and service coordination
//!
//! Wires the rating store, persistence gateway, match lifecycle, command
//! dispatcher and health endpoints together, and owns their background tasks.

use crate::collaborators::{
    AccountLinker, NoopAccountLinker, NoopVoiceChannels, VoiceChannels,
};
use crate::commands::CommandDispatcher;
use crate::config::AppConfig;
use crate::lifecycle::{MatchLifecycle, RecoveryReport};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::persistence::{FileSnapshotStore, PersistenceGateway, SnapshotStore};
use crate::rating::RatingStore;
use crate::service::health::{HealthCheck, ServiceProbe};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Interval of the gauge refresh task
const GAUGE_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("State recovery error: {message}")]
    Recovery { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,
    lifecycle: Arc<MatchLifecycle>,
    dispatcher: Arc<CommandDispatcher>,
    gateway: Arc<PersistenceGateway>,
    metrics_service: Arc<MetricsService>,
    recovery: RecoveryReport,
    background_tasks: Vec<JoinHandle<()>>,
    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl AppState {
    /// Initialize with file-backed state and no external collaborators
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        let store = Arc::new(FileSnapshotStore::new(config.persistence.state_dir.clone()));
        Self::with_components(
            config,
            store,
            Arc::new(NoopVoiceChannels),
            Arc::new(NoopAccountLinker),
        )
        .await
    }

    /// Initialize with explicit storage and collaborators, then recover state
    pub async fn with_components(
        config: AppConfig,
        store: Arc<dyn SnapshotStore>,
        voice: Arc<dyn VoiceChannels>,
        linker: Arc<dyn AccountLinker>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing {} match lifecycle service", config.service.name);
        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let started_at = Instant::now();
        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let ratings = Arc::new(RatingStore::new(config.rating.clone()).map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to initialize rating store: {}", e),
            }
        })?);
        let gateway = Arc::new(PersistenceGateway::spawn(
            store,
            &config.persistence,
            Some(metrics_collector.clone()),
        ));
        let lifecycle = Arc::new(
            MatchLifecycle::new(
                &config.queue,
                config.series.clone(),
                ratings,
                gateway.clone(),
            )
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to initialize match lifecycle: {}", e),
            })?
            .with_metrics(metrics_collector.clone()),
        );

        let recovery = lifecycle
            .recover()
            .await
            .map_err(|e| ServiceError::Recovery {
                message: e.to_string(),
            })?;
        if let Some(resumed) = &recovery.resumed {
            info!("Resuming {} in {}", resumed.label, resumed.phase);
        }

        let dispatcher = Arc::new(
            CommandDispatcher::new(lifecycle.clone(), voice, linker)
                .with_metrics(metrics_collector.clone()),
        );

        let is_running = Arc::new(RwLock::new(false));
        let probe = ServiceProbe {
            name: config.service.name.clone(),
            lifecycle: lifecycle.clone(),
            gateway: gateway.clone(),
            is_running: is_running.clone(),
            started_at,
        };
        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server =
            Arc::new(HealthServer::new(health_config, metrics_collector.clone()).with_probe(probe));
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        Ok(Self {
            config,
            lifecycle,
            dispatcher,
            gateway,
            metrics_service,
            recovery,
            background_tasks: Vec::new(),
            is_running,
            started_at,
        })
    }

    /// Start health endpoints and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {}", self.config.service.name);
        *self.is_running.write().await = true;

        self.start_metrics_service().await?;
        self.start_background_tasks();

        info!("{} started", self.config.service.name);
        Ok(())
    }

    /// Stop background work and flush pending writes
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);
        *self.is_running.write().await = false;

        self.stop_background_tasks().await;

        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        }

        self.gateway.shutdown(self.config.shutdown_timeout()).await;
        if self.gateway.is_degraded() {
            warn!("Shut down with unwritten state; the last successful snapshot will be used on restart");
        }

        let phase = self.lifecycle.phase().await;
        info!(
            "{} shutdown completed in phase {} after {}s",
            self.config.service.name,
            phase,
            self.uptime().as_secs()
        );
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn lifecycle(&self) -> Arc<MatchLifecycle> {
        self.lifecycle.clone()
    }

    pub fn dispatcher(&self) -> Arc<CommandDispatcher> {
        self.dispatcher.clone()
    }

    pub fn gateway(&self) -> Arc<PersistenceGateway> {
        self.gateway.clone()
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// What was restored at startup
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.push(handle);

        // Give the listener a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("Health and metrics endpoints on port {}", port);
        Ok(())
    }

    /// Refresh uptime and health gauges periodically
    fn start_background_tasks(&mut self) {
        let collector = self.metrics_service.collector();
        let probe = self.metrics_service.health_server().probe();
        let is_running = self.is_running.clone();
        let started_at = self.started_at;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(GAUGE_REFRESH_INTERVAL);
            debug!("Gauge refresh task started");

            while *is_running.read().await {
                interval.tick().await;
                collector
                    .service()
                    .uptime_seconds
                    .set(started_at.elapsed().as_secs() as i64);

                let Some(probe) = &probe else {
                    continue;
                };
                match HealthCheck::check(probe).await {
                    Ok(health) => {
                        collector.update_health_status(health.status.as_gauge());
                        for check in &health.checks {
                            collector.update_component_health(
                                &check.name,
                                check.status == crate::service::HealthStatus::Healthy,
                            );
                        }
                    }
                    Err(e) => warn!("Health refresh failed: {}", e),
                }
            }

            debug!("Gauge refresh task stopped");
        });
        self.background_tasks.push(task);
    }

    async fn stop_background_tasks(&mut self) {
        for handle in self.background_tasks.drain(..) {
            handle.abort();
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!("Background task ended with error: {}", e),
            }
        }
        debug!("Background tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::persistence::InMemorySnapshotStore;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.service.shutdown_timeout_seconds = 1;
        config
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let mut first = AppState::with_components(
            config(),
            store.clone(),
            Arc::new(NoopVoiceChannels),
            Arc::new(NoopAccountLinker),
        )
        .await
        .unwrap();

        first
            .dispatcher()
            .dispatch(Command::JoinQueue {
                player_id: "p1".to_string(),
                alias: "One".to_string(),
            })
            .await
            .unwrap();
        first.shutdown().await.unwrap();

        let second = AppState::with_components(
            config(),
            store,
            Arc::new(NoopVoiceChannels),
            Arc::new(NoopAccountLinker),
        )
        .await
        .unwrap();
        assert_eq!(second.recovery().queued, 1);
        assert_eq!(second.lifecycle().queue_status().await.size, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut bad = config();
        bad.series.length = 6;
        let result = AppState::with_components(
            bad,
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(NoopVoiceChannels),
            Arc::new(NoopAccountLinker),
        )
        .await;
        assert!(matches!(result, Err(ServiceError::Configuration { .. })));
    }
}
