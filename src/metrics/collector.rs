//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the scrim-room match
//! lifecycle service using Prometheus metrics.

use crate::error::ErrorKind;
use crate::types::MatchPhase;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the match lifecycle service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue metrics
    queue_metrics: QueueMetrics,

    /// Match and series metrics
    match_metrics: MatchMetrics,

    /// Snapshot writer metrics
    persistence_metrics: PersistenceMetrics,

    /// Command surface metrics
    command_metrics: CommandMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    pub joins_total: IntCounter,
    pub leaves_total: IntCounter,

    /// Players currently waiting in queue
    pub players_waiting: IntGauge,

    /// Time a player waited before their match started
    pub queue_wait_time_seconds: Histogram,
}

/// Match and series metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Matches started, by kind (ranked/test)
    pub matches_started_total: IntCounterVec,

    /// Matches closed, by kind and outcome (finalized/cancelled)
    pub matches_closed_total: IntCounterVec,

    pub games_recorded_total: IntCounter,

    /// Current phase of the live match (0=idle, 1=pregame, 2=ingame, 3=postgame)
    pub match_phase: IntGauge,
}

/// Snapshot writer metrics
#[derive(Clone)]
pub struct PersistenceMetrics {
    /// Write attempts, by target and status
    pub writes_total: IntCounterVec,

    /// Writes abandoned after exhausting retries
    pub write_failures_total: IntCounter,

    pub write_duration: Histogram,

    /// 1 while the writer is degraded
    pub degraded: IntGauge,
}

/// Command surface metrics
#[derive(Clone)]
pub struct CommandMetrics {
    pub command_duration: HistogramVec,

    /// Rejected commands, by command and error kind
    pub command_errors_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let persistence_metrics = PersistenceMetrics::new(&registry)?;
        let command_metrics = CommandMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            match_metrics,
            persistence_metrics,
            command_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    pub fn persistence(&self) -> &PersistenceMetrics {
        &self.persistence_metrics
    }

    pub fn commands(&self) -> &CommandMetrics {
        &self.command_metrics
    }

    /// Record a queue join and the resulting queue size
    pub fn record_queue_join(&self, queue_size: usize) {
        self.queue_metrics.joins_total.inc();
        self.queue_metrics.players_waiting.set(queue_size as i64);
    }

    /// Record a queue leave and the resulting queue size
    pub fn record_queue_leave(&self, queue_size: usize) {
        self.queue_metrics.leaves_total.inc();
        self.queue_metrics.players_waiting.set(queue_size as i64);
    }

    pub fn set_players_waiting(&self, queue_size: usize) {
        self.queue_metrics.players_waiting.set(queue_size as i64);
    }

    /// Record a match entering Pregame
    pub fn record_match_started(&self, test_mode: bool, wait_times: &[Duration]) {
        self.match_metrics
            .matches_started_total
            .with_label_values(&[kind_label(test_mode)])
            .inc();
        for wait in wait_times {
            self.queue_metrics
                .queue_wait_time_seconds
                .observe(wait.as_secs_f64());
        }
    }

    /// Record a match leaving the lifecycle
    pub fn record_match_closed(&self, test_mode: bool, cancelled: bool) {
        let outcome = if cancelled { "cancelled" } else { "finalized" };
        self.match_metrics
            .matches_closed_total
            .with_label_values(&[kind_label(test_mode), outcome])
            .inc();
    }

    pub fn record_game_recorded(&self) {
        self.match_metrics.games_recorded_total.inc();
    }

    pub fn set_match_phase(&self, phase: MatchPhase) {
        let value = match phase {
            MatchPhase::Idle => 0,
            MatchPhase::Pregame => 1,
            MatchPhase::Ingame => 2,
            MatchPhase::Postgame => 3,
        };
        self.match_metrics.match_phase.set(value);
    }

    /// Record one snapshot or history write attempt
    pub fn record_persistence_write(&self, target: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };
        self.persistence_metrics
            .writes_total
            .with_label_values(&[target, status])
            .inc();
        self.persistence_metrics
            .write_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a write abandoned after its last retry
    pub fn record_persistence_exhausted(&self) {
        self.persistence_metrics.write_failures_total.inc();
    }

    pub fn set_persistence_degraded(&self, degraded: bool) {
        self.persistence_metrics.degraded.set(i64::from(degraded));
    }

    /// Record a command and, if it was rejected, the error kind
    pub fn record_command(&self, command: &str, error: Option<ErrorKind>, duration: Duration) {
        self.command_metrics
            .command_duration
            .with_label_values(&[command])
            .observe(duration.as_secs_f64());

        if let Some(kind) = error {
            self.command_metrics
                .command_errors_total
                .with_label_values(&[command, kind.as_str()])
                .inc();
        }
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }
}

fn kind_label(test_mode: bool) -> &'static str {
    if test_mode {
        "test"
    } else {
        "ranked"
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("scrim_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "scrim_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("scrim_room_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let joins_total = IntCounter::new("scrim_room_queue_joins_total", "Total queue joins")?;
        registry.register(Box::new(joins_total.clone()))?;

        let leaves_total = IntCounter::new("scrim_room_queue_leaves_total", "Total queue leaves")?;
        registry.register(Box::new(leaves_total.clone()))?;

        let players_waiting = IntGauge::new(
            "scrim_room_players_waiting",
            "Players currently waiting in queue",
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let queue_wait_time_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "scrim_room_queue_wait_time_seconds",
                "Time from queue join to match start",
            )
            .buckets(vec![30.0, 60.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0, 7200.0]),
        )?;
        registry.register(Box::new(queue_wait_time_seconds.clone()))?;

        Ok(Self {
            joins_total,
            leaves_total,
            players_waiting,
            queue_wait_time_seconds,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_started_total = IntCounterVec::new(
            Opts::new("scrim_room_matches_started_total", "Total matches started"),
            &["kind"],
        )?;
        registry.register(Box::new(matches_started_total.clone()))?;

        let matches_closed_total = IntCounterVec::new(
            Opts::new("scrim_room_matches_closed_total", "Total matches closed"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(matches_closed_total.clone()))?;

        let games_recorded_total =
            IntCounter::new("scrim_room_games_recorded_total", "Total game results recorded")?;
        registry.register(Box::new(games_recorded_total.clone()))?;

        let match_phase = IntGauge::new(
            "scrim_room_match_phase",
            "Live match phase (0=idle, 1=pregame, 2=ingame, 3=postgame)",
        )?;
        registry.register(Box::new(match_phase.clone()))?;

        Ok(Self {
            matches_started_total,
            matches_closed_total,
            games_recorded_total,
            match_phase,
        })
    }
}

impl PersistenceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let writes_total = IntCounterVec::new(
            Opts::new("scrim_room_persistence_writes_total", "Snapshot write attempts"),
            &["target", "status"],
        )?;
        registry.register(Box::new(writes_total.clone()))?;

        let write_failures_total = IntCounter::new(
            "scrim_room_persistence_write_failures_total",
            "Writes abandoned after exhausting retries",
        )?;
        registry.register(Box::new(write_failures_total.clone()))?;

        let write_duration = Histogram::with_opts(
            HistogramOpts::new(
                "scrim_room_persistence_write_duration_seconds",
                "Snapshot write duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(write_duration.clone()))?;

        let degraded = IntGauge::new(
            "scrim_room_persistence_degraded",
            "1 while snapshot writes are failing",
        )?;
        registry.register(Box::new(degraded.clone()))?;

        Ok(Self {
            writes_total,
            write_failures_total,
            write_duration,
            degraded,
        })
    }
}

impl CommandMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let command_duration = HistogramVec::new(
            HistogramOpts::new(
                "scrim_room_command_duration_seconds",
                "Command processing duration",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let command_errors_total = IntCounterVec::new(
            Opts::new("scrim_room_command_errors_total", "Rejected commands"),
            &["command", "kind"],
        )?;
        registry.register(Box::new(command_errors_total.clone()))?;

        Ok(Self {
            command_duration,
            command_errors_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    fn render(collector: &MetricsCollector) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&collector.registry().gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _queue = collector.queue();
        let _matches = collector.matches();
        let _persistence = collector.persistence();
        let _commands = collector.commands();
    }

    #[test]
    fn test_queue_and_match_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_queue_join(3);
        collector.record_queue_leave(2);
        collector.record_match_started(false, &[Duration::from_secs(90)]);
        collector.record_game_recorded();
        collector.record_match_closed(false, true);
        collector.set_match_phase(MatchPhase::Ingame);

        assert_eq!(collector.queue().joins_total.get(), 1);
        assert_eq!(collector.queue().players_waiting.get(), 2);
        assert_eq!(collector.matches().match_phase.get(), 2);
        assert_eq!(
            collector
                .matches()
                .matches_closed_total
                .with_label_values(&["ranked", "cancelled"])
                .get(),
            1
        );
    }

    #[test]
    fn test_command_errors_by_kind() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_command("join_queue", None, Duration::from_millis(1));
        collector.record_command(
            "join_queue",
            Some(ErrorKind::StateConflict),
            Duration::from_millis(1),
        );

        let text = render(&collector);
        assert!(text.contains("scrim_room_command_errors_total"));
        assert!(text.contains("state_conflict"));
    }

    #[test]
    fn test_persistence_degraded_gauge() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_persistence_write("snapshot", false, Duration::from_millis(3));
        collector.record_persistence_exhausted();
        collector.set_persistence_degraded(true);
        assert_eq!(collector.persistence().degraded.get(), 1);

        collector.set_persistence_degraded(false);
        assert_eq!(collector.persistence().degraded.get(), 0);
        assert_eq!(collector.persistence().write_failures_total.get(), 1);
    }
}
