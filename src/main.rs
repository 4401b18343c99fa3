//! Main entry point for the scrim-room match lifecycle service
//!
//! Loads configuration, recovers persisted state, serves health and metrics
//! endpoints and, optionally, accepts JSON commands on stdin until shut down.

use anyhow::Result;
use clap::Parser;
use scrim_room::commands::{Command, CommandDispatcher};
use scrim_room::config::{validate_config, AppConfig};
use scrim_room::service::{AppState, HealthCheck};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

/// Scrim Room - queue, team formation and best-of-N series for community scrims
#[derive(Parser)]
#[command(
    name = "scrim-room",
    version,
    about = "Match lifecycle service for community scrims",
    long_about = "Scrim Room runs a shared player queue, splits full queues into two teams, \
                 drives a best-of-N series with map voting and feeds results back into \
                 MMR and XP ratings. State is snapshotted after every change so a restart \
                 resumes the live match where it left off."
)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    #[arg(long, value_name = "DIR", help = "Override the state directory")]
    state_dir: Option<PathBuf>,

    #[arg(long, value_name = "PORT", help = "Override health and metrics port")]
    health_port: Option<u16>,

    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,

    #[arg(
        long,
        help = "Read JSON commands from stdin, one per line, and write JSON responses"
    )]
    stdin_commands: bool,
}

/// Initialize structured logging; RUST_LOG overrides the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C) signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}

/// JSON-lines command transport over stdin/stdout
async fn serve_stdin(dispatcher: Arc<CommandDispatcher>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Command>(&line) {
            Ok(command) => match dispatcher.dispatch(command).await {
                Ok(response) => serde_json::json!({ "ok": response }),
                Err(e) => serde_json::json!({
                    "error": { "kind": e.kind().as_str(), "message": e.to_string() }
                }),
            },
            Err(e) => serde_json::json!({
                "error": { "kind": "validation", "message": format!("Invalid command: {}", e) }
            }),
        };
        stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, command transport stopped");
    Ok(())
}

fn display_startup_banner(config: &AppConfig) {
    info!("Scrim Room match lifecycle service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    info!(
        "   Teams: {}v{}, best of {}",
        config.queue.team_size, config.queue.team_size, config.series.length
    );
    info!("   Map pool: {} choices", config.series.map_pool.len());
    info!("   State dir: {}", config.persistence.state_dir.display());
}

/// Load configuration and apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }
    if args.debug {
        config.service.log_level = "debug".to_string();
    }
    if let Some(state_dir) = &args.state_dir {
        config.persistence.state_dir = state_dir.clone();
    }
    if let Some(port) = args.health_port {
        config.service.health_port = port;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config);
    if args.dry_run {
        info!("Configuration validation successful, exiting without starting service");
        return Ok(());
    }

    let mut app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };
    let report = app_state.recovery();
    info!(
        "Recovered revision {}: {} players, {} queued, phase {}",
        report.revision, report.players, report.queued, report.phase
    );

    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    let transport = if args.stdin_commands {
        let dispatcher = app_state.dispatcher();
        Some(tokio::spawn(async move {
            if let Err(e) = serve_stdin(dispatcher).await {
                error!("Command transport failed: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Scrim Room is running, press Ctrl+C to shut down");
    wait_for_shutdown_signal().await;

    if let Some(transport) = transport {
        transport.abort();
    }

    if let Some(probe) = app_state.metrics_service().health_server().probe() {
        match HealthCheck::check(&probe).await {
            Ok(health) => info!(
                "Final status: {} (phase {:?}, {} waiting)",
                health.status, health.stats.phase, health.stats.players_waiting
            ),
            Err(e) => warn!("Final health check failed: {}", e),
        }
    }

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("Graceful shutdown completed"),
        Ok(Err(e)) => error!("Shutdown failed: {}", e),
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    Ok(())
}
