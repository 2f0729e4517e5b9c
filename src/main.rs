//! netpulse Binary Entry Point
//!
//! Runs the sampling loop and the HTTP API in one process.
//! Core functionality is provided by the `netpulse` library crate.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use clap::Parser;
use netpulse::{
    AppConfig, QueryService, SampleStore, Sampler, SamplerHandle, build_probe,
    config::{parse_duration, parse_timezone},
    probe::ProbeMode,
    server::{AppState, PageInfo, create_router},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// netpulse - Network Stability Sampler
#[derive(Parser, Debug)]
#[command(name = "netpulse", version, about, long_about = None)]
struct Cli {
    /// Path to an optional YAML configuration file
    #[arg(short, long, env = "NETPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Server bind address (overrides config file)
    #[arg(long, env = "NETPULSE_BIND")]
    bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "NETPULSE_PORT")]
    port: Option<u16>,

    /// IANA timezone for date keys (overrides config file)
    #[arg(long, env = "TIMEZONE", value_parser = parse_timezone)]
    timezone: Option<Tz>,

    /// Retention horizon in days (overrides config file)
    #[arg(long, env = "CLEANUP_DAYS")]
    cleanup_days: Option<u32>,

    /// Partition storage directory (overrides config file)
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Host to probe (overrides config file)
    #[arg(long, env = "PING_TARGET")]
    target: Option<String>,

    /// Pause between samples, e.g. `60s` or `60` (overrides config file)
    #[arg(long, env = "PING_INTERVAL", value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Use the synthetic probe instead of the network
    #[arg(long, env = "MOCK_PING", value_parser = clap::builder::BoolishValueParser::new())]
    mock_ping: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,netpulse=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("netpulse - Network Stability Sampler");

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(timezone) = cli.timezone {
        config.storage.timezone = timezone;
    }
    if let Some(days) = cli.cleanup_days {
        config.storage.cleanup_days = days;
    }
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(target) = cli.target {
        config.sampler.target = target;
    }
    if let Some(interval) = cli.interval {
        config.sampler.interval = interval;
    }
    if cli.mock_ping == Some(true) {
        config.probe.mode = ProbeMode::Mock;
    }
    config.validate()?;

    let store = SampleStore::open(&config.storage.data_dir)?;

    // Start the sampling loop
    let probe = build_probe(&config.probe);
    let sampler = Sampler::new(&config, probe, store.clone());

    tracing::info!(
        "Target: {} every {:?} via {} probe, timezone: {}, retention: {} days, data: {}",
        config.sampler.target,
        sampler.interval(),
        config.probe.mode,
        config.storage.timezone,
        config.storage.cleanup_days,
        config.storage.data_dir.display(),
    );

    let sampler = sampler.spawn();

    let app_state = AppState {
        query: QueryService::new(store, config.storage.timezone),
        page: PageInfo {
            timezone: config.storage.timezone.name().to_string(),
            cleanup_days: config.storage.cleanup_days,
            target: config.sampler.target.clone(),
        },
    };

    let app = create_router(app_state);
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sampler))
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal(sampler: SamplerHandle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Shutting down sampler...");
    if let Err(e) = sampler.shutdown().await {
        tracing::error!("Failed to shutdown sampler: {}", e);
    }
}
