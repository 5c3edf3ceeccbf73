//! Accessory station
//!
//! Serves the accessory command protocol over TCP (or an interactive REPL)
//! and an HTTP JSON API.

use accessory_station::api::{self, ApiState};
use accessory_station::cli;
use accessory_station::config::{AppConfig, DEFAULT_CONFIG_PATH};
use accessory_station::hal::ConsolePins;
use accessory_station::server;
use accessory_station::Station;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Accessory station - GPIO outputs and remote sensors over a text protocol
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Read commands from an interactive prompt instead of serving TCP
    #[arg(long)]
    repl: bool,

    /// Protocol port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// HTTP API port (overrides the config file)
    #[arg(long)]
    api_port: Option<u16>,

    /// Storage directory (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting accessory station v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config.display());

    let mut config = AppConfig::load_or_default(&args.config).await?;
    if let Some(port) = args.port {
        config.protocol.port = port;
    }
    if let Some(port) = args.api_port {
        config.api.port = port;
    }
    if let Some(dir) = args.data_dir {
        config.storage.path = dir;
    }
    config.validate()?;

    let station = Station::from_config(&config, Arc::new(ConsolePins::new()))?;
    info!(
        "Storage: {:?} backend at {}",
        config.storage.backend,
        config.storage.path.display()
    );
    station.restore_outputs().await;

    let decay_monitor = station
        .decay_monitor(config.remote_sensors.sweep_interval())
        .spawn();

    // Fan the Ctrl-C signal out to every listener
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api_task = if config.api.enabled {
        let state = Arc::new(ApiState {
            station: station.clone(),
        });
        let addr = config.api.address();
        let shutdown = wait_for(shutdown_rx.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = api::start_server(state, &addr, shutdown).await {
                error!("HTTP API stopped: {:#}", e);
            }
        }))
    } else {
        info!("HTTP API disabled");
        None
    };

    let result = if args.repl {
        tokio::select! {
            result = cli::run_repl(Arc::new(station.dispatcher()), station.broadcaster.subscribe()) => result,
            _ = shutdown_signal() => Ok(()),
        }
    } else {
        server::run(&station, &config.protocol.address(), shutdown_signal()).await
    };

    let _ = shutdown_tx.send(true);
    if let Some(task) = api_task {
        let _ = task.await;
    }
    decay_monitor.shutdown().await;

    info!("Accessory station shutdown complete");
    result
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn wait_for(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
