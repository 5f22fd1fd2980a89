// Copyright (c) 2026 Tidepool Contributors. MIT License.
// See LICENSE for details.

//! # Tidepool Node
//!
//! Entry point for the `tidepool-node` binary. Parses CLI arguments,
//! initializes logging and metrics, deploys the vault described by the
//! node configuration, and serves the HTTP/WS API.
//!
//! Subcommands:
//!
//! - `run`: deploy the vault and serve the API
//! - `init`: write a default configuration file
//! - `version`: print build version information

mod api;
mod cli;
mod config;
mod deploy;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;

use tidepool_protocol::SystemClock;

use cli::{Commands, TidepoolCli};
use config::NodeConfig;
use logging::LogFormat;
use metrics::VaultMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How often the book gauges are refreshed when nothing else touches them.
/// Strategy values move on their own (yield, venue marks).
const GAUGE_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TidepoolCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_config(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Deploys the vault and serves the API and metrics endpoints until a
/// shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        logging::DEFAULT_FILTER,
        LogFormat::from_str_lossy(&args.log_format),
    );

    let config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => {
            tracing::warn!("no config file given, using devnet defaults");
            NodeConfig::devnet()
        }
    };

    tracing::info!(
        vault = %config.vault_address,
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        strategies = config.strategies.len(),
        "starting tidepool-node"
    );

    // --- Vault ---
    let deployment = deploy::deploy(&config, Arc::new(SystemClock))?;
    tracing::info!(
        strategies = ?deployment.strategies.ids().collect::<Vec<_>>(),
        "strategies deployed"
    );

    // --- Metrics ---
    let vault_metrics = Arc::new(VaultMetrics::new().context("failed to register metrics")?);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            tidepool_protocol::config::PROTOCOL_VERSION,
        ),
        gateway: deployment.gateway,
        asset: deployment.asset,
        strategies: Arc::new(deployment.strategies),
        faucet_limit: config.faucet_limit,
        event_tx,
        metrics: Arc::clone(&vault_metrics),
    };
    app_state.publish();

    // --- API server ---
    let api_router = api::create_router(app_state.clone());
    let api_addr = format!("{}:{}", args.bind, args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&vault_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Gauge refresh ---
    let refresh_state = app_state.clone();
    let refresh_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(GAUGE_REFRESH_INTERVAL);
        loop {
            interval.tick().await;
            refresh_state.publish();
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    refresh_loop.abort();
    tracing::info!("tidepool-node stopped");
    Ok(())
}

/// Writes the devnet configuration to `args.output`.
fn init_config(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("tidepool_node=info", LogFormat::Pretty);

    if args.output.exists() && !args.force {
        bail!(
            "{} already exists (pass --force to overwrite)",
            args.output.display()
        );
    }
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut config = NodeConfig::devnet();
    if let Some(target) = args.buffer_target {
        config.vault.buffer_target = target;
    }
    config.save(&args.output)?;
    tracing::info!(path = %args.output.display(), "configuration written");

    println!("Configuration written.");
    println!("  File      : {}", args.output.display());
    println!("  Vault     : {}", config.vault_address);
    println!("  Manager   : {}", config.manager);
    println!("  Emergency : {}", config.emergency);
    println!("  Strategies: {}", config.strategies.len());

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("tidepool-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", tidepool_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first. If a
/// handler cannot be installed that signal is simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
