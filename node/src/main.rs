// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Bursar Node
//!
//! Entry point for the `bursar-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and dispatches to a subcommand:
//!
//! - `init`: write a reference genesis configuration
//! - `replay`: run a JSON call script against a fresh chain
//! - `serve`: serve the HTTP API and Prometheus metrics
//! - `address`: derive an account id from a label
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod replay;

use anyhow::{Context, Result};
use bursar_contracts::{Chain, GenesisConfig};
use bursar_protocol::AccountId;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use cli::{BursarNodeCli, Commands};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BursarNodeCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.log_format.into());

    match cli.command {
        Commands::Init(args) => init_genesis(args),
        Commands::Replay(args) => replay_script(args),
        Commands::Serve(args) => serve(args).await,
        Commands::Address(args) => {
            println!("{}", AccountId::from_label(&args.label));
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Writes a reference genesis file.
fn init_genesis(args: cli::InitArgs) -> Result<()> {
    let config = GenesisConfig::reference(args.admin, args.institution);
    config.validate().context("refusing to write an invalid genesis")?;
    replay::write_genesis(&args.out, &config, args.force)?;

    tracing::info!(
        path = %args.out.display(),
        admin = %config.admin,
        institution = %config.institution,
        "genesis written"
    );
    println!("Genesis written to {}", args.out.display());
    println!("  Admin       : {}", config.admin);
    println!("  Institution : {}", config.institution);
    for (tier, fee) in config.fee_schedule.iter() {
        println!("  Tier {:<6} : {} units", tier, fee);
    }
    Ok(())
}

/// Runs a call script and prints one JSON line per entry.
fn replay_script(args: cli::ReplayArgs) -> Result<()> {
    let genesis = replay::load_genesis(&args.genesis)?;
    let entries = replay::load_script(&args.script)?;
    let mut chain = Chain::from_genesis(&genesis).context("failed to build chain from genesis")?;

    tracing::info!(entries = entries.len(), script = %args.script.display(), "replaying script");
    let outcomes = replay::run_script(&mut chain, entries);

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, replay::ReplayOutcome::Err(_)))
        .count();
    for outcome in &outcomes {
        println!("{}", serde_json::to_string(outcome)?);
    }
    if args.dump_state {
        println!("{}", serde_json::to_string_pretty(chain.state())?);
    }

    tracing::info!(total = outcomes.len(), failed, "replay finished");
    Ok(())
}

/// Serves the REST API and the metrics endpoint until interrupted.
async fn serve(args: cli::ServeArgs) -> Result<()> {
    let genesis = replay::load_genesis(&args.genesis)?;
    let chain = Chain::from_genesis(&genesis).context("failed to build chain from genesis")?;

    tracing::info!(
        port = args.port,
        metrics_port = args.metrics_port,
        genesis = %args.genesis.display(),
        "starting bursar-node"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Application state ---
    let app_state = api::AppState::new(
        format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            bursar_protocol::config::PROTOCOL_VERSION,
        ),
        chain,
        Arc::clone(&node_metrics),
    );

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

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

    tracing::info!("bursar-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("bursar-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", bursar_protocol::config::PROTOCOL_VERSION);
    println!(
        "token       {} ({}, {} decimals)",
        bursar_protocol::config::TOKEN_NAME,
        bursar_protocol::config::TOKEN_SYMBOL,
        bursar_protocol::config::TOKEN_DECIMALS,
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that branch never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
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
