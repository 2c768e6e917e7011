// Copyright (c) 2026 Marquee Labs. MIT License.
// See LICENSE for details.

//! # Marquee Gateway
//!
//! Entry point for the `marquee-gateway` binary. Parses CLI arguments,
//! initializes logging and metrics, wires the staging core to a ledger
//! client, and serves the HTTP API.
//!
//! The binary supports three subcommands:
//!
//! - `run`          — start the gateway
//! - `check-config` — load and validate a configuration file, then exit
//! - `version`      — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use marquee_core::config::GatewayConfig;
use marquee_core::ledger::http::HttpLedgerClient;
use marquee_core::ledger::memory::InMemoryLedger;
use marquee_core::ledger::LedgerClient;
use marquee_core::staging::ExpirySweeper;

use cli::{Commands, MarqueeCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = MarqueeCli::parse();

    match cli.command {
        Commands::Run(args) => run_gateway(args).await,
        Commands::CheckConfig(args) => check_config(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full gateway: API server, metrics endpoint, and the expiry
/// sweeper.
async fn run_gateway(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "marquee_gateway=info,marquee_core=info,tower_http=debug",
        logging::LogFormat::from_str_lossy(&args.log_format),
    );

    // --- Configuration ---
    let config = load_config(&args)?;
    config
        .validate()
        .context("configuration failed validation")?;
    let config = Arc::new(config);

    tracing::info!(
        listen_port = config.listen_port,
        metrics_port = config.metrics_port,
        devnet = args.devnet,
        "starting marquee-gateway"
    );

    // --- Ledger client ---
    let ledger: Arc<dyn LedgerClient> = if args.devnet {
        let ledger = Arc::new(InMemoryLedger::new());
        seed_devnet_ledger(&ledger, &config);
        tracing::info!("devnet mode: in-memory ledger seeded with demo assets");
        ledger
    } else {
        Arc::new(
            HttpLedgerClient::new(&config)
                .context("failed to construct ledger HTTP client")?,
        )
    };

    // --- Metrics ---
    let gateway_metrics = Arc::new(metrics::GatewayMetrics::new());

    // --- Application state ---
    let app_state = api::AppState::new(ledger, Arc::clone(&config), Arc::clone(&gateway_metrics));

    // --- Expiry sweeper ---
    let sweeper = ExpirySweeper::new(
        Arc::clone(&app_state.store),
        config.sweep_interval(),
        config.retention(),
    );
    let metrics_ref = Arc::clone(&gateway_metrics);
    let store_ref = Arc::clone(&app_state.store);
    let sweep_loop = tokio::spawn(async move {
        sweeper
            .run(move |report| {
                metrics_ref.expired_total.inc_by(report.expired as u64);
                metrics_ref.pending_descriptors.set(store_ref.len() as i64);
            })
            .await;
    });

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", config.listen_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&gateway_metrics));
    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
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

    sweep_loop.abort();
    tracing::info!("marquee-gateway stopped");
    Ok(())
}

/// Resolves configuration: a file when given, built-in devnet values
/// otherwise. Devnet without a file is the zero-setup path; `run` against
/// a real ledger requires one.
fn load_config(args: &cli::RunArgs) -> Result<GatewayConfig> {
    match &args.config {
        Some(path) => GatewayConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None if args.devnet => Ok(GatewayConfig::devnet()),
        None => anyhow::bail!("a configuration file is required unless --devnet is set"),
    }
}

/// Seeds the in-memory ledger so the devnet gateway has something to
/// sell: the operator holds a batch of movie tokens and a stock of
/// discount tokens, and a demo wallet holds spending money.
fn seed_devnet_ledger(ledger: &InMemoryLedger, config: &GatewayConfig) {
    for index in 1..=10u32 {
        ledger.grant_nft(
            &config.operator_address,
            &config.non_fungible_token_type,
            &format!("movie-{index:04}"),
        );
    }
    ledger.credit_fungible(&config.operator_address, &config.fungible_token_type, 1_000);
    ledger.credit_base_coin("0xDEC0DE", 10 * config.ticket_price);
}

/// Loads and validates a configuration file, printing the outcome.
fn check_config(args: cli::CheckConfigArgs) -> Result<()> {
    logging::init_logging("marquee_gateway=info", logging::LogFormat::Pretty);

    let config = GatewayConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;
    config.validate().context("configuration is invalid")?;

    println!("Configuration OK.");
    println!("  Ledger endpoint : {}", config.ledger_endpoint);
    println!("  Operator        : {}", config.operator_address);
    println!("  Ticket price    : {}", config.ticket_price);
    println!("  Listen port     : {}", config.listen_port);
    println!("  Metrics port    : {}", config.metrics_port);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("marquee-gateway {}", env!("CARGO_PKG_VERSION"));
    println!("rustc           {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
