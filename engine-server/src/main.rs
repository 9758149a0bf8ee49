mod config;
mod setup;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use config::Config;
use setup::{ensure_database_directory_from_config, initialize_app};
use telemetry::{init_telemetry, log_config_validation, log_startup_info};

#[derive(Parser)]
#[command(name = "orchestrator-engine")]
#[command(about = "Task orchestration engine — ready-set, claims, worker lifecycle, learning retrieval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Start the HTTP API server
    #[arg(long)]
    start: bool,

    /// Port to listen on
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Configuration file path
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Database URL override (defaults to `./.tx/orchestrator.sqlite`)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Listen address override (default: 127.0.0.1)
    #[arg(long, env = "LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Log level override
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(config_file) => {
            info!("Loading configuration from file: {}", config_file);
            Config::from_file(config_file)?
        }
        None => {
            info!("Loading configuration from environment");
            Config::from_env()?
        }
    };

    if let Some(ref database_url) = cli.database_url {
        info!("Overriding database URL from CLI");
        config.database.url = Some(database_url.clone());
    }

    if let Some(ref listen_addr) = cli.listen_addr {
        config.server.listen_addr = listen_addr.clone();
    }

    config.server.port = cli.port;

    if let Some(ref log_level) = cli.log_level {
        info!("Overriding log level from CLI");
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if !cli.start {
        println!("Task Orchestration Engine");
        println!();
        println!("Usage:");
        println!("  orchestrator-engine --start --port=3000 --database-url=sqlite://./.tx/orchestrator.sqlite");
        println!();
        println!("This will:");
        println!("  • Start the HTTP API on the configured port (§6)");
        println!("  • Open or create the SQLite store and apply migrations");
        println!("  • Run the reconciliation loop on the configured interval");
        println!();
        println!("For more options, use: orchestrator-engine --help");
        return Ok(());
    }

    let config = load_config(&cli).context("Failed to load configuration")?;

    init_telemetry(&config.logging).context("Failed to initialize telemetry")?;
    log_config_validation(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        std::process::exit(1);
    }

    log_startup_info(&config);

    ensure_database_directory_from_config(&config).context("Failed to create database directory")?;

    let state = initialize_app(&config).await.context("Failed to initialize application")?;

    let pid = std::process::id() as i64;
    state
        .orchestrator
        .start(pid, (&config.orchestrator).into())
        .await
        .context("Failed to start orchestrator")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconcile_loop = tokio::spawn(state.orchestrator.clone().run_reconcile_loop(shutdown_rx));

    let router = engine_protocol::build_router(state.clone());
    let server_addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind {server_addr}"))?;

    println!("Task Orchestration Engine is ready!");
    println!("   Listening on: http://{server_addr}");
    println!("   Database: {}", config.database_url());
    println!();
    println!("Press Ctrl+C to shutdown");
    println!();

    let shutdown_signal = async {
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to register SIGTERM handler");
            let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
                .expect("Failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
            }
        }
        #[cfg(windows)]
        {
            tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
    };

    let serve_result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await;

    let _ = shutdown_tx.send(true);
    let _ = reconcile_loop.await;

    // This binary hosts no in-process worker runtime, so there is nothing
    // here to release claims gracefully first; a non-graceful stop marks
    // every non-dead worker dead (§4.7), which is correct once the process
    // serving their heartbeats is going away.
    if let Err(err) = state.orchestrator.stop(false).await {
        error!(error = %err, "Failed to mark orchestrator stopped on shutdown");
    }

    match serve_result {
        Ok(()) => {
            println!("Task Orchestration Engine shut down cleanly");
            info!("Engine shut down cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Server error");
            println!("Server error: {e}");
            std::process::exit(3);
        }
    }
}
