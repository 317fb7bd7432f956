//! tidewaterd: the Tidewater node daemon.
//!
//! Single binary that assembles the node subsystems:
//! - Hybrid clock behind a retrying allocator
//! - Channel watermark ticker fed by the in-flight tracker
//! - Serialized control task queue
//! - Least-loaded job dispatcher
//! - REST API
//!
//! # Usage
//!
//! ```text
//! tidewaterd standalone --config /etc/tidewater/tidewater.toml --port 19530
//! tidewaterd default-config > tidewater.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tide_core::NodeConfig;
use tidewater_api::{ApiState, build_router};

const DEFAULT_FILTER: &str = "info,tidewaterd=debug,tidewater_ticker=debug,tidewater_tasks=debug";

#[derive(Parser)]
#[command(name = "tidewaterd", about = "Tidewater node daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every subsystem in one process.
    Standalone {
        /// Path to tidewater.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on. Overrides `[api] port`.
        #[arg(long)]
        port: Option<u16>,

        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
    /// Print the default configuration as TOML.
    DefaultConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            config,
            port,
            log_format,
        } => {
            init_tracing(log_format);
            run_standalone(config, port).await
        }
        Command::DefaultConfig => {
            print!("{}", NodeConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

async fn run_standalone(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = match &config_path {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(port) = port {
        config.api.port = port;
    }
    info!(
        node_id = config.node.node_id,
        role = %config.node.role,
        config = ?config_path,
        "Tidewater daemon starting in standalone mode"
    );

    // ── Initialize subsystems ──────────────────────────────────

    let state = ApiState::from_config(&config)?;
    state.start().await?;
    info!(channels = config.ticker.channels.len(), "subsystems started");

    // ── Start API server ───────────────────────────────────────

    let router = build_router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await;

    // The API is down; drain tasks, then stop the ticker.
    state.shutdown().await;
    served?;

    info!("Tidewater daemon stopped");
    Ok(())
}
