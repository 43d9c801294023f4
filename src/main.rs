//! Sentinel Daemon - autonomous container update agent
//!
//! Watches running containers, detects stale images (registry digest
//! movement or a tracked Git ref advancing), and coordinates dependency-
//! ordered, hook-wrapped container replacement.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

mod cmd;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Autonomous container update agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<cmd::Commands>,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("sentinel_daemon={log_level}").into());

    // The notifier is only constructible after configuration load, but the
    // global subscriber can only be installed once. Install a no-op
    // placeholder layer now and hot-swap it for the real notifier inside
    // `cmd::root::run` via the returned handle.
    let (notify_layer, notify_handle) = tracing_subscriber::reload::Layer::new(sentinel_daemon::notify::noop_layer());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(notify_layer)
        .init();

    info!("starting sentinel daemon v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd::Commands::Diagnostics) => {
            cmd::diagnostics::run(None).await?;
        }
        Some(cmd::Commands::ValidateConfig) => {
            match sentinel_daemon::Configuration::load(&cli.config) {
                Ok(_) => {
                    info!("configuration at {} is valid", cli.config);
                }
                Err(e) => {
                    error!("configuration invalid: {e}");
                    std::process::exit(1);
                }
            }
        }
        Some(cmd::Commands::RunOnce) => {
            if let Err(e) = cmd::root::run(&cli.config, true, notify_handle).await {
                error!("cycle failed: {e}");
                std::process::exit(1);
            }
        }
        None => {
            if let Err(e) = cmd::root::run(&cli.config, false, notify_handle).await {
                error!("daemon error: {e}");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
