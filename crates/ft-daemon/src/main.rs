//! findmy-tracker: records an Apple device's location on a schedule and
//! serves it over an authenticated HTTP API.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ft_core::config::{Config, LogFormat};
use ft_daemon::daemon::Daemon;
use ft_daemon::tracker::TickOutcome;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Debug, Parser)]
#[command(name = "findmy-tracker", version, about)]
struct Cli {
    /// Record a single observation and exit.
    #[arg(long)]
    once: bool,

    /// Emit JSON logs regardless of LOG_FORMAT.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;
    let json = cli.json_logs || config.log_format == LogFormat::Json;
    ft_telemetry::logging::init("findmy-tracker", "info", json);
    info!(?config, version = env!("CARGO_PKG_VERSION"), "findmy-tracker starting");

    let daemon = Daemon::new(config).await?;

    if cli.once {
        return match daemon.run_once().await {
            TickOutcome::Recorded(stored) => {
                info!(id = stored.id, "single observation recorded");
                Ok(())
            }
            TickOutcome::Skipped(e) => bail!("tick failed: {e}"),
        };
    }

    let shutdown = daemon.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, shutting down");
        shutdown.trigger();
    });

    daemon.run().await
}
