//! fleetwatch - live activity monitor for a fleet of coding agents
//!
//! Tails agent transcripts under a root directory and broadcasts redacted
//! activity events to a realtime channel (or stdout).
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/fleetwatch/config.toml (~/.config/fleetwatch/config.toml)
//! - Logs: $XDG_STATE_HOME/fleetwatch/ (~/.local/state/fleetwatch/)

use anyhow::{Context, Result};
use clap::Parser;
use fleetwatch_core::{broadcast, Config, Monitor};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fleetwatch")]
#[command(about = "Broadcast live, redacted activity from coding agent transcripts")]
#[command(version)]
struct Args {
    /// Config file (default: ~/.config/fleetwatch/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the resolved settings and exit
    #[arg(long)]
    check: bool,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long, value_name = "SECS")]
    run_for: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    if args.check {
        print_settings(&config, args.config.as_deref());
        return Ok(());
    }

    let _log_guard =
        fleetwatch_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("fleetwatch starting up");

    let sink = broadcast::sink_from_config(&config.broadcast)
        .context("failed to create broadcast sink")?;
    let monitor = Monitor::new(config, sink);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create async runtime")?;

    let stats = runtime.block_on(async {
        match args.run_for {
            Some(secs) => {
                monitor
                    .run_until(tokio::time::sleep(Duration::from_secs(secs)))
                    .await
            }
            None => monitor.run().await,
        }
    })?;

    // A pending stdin read would otherwise hold the process open
    runtime.shutdown_timeout(Duration::from_secs(1));

    tracing::info!(
        sent = stats.sent,
        dropped = stats.dropped,
        failed = stats.failed,
        sessions = monitor.registry().len(),
        "fleetwatch stopped"
    );

    Ok(())
}

fn print_settings(config: &Config, config_path: Option<&std::path::Path>) {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);

    println!("Config:          {}", config_path.display());
    println!("Watch root:      {}", config.watch.resolved_root().display());
    println!("Extension:       {}", config.watch.extension);
    println!("Rescan interval: {}s", config.watch.rescan_interval_secs);
    println!("Idle threshold:  {}s", config.sessions.idle_threshold_secs);
    println!("Sweep interval:  {}s", config.sessions.sweep_interval_secs);
    println!("Summary every:   {}s", config.sessions.summary_interval_secs);

    let broadcast = &config.broadcast;
    if broadcast.is_ready() {
        println!(
            "Sink:            realtime ({}, channel {})",
            broadcast.server_url.as_deref().unwrap_or_default(),
            broadcast.channel
        );
    } else {
        println!("Sink:            stdout");
    }
    println!("Min interval:    {}ms", broadcast.min_interval_ms);
    println!("Log file:        {}", fleetwatch_core::logging::log_file_path().display());
}
