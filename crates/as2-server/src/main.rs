//! AS2 Server - session host for partnership pollers

use anyhow::{Context, Result};
use as2_core::config::{ConfigOverrides, resolve_config};
use as2_server::poller::{ModuleFactories, OutboundFile};
use as2_server::session::load_session;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// AS2 Server - session host for partnership pollers
#[derive(Parser, Debug)]
#[command(name = "as2-server")]
#[command(about = "Runs AS2 partnership pollers until interrupted")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Base directory for %home% substitution and relative paths
    #[arg(long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = as2_core::logging::init(args.verbose);

    info!("AS2 server starting (log level {})...", level);

    let home_dir = as2_core::home::get_home_dir().context("Failed to determine home directory")?;
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;

    let overrides = ConfigOverrides {
        config_path: args.config.clone(),
        base_dir: args.base_dir.clone(),
    };
    let config = resolve_config(&overrides, &current_dir, &home_dir)
        .context("Failed to resolve configuration")?;

    match &config.config_path {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => info!("No config file found, running with defaults"),
    }
    info!("Base directory: {}", config.base_dir.display());

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let mut session = load_session(&config, ModuleFactories::with_builtins(), Some(outbound_tx))
        .context("Failed to load configuration")?;

    if let Err(e) = session.start() {
        error!("Session failed to start, releasing loaded pollers: {}", e);
        match session.stop() {
            Ok(report) => {
                for failure in &report.failures {
                    warn!("Shutdown failure: {}", failure);
                }
            }
            Err(stop_err) => warn!("Could not stop session after failed start: {}", stop_err),
        }
        return Err(e).context("Failed to start session");
    }

    let dispatch_task = tokio::spawn(log_outbound(outbound_rx));

    let cancel_token = CancellationToken::new();
    tokio::spawn(wait_for_signal(cancel_token.clone()));

    info!("AS2 server running. Waiting for shutdown signal...");
    cancel_token.cancelled().await;
    info!("Shutdown signal received. Stopping session...");

    // destroy() joins poller threads, keep it off the async workers
    let (report, session) = tokio::task::spawn_blocking(move || {
        let report = session.stop();
        (report, session)
    })
    .await
    .context("Session stop task panicked")?;
    let report = report.context("Failed to stop session")?;

    // Dropping the session drops the last outbound senders
    drop(session);
    if let Err(e) = dispatch_task.await {
        error!("Outbound dispatch task failed: {}", e);
    }

    for failure in &report.failures {
        warn!("Shutdown failure: {}", failure);
    }

    if !report.is_clean() {
        anyhow::bail!(
            "{} component(s) failed to shut down cleanly",
            report.failures.len()
        );
    }

    info!("AS2 server shutdown complete");
    Ok(())
}

/// Stand-in for the AS2 sender: report each file pollers hand off.
async fn log_outbound(mut rx: mpsc::UnboundedReceiver<OutboundFile>) {
    while let Some(file) = rx.recv().await {
        info!(
            "Outbound file ready for partnership {}: {} ({} bytes, detected {})",
            file.partnership,
            file.path.display(),
            file.size,
            file.detected_at.to_rfc3339()
        );
    }
}

async fn wait_for_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT (Ctrl+C)"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    }

    cancel.cancel();
}
