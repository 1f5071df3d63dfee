//! Pollect Binary Entry Point
//!
//! Loads the configuration, builds the executors and runs the scheduler
//! until Ctrl+C or SIGTERM. Core functionality is provided by the `pollect`
//! library crate.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use pollect::{AppConfig, Configuration, ExecutionScheduler, Registry, SchedulerError};
use tokio::sync::oneshot;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter when neither `--log-level` nor `RUST_LOG` is set.
const DEFAULT_LOG_FILTER: &str = "info,pollect=info";

/// Pollect - Metrics Collection Daemon
#[derive(Parser, Debug)]
#[command(name = "pollect", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/pollect.yml", env = "POLLECT_CONFIG")]
    config: PathBuf,

    /// Replace every writer with a logging dry-run writer
    #[arg(long)]
    dry_run: bool,

    /// Log level or filter directive (overrides RUST_LOG)
    #[arg(long, env = "POLLECT_LOG_LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = match cli.log_level.as_deref() {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Pollect - Metrics Collection Daemon");

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let app = AppConfig::load(&cli.config)?;
    if cli.dry_run {
        tracing::info!("Dry run: writers will only log what they receive");
    }

    let mut configuration = Configuration::new(app, Registry::with_builtins(), cli.dry_run)?;
    let executors = configuration.create_executors()?;
    tracing::info!(
        "Configured {} executors, default tick time {}",
        executors.len(),
        humantime::format_duration(configuration.app().tick_time)
    );

    let scheduler = Arc::new(ExecutionScheduler::new(configuration.app(), executors));
    scheduler.create();

    // The scheduler blocks its thread; report back if it ever returns early.
    let (done_tx, done_rx) = oneshot::channel::<Result<(), SchedulerError>>();
    let runner = {
        let scheduler = Arc::clone(&scheduler);
        thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || {
                let result = scheduler.run();
                let _ = done_tx.send(result);
            })?
    };

    tracing::info!("Press Ctrl+C to shutdown");

    // Signal handling only; sources and writers never run on this runtime.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let early_exit = runtime.block_on(async {
        tokio::select! {
            () = shutdown_signal() => None,
            result = done_rx => Some(result),
        }
    });
    drop(runtime);

    let mut failure = None;
    match early_exit {
        None => {
            tracing::info!("Shutting down executors...");
            scheduler.stop();
        }
        Some(Ok(Err(e))) => {
            tracing::error!("Scheduler failed: {}", e);
            failure = Some(e);
        }
        Some(Ok(Ok(()))) | Some(Err(_)) => {
            tracing::warn!("Scheduler exited unexpectedly");
        }
    }

    if runner.join().is_err() {
        tracing::error!("Scheduler thread panicked");
    }
    for stats in scheduler.stats() {
        tracing::info!(
            collection = %stats.collection,
            executed = stats.executed,
            dropped = stats.dropped,
            "Executor summary"
        );
    }

    if let Some(e) = failure {
        return Err(e.into());
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        () = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
