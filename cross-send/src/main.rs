//! cross-send - Background daemon for scheduled publishing
//!
//! Polls the queue at a fixed interval, publishes due posts, and
//! refreshes stale engagement metrics.

use clap::Parser;
use libcrosscast::{Config, Database, Result, Scheduler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "cross-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled publishing")]
#[command(long_about = "\
cross-send - Background daemon for scheduled publishing

DESCRIPTION:
    cross-send is a long-running daemon that watches the Crosscast queue
    and publishes scheduled posts when their time arrives. Each tick it
    also refreshes engagement metrics for published posts whose counts
    have gone stale.

    Each due post is handled independently: one post failing never
    blocks the rest of the batch. Ticks run strictly one at a time.

USAGE:
    # Run in foreground (logs to stderr)
    cross-send

    # Run with a custom poll interval
    cross-send --poll-interval 30

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current tick)

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Override with CROSSCAST_CONFIG.

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Credential error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due posts (default: 60)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run one tick and exit (for testing)
    #[arg(long, hide = true)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        libcrosscast::logging::init(libcrosscast::logging::LogFormat::Text, "debug", true);
    } else {
        libcrosscast::logging::init_default();
    }

    if let Err(e) = run(cli).await {
        error!("cross-send failed: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let scheduler = Scheduler::from_config(&config, db);

    info!("cross-send daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(config.scheduler.poll_interval);
    info!("Poll interval: {poll_interval}s");

    if cli.once {
        tick(&scheduler).await;
        info!("cross-send: ran one tick, exiting");
        return Ok(());
    }

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        tick(&scheduler).await;

        // Sleep until the next poll, checking for shutdown every second
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }

    info!("cross-send daemon stopped");
    Ok(())
}

/// One tick: publish due posts, then refresh stale metrics.
///
/// Both calls are awaited before the loop sleeps, so ticks from this
/// driver never overlap.
async fn tick(scheduler: &Scheduler) {
    match scheduler.run_scheduler().await {
        Ok(summary) if summary.processed > 0 => {
            let failed = summary.results.iter().filter(|r| !r.success).count();
            info!(
                processed = summary.processed,
                failed, "publish tick finished"
            );
        }
        Ok(_) => {}
        Err(e) => error!("publish tick failed: {e}"),
    }

    match scheduler.run_metrics_refresh().await {
        Ok(summary) if summary.checked > 0 => {
            info!(
                checked = summary.checked,
                updated = summary.updated,
                "metrics refresh finished"
            );
        }
        Ok(_) => {}
        Err(e) => error!("metrics refresh failed: {e}"),
    }
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libcrosscast::CrosscastError::InvalidInput(format!("Signal setup failed: {e}"))
    })?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}
