//! rowcache - line-oriented host for the rowcache LRU cache

mod handler;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rowcache::{Cache, CacheConfig};
use tracing::{error, info};

use crate::handler::{CommandHandler, Reply};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target number of cached items
    #[arg(short, long, default_value_t = 10000)]
    capacity: usize,

    /// Slots per hash index row
    #[arg(long, default_value_t = rowcache::DEFAULT_ROW_WIDTH)]
    row_width: usize,

    /// Promote a record on every n-th hit
    #[arg(long, default_value_t = rowcache::DEFAULT_PROMOTE_EVERY)]
    promote_every: u32,

    /// Scheduler request queue capacity
    #[arg(long, default_value_t = rowcache::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Maximum expired records reclaimed per sweep
    #[arg(long, default_value_t = rowcache::DEFAULT_SWEEP_BATCH)]
    sweep_batch: usize,

    /// Sweep interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    sweep_interval_ms: u64,
}

impl Args {
    fn config(&self) -> CacheConfig {
        CacheConfig::new(self.capacity)
            .with_row_width(self.row_width)
            .with_promote_every(self.promote_every)
            .with_queue_capacity(self.queue_capacity)
            .with_sweep_batch(self.sweep_batch)
            .with_sweep_interval(Duration::from_millis(self.sweep_interval_ms))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = args.config();

    info!("Starting rowcache v{}", env!("CARGO_PKG_VERSION"));
    info!(
        capacity = config.capacity,
        row_width = config.row_width,
        rows = config.slot_count(),
        "Cache configured"
    );

    let (cache, scheduler) =
        Cache::<String>::with_config(config).context("invalid cache configuration")?;
    let cache = Arc::new(cache);

    // Enqueueing blocks, so cache calls stay off the runtime threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    let scheduler_task = runtime.spawn(scheduler.run());

    let handler = CommandHandler::new(Arc::clone(&cache));
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if scheduler_task.is_finished() {
            error!("Cache scheduler exited unexpectedly");
            break;
        }

        let reply = handler.handle(&line);
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;

        if reply == Reply::Quit {
            break;
        }
    }

    cache.close();
    match runtime.block_on(scheduler_task) {
        Ok(dropped) => info!(dropped, "Cache scheduler drained"),
        Err(e) => error!("Cache scheduler failed: {}", e),
    }
    info!("Shutdown complete");

    Ok(())
}
