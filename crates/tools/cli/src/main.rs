//! price-engine - runs the price simulation against an in-memory store

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::cargo)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use bus::Bus;
use clap::{Parser, Subcommand};
use common::UpdateBatch;
use sim::{Broadcaster, GaussianNoise, PriceTick, SimConfig, SimRunner, TickEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use storage::{InstrumentStore, MemoryStore};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Instruments loaded when no seed file is given
const DEFAULT_SEED: &str = include_str!("../seed.json");

#[derive(Parser)]
#[command(name = "price-engine")]
#[command(about = "Simulated market prices with live fan-out")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine until Ctrl+C
    Run {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSON array of instrument rows
        #[arg(long)]
        seed: Option<PathBuf>,
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Validate a seed file and list what it would load
    Check {
        /// JSON array of instrument rows
        #[arg(long)]
        seed: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    match Cli::parse().command {
        Commands::Run {
            config,
            seed,
            duration_secs,
        } => run(config.as_deref(), seed.as_deref(), duration_secs).await,
        Commands::Check { seed } => check(&seed).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "price_engine=info,sim=info,storage=info,bus=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();
}

fn load_store(seed: Option<&Path>) -> Result<MemoryStore> {
    let json = match seed {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?,
        None => DEFAULT_SEED.to_string(),
    };
    MemoryStore::from_json(&json).context("invalid seed data")
}

async fn run(config: Option<&Path>, seed: Option<&Path>, duration_secs: Option<u64>) -> Result<()> {
    let config = SimConfig::load(config).context("failed to load configuration")?;
    let store = Arc::new(load_store(seed)?);
    info!(
        instruments = store.len(),
        tick_ms = config.tick_interval_ms,
        poll_ms = config.poll_interval_ms,
        topic = %config.topic,
        "Price engine configured"
    );

    let bus = Bus::<PriceTick>::new(config.channel_capacity);
    let broadcaster = Arc::new(Broadcaster::new(
        Arc::clone(&store),
        bus.topic(config.topic.clone()),
        config.poll_interval(),
    ));
    let engine = TickEngine::new(Arc::clone(&store), config.engine, GaussianNoise::new());
    let runner = SimRunner::new(engine, Arc::clone(&broadcaster), config.tick_interval());

    let subscription = broadcaster.subscribe(log_batch);
    runner.start().await;

    match duration_secs {
        Some(secs) => {
            info!(secs, "Running for a fixed duration. Press Ctrl+C to stop early.");
            tokio::select! {
                () = tokio::time::sleep(Duration::from_secs(secs)) => {}
                signal = tokio::signal::ctrl_c() => signal?,
            }
        }
        None => {
            info!("Running. Press Ctrl+C to stop.");
            tokio::signal::ctrl_c().await?;
        }
    }

    info!("Shutting down");
    runner.stop().await;
    subscription.unsubscribe();

    for instrument in store.list_instruments().await? {
        info!(
            symbol = %instrument.symbol,
            price = %instrument.price,
            halted = instrument.halted,
            "Final price"
        );
    }
    Ok(())
}

fn log_batch(batch: UpdateBatch) {
    info!(entries = batch.len(), "Batch received");
    for entry in &batch {
        debug!(
            symbol = %entry.symbol,
            price = %entry.price,
            halted = entry.halted,
            trajectory = %entry.trajectory,
            version = %entry.version,
            "Update"
        );
    }
}

async fn check(seed: &Path) -> Result<()> {
    let store = load_store(Some(seed))?;
    let instruments = store.list_instruments().await?;
    println!("{} instruments OK in {}", instruments.len(), seed.display());
    for instrument in instruments {
        let glide = instrument.glide.map_or_else(String::new, |g| {
            format!("  -> {} by {}ms", g.target_price(), g.end_time().as_millis())
        });
        println!(
            "{:<10} {:>12} {:<8} vol={:<6} drift={:<8}{}{}",
            instrument.symbol.as_str(),
            instrument.price.to_string(),
            instrument.trajectory.to_string(),
            instrument.volatility_base,
            instrument.drift_base,
            if instrument.halted { "  HALTED" } else { "" },
            glide,
        );
    }
    Ok(())
}
