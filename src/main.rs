//! DEX Maintenance Keeper
//!
//! Run with: cargo run
//!
//! Two background crons:
//! - Maintenance scheduler: every tick, submits one router `maintenance`
//!   transaction per pool with outstanding trades (single-flight cycles).
//! - Subgraph sync: polls the indexer's `_meta` head for observability.

use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod chain;
mod config;
mod pipeline;
mod pool;
mod scheduler;
mod subgraph;

use chain::RouterClient;
use config::Config;
use pipeline::ExecutionPipeline;
use pool::GraphqlPoolStore;
use scheduler::MaintenanceScheduler;
use subgraph::SubgraphSync;

#[derive(Parser, Debug)]
#[command(version, about = "Maintenance keeper for DEX pools")]
struct Args {
    /// Run a single maintenance cycle and exit
    #[arg(long)]
    once: bool,

    /// Disable the subgraph sync cron
    #[arg(long)]
    no_subgraph_sync: bool,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🔧 DEX KEEPER - Pool Maintenance Daemon").cyan().bold()
    );
    println!(
        "{}",
        style("    Single-Flight Cycles | Per-Pool Fault Isolation").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dex_keeper=info".parse()?),
        )
        .init();

    let args = Args::parse();

    print_banner();

    let config = Config::from_env()?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }

    config.print_summary();
    println!();

    // Wiring: pool store + chain client feed the pipeline, the scheduler
    // drives it.
    let store = Arc::new(GraphqlPoolStore::new(config.pool_store_url.clone()));
    let chain = Arc::new(RouterClient::new(&config)?);
    let pipeline = Arc::new(ExecutionPipeline::new(
        store,
        chain,
        config.confirmation_timeout,
    ));
    let scheduler = MaintenanceScheduler::new(pipeline, config.maintenance_interval);

    if args.once {
        info!("--once: running a single maintenance cycle");
        scheduler.run_once().await;
        return Ok(());
    }

    let maintenance = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    let subgraph_sync = match (&config.subgraph_url, args.no_subgraph_sync) {
        (Some(url), false) => {
            let sync = SubgraphSync::new(url.clone(), config.subgraph_sync_interval);
            Some(tokio::spawn(async move { sync.run().await }))
        }
        (None, false) => {
            info!("SUBGRAPH_URL not set, subgraph sync disabled");
            None
        }
        (_, true) => {
            info!("subgraph sync disabled by --no-subgraph-sync");
            None
        }
    };

    info!("keeper running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping");

    maintenance.abort();
    if let Some(task) = subgraph_sync {
        task.abort();
    }

    Ok(())
}
