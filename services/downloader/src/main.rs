//! Map tile downloader.
//!
//! Downloads every tile of the configured region for each configured zoom
//! level into `<map dir>/tiles/<zoom>/`, pausing between busy bursts.
//! Tiles already on disk are skipped, so an interrupted run can simply be
//! started again.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use downloader::{FetchRun, MirrorPool, Pacer, TileFetcher};
use map_common::{template, Layer, MapConfig};
use storage::TileStore;

#[derive(Parser, Debug)]
#[command(name = "downloader")]
#[command(about = "Download map tiles for a rectangular region")]
struct Args {
    /// Layer to download (vec, sat)
    #[arg(long, env = "MAP_LAYER")]
    layer: Layer,

    /// Configuration file
    #[arg(long, env = "MAP_CONFIG")]
    conf: PathBuf,

    /// Seed for mirror choice and burst pacing (random if omitted)
    #[arg(long, env = "MAP_SEED")]
    seed: Option<u64>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args);

    let config = MapConfig::load(&args.conf)
        .with_context(|| format!("Failed to load configuration from {}", args.conf.display()))?;
    let version = config.version_for(args.layer)?.to_string();

    let map_dir = config.map_dir(args.layer, &version, &template::today());
    tokio::fs::create_dir_all(&map_dir)
        .await
        .with_context(|| format!("Failed to create map directory {}", map_dir.display()))?;

    info!(
        layer = %args.layer,
        version = %version,
        corner1 = ?config.region.corner1,
        corner2 = ?config.region.corner2,
        zooms = ?config.region.zooms,
        map_dir = %map_dir.display(),
        "Starting tile download"
    );

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mirrors = MirrorPool::new(
        config.mirrors_for(args.layer),
        StdRng::seed_from_u64(rng.gen()),
    );
    debug!(mirrors = ?mirrors.hosts(), "Mirror pool");
    let pacer = Pacer::new(config.pacing.clone(), StdRng::seed_from_u64(rng.gen()));

    let config = Arc::new(config);
    let store = Arc::new(TileStore::new(&map_dir));
    let fetcher = Arc::new(TileFetcher::new(&config, args.layer, store, mirrors)?);
    let mut run = FetchRun::new(Arc::clone(&config), fetcher, pacer);

    // Handle Ctrl+C
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx.send(()).ok();
    });

    let summary = match run.run(shutdown_rx).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(kind = ?e.kind(), error = %e, "Download run aborted");
            return Err(e.into());
        }
    };

    info!(
        fetched = summary.fetched,
        cached = summary.cached,
        network_failures = summary.network_failures,
        rejected = summary.rejected,
        storage_errors = summary.storage_errors,
        pauses = summary.pauses,
        zooms_completed = summary.zooms_completed,
        interrupted = summary.interrupted,
        map_dir = %map_dir.display(),
        "Download session complete"
    );

    Ok(())
}
