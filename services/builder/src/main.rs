//! Mosaic builder.
//!
//! Stitches the tiles of one zoom level of a map directory into a single
//! image: first into `prepare/<bx>_<by>.jpg` blocks, then into the output
//! file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use map_common::tile::MAX_ZOOM;
use map_common::{template, MapConfig, MapError, TileRegion};
use mosaic::{composer_for, MosaicAssembler};
use projection::TilePlanner;
use storage::TileStore;

#[derive(Parser, Debug)]
#[command(name = "builder")]
#[command(about = "Build one mosaic image from downloaded tiles")]
struct Args {
    /// Map directory written by the downloader
    #[arg(long, env = "MAP_DIR")]
    dir: PathBuf,

    /// Configuration file
    #[arg(long, env = "MAP_CONFIG")]
    conf: PathBuf,

    /// Output image; `{date}` is replaced by today's date
    #[arg(long)]
    out: String,

    /// Zoom level to assemble (default: highest configured zoom)
    #[arg(long)]
    zoom: Option<u32>,

    /// Derive the region from the stored tiles instead of the configured corners
    #[arg(long)]
    scan_store: bool,

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

/// Output path with `{date}` resolved.
fn resolve_output(template_path: &str, date: &str) -> PathBuf {
    PathBuf::from(template::substitute(template_path, &[("date", date)]))
}

/// Zoom to assemble: the requested one or the highest configured zoom.
fn select_zoom(requested: Option<u32>, config: &MapConfig) -> Result<u32> {
    let zoom = requested.unwrap_or_else(|| config.max_zoom());
    if zoom > MAX_ZOOM {
        return Err(MapError::invalid(
            "zoom",
            format!("zoom {} exceeds the maximum of {}", zoom, MAX_ZOOM),
        )
        .into());
    }
    Ok(zoom)
}

/// Fail early when the map or tile directory is missing.
fn check_map_dir(store: &TileStore, zoom: u32) -> Result<()> {
    if !store.root().is_dir() {
        bail!("Map dir '{}' was not found", store.root().display());
    }
    let tiles = store.tiles_dir(zoom);
    if !tiles.is_dir() {
        bail!("Tiles dir '{}' was not found", tiles.display());
    }
    Ok(())
}

/// Region to assemble: the stored tiles' extent or the configured corners.
fn select_region(
    config: &MapConfig,
    store: &TileStore,
    zoom: u32,
    scan_store: bool,
) -> Result<TileRegion> {
    if scan_store {
        let region = store
            .scan_region(zoom)?
            .ok_or(MapError::EmptyRegion(zoom))?;
        return Ok(region);
    }
    Ok(TilePlanner::default().plan(&config.region.corner1, &config.region.corner2, zoom))
}

fn build(args: &Args, config: &MapConfig, date: &str) -> Result<PathBuf> {
    let zoom = select_zoom(args.zoom, config)?;
    let store = TileStore::new(&args.dir);
    check_map_dir(&store, zoom)?;

    let region = select_region(config, &store, zoom, args.scan_store)?;
    let output = resolve_output(&args.out, date);

    info!(
        map_dir = %args.dir.display(),
        zoom,
        region = %region,
        width = region.width(),
        height = region.height(),
        tiles_needed = region.len(),
        output = %output.display(),
        "Building mosaic"
    );

    let assembler = MosaicAssembler::new(
        store,
        composer_for(&config.mosaic),
        &config.mosaic.placeholder,
        config.mosaic.block_size,
    );
    let summary = assembler
        .build(&region, &output)
        .with_context(|| format!("Failed to build mosaic {}", output.display()))?;

    info!(
        blocks = summary.grid.len(),
        columns = summary.grid.columns,
        rows = summary.grid.rows,
        tiles_found = summary.tiles_found,
        tiles_missing = summary.tiles_missing,
        output = %summary.output.display(),
        "Mosaic complete"
    );
    Ok(summary.output)
}

fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args);

    let config = MapConfig::load(Path::new(&args.conf))
        .with_context(|| format!("Failed to load configuration from {}", args.conf.display()))?;

    build(&args, &config, &template::today())?;
    Ok(())
}
