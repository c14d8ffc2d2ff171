//! cog-glui - Inspect a Cloud Optimized GeoTIFF in the browser.
//!
//! This binary opens the raster, starts the tile server and prints the
//! preview URL.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cog_glui::{
    config::Config,
    raster::{CogRaster, RasterSource, DEFAULT_MAX_ZOOM, DEFAULT_SNAP},
    server::{create_router, RouterConfig},
    tile::{Processing, TileService, WorkerPool},
    ScaleSpec,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    // Opening validates the COG; nothing is served from an invalid file
    let raster = match CogRaster::open_path(&config.path, config.cog_options()) {
        Ok(raster) => raster,
        Err(e) => {
            error!("Failed to open {}: {}", config.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let metadata = raster.metadata();
    let scale = if config.scale.is_empty() {
        None
    } else {
        match ScaleSpec::new(config.scale_pairs(), metadata.indexes.len()) {
            Ok(scale) => Some(scale),
            Err(e) => {
                error!("Configuration error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    };

    let min_zoom = raster.get_min_zoom(DEFAULT_SNAP, DEFAULT_MAX_ZOOM);
    let max_zoom = raster.get_max_zoom(DEFAULT_SNAP, DEFAULT_MAX_ZOOM);

    info!("Raster:");
    info!("  Path: {}", metadata.path);
    info!("  EPSG: {}", metadata.epsg);
    info!("  Bounds: {:?}", metadata.bounds);
    info!("  Bands: {:?} of {}", metadata.indexes, metadata.band_count);
    if let Some(nodata) = metadata.nodata {
        info!("  Nodata: {}", nodata);
    }
    if let Some(alpha) = metadata.alpha {
        info!("  Alpha band: {}", alpha);
    }
    info!("  Overviews: {:?}", metadata.overview_levels);
    info!("  Zoom range: {}-{}", min_zoom, max_zoom);
    info!("  Workers: {}", config.workers);

    let processing = Processing {
        scale,
        colormap: config.colormap(),
    };
    let tile_service =
        TileService::new(raster, WorkerPool::new(config.workers)).with_processing(processing);

    let router_config = build_router_config(&config, min_zoom, max_zoom);
    let mut url = if config.playground {
        router_config.playground_url()
    } else {
        router_config.index_url()
    };
    if let Some(token) = config.mapbox_token() {
        url = format!("{}?access_token={}", url, urlencoding::encode(token));
    }

    let router = create_router(tile_service, router_config);

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Inspecting {} at {}", config.path.display(), url);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "cog_glui=debug,tower_http=debug"
    } else {
        "cog_glui=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the CLI configuration.
fn build_router_config(config: &Config, min_zoom: u8, max_zoom: u8) -> RouterConfig {
    RouterConfig::new(&config.host, config.port)
        .with_tile_format(config.tiles_format)
        .with_zoom_range(min_zoom, max_zoom)
        .with_gl_tile_size(config.gl_tile_size)
        .with_tracing(!config.no_tracing)
}
