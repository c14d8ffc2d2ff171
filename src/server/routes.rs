//! Router configuration for cog-glui.
//!
//! # Route Structure
//!
//! ```text
//! /tiles/{z}/{x}/{y}.{format}   - Tile endpoint
//! /index.html                   - Map preview
//! /playground.html              - Map preview with color controls
//! *                             - 404
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cog_glui::raster::{CogOptions, CogRaster};
//! use cog_glui::server::{create_router, RouterConfig};
//! use cog_glui::tile::{TileService, WorkerPool};
//!
//! let raster = CogRaster::open_path("scene.tif", CogOptions::default())?;
//! let service = TileService::new(raster, WorkerPool::default());
//! let config = RouterConfig::new("127.0.0.1", 8080).with_zoom_range(12, 19);
//!
//! let router = create_router(service, config);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{
    fallback_handler, index_handler, playground_handler, tile_handler, AppState,
};
use super::templates::PageParams;
use crate::raster::{RasterSource, DEFAULT_MAX_ZOOM};
use crate::tile::{TileFormat, TileService};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router and the preview pages.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Host advertised in tile and preview URLs
    pub host: String,

    /// Port advertised in tile and preview URLs
    pub port: u16,

    /// Format used in the tile URL template
    pub tile_format: TileFormat,

    /// Zoom range advertised to mapbox-gl
    pub min_zoom: u8,
    pub max_zoom: u8,

    /// mapbox-gl `tileSize`
    pub gl_tile_size: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a configuration advertising `host:port`.
    ///
    /// By default tiles are PNG, the zoom range is 0 to 22, the mapbox-gl tile
    /// size is 512 and tracing is enabled.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tile_format: TileFormat::Png,
            min_zoom: 0,
            max_zoom: DEFAULT_MAX_ZOOM - 1,
            gl_tile_size: 512,
            enable_tracing: true,
        }
    }

    pub fn with_tile_format(mut self, format: TileFormat) -> Self {
        self.tile_format = format;
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_gl_tile_size(mut self, size: u32) -> Self {
        self.gl_tile_size = size;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Tile URL template, e.g. `http://127.0.0.1:8080/tiles/{z}/{x}/{y}.png`.
    pub fn tiles_url(&self) -> String {
        format!(
            "{}/tiles/{{z}}/{{x}}/{{y}}.{}",
            self.base_url(),
            self.tile_format.extension()
        )
    }

    pub fn index_url(&self) -> String {
        format!("{}/index.html", self.base_url())
    }

    pub fn playground_url(&self) -> String {
        format!("{}/playground.html", self.base_url())
    }

    /// Preview page parameters for a raster.
    pub fn page_params<R: RasterSource + ?Sized>(&self, raster: &R) -> PageParams {
        PageParams {
            tiles_url: self.tiles_url(),
            tiles_bounds: raster.get_bounds(),
            center: raster.get_center(),
            zoom: self.min_zoom,
            tiles_minzoom: self.min_zoom,
            tiles_maxzoom: self.max_zoom,
            tiles_size: self.gl_tile_size,
        }
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
///
/// The route table is fixed here; bounds and center for the preview pages
/// are read from the service's raster once.
pub fn create_router<R>(tile_service: TileService<R>, config: RouterConfig) -> Router
where
    R: RasterSource,
{
    let page = config.page_params(tile_service.raster());
    let app_state = AppState::new(tile_service, page);

    // {filename} captures "{y}.{format}"
    let router = Router::new()
        .route("/tiles/{z}/{x}/{filename}", get(tile_handler::<R>))
        .route("/index.html", get(index_handler::<R>))
        .route("/playground.html", get(playground_handler::<R>))
        .fallback(fallback_handler)
        .with_state(app_state);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}
