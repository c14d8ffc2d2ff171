//! # cog-glui
//!
//! Inspect a Cloud Optimized GeoTIFF in the browser.
//!
//! The library serves one COG as web-mercator map tiles, reprojecting and
//! resampling pyramid levels on the fly, with an optional color-operation
//! chain per request and two mapbox-gl preview pages.
//!
//! ## Architecture
//!
//! - [`io`] - Positional byte reads over local files or memory
//! - [`mod@format`] - TIFF/BigTIFF, GeoTIFF and JPEG-in-TIFF parsing
//! - [`raster`] - `RasterSource` trait, mercator math, COG warping
//! - [`color`] - Color operations, rescaling and colormaps
//! - [`tile`] - Tile encoding, worker pool and tile service
//! - [`server`] - Axum handlers, router and preview pages
//! - [`config`] - CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use cog_glui::{create_router, CogOptions, CogRaster, RouterConfig, TileService, WorkerPool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let raster = CogRaster::open_path("scene.tif", CogOptions::default())?;
//!     let service = TileService::new(raster, WorkerPool::default());
//!     let router = create_router(service, RouterConfig::new("127.0.0.1", 8080));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod color;
pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod raster;
pub mod server;
pub mod tile;

// Re-export commonly used types
pub use color::{ColorChain, ColorOp, Colormap, ScaleSpec};
pub use config::Config;
pub use error::{ColorError, IoError, RasterError, TiffError, TileError};
pub use io::{ByteSource, InMemory, LocalFile, RangeReader};
pub use raster::{
    CogOptions, CogRaster, NodataOption, RasterMetadata, RasterSource, RasterTile, Resampling,
};
pub use server::{create_router, AppState, ErrorResponse, PageParams, RouterConfig};
pub use tile::{Processing, TileFormat, TileRequest, TileService, WorkerPool};
