//! Tile service orchestrating the tile pipeline.
//!
//! ```text
//! get_tile(z, x, y, format, color)
//!   ├─ tile_exists?          no → NotFound (no worker used)
//!   ├─ parse color chain     error → InvalidColorExpression
//!   └─ worker pool
//!        read_tile → rescale | to_u8 → color chain → colormap → encode
//! ```

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::debug;

use crate::color::{rescale, ColorChain, Colormap, ScaleSpec};
use crate::error::TileError;
use crate::raster::RasterSource;

use super::encoder::{encode_tile, TileFormat};
use super::pool::WorkerPool;

// =============================================================================
// Tile Request
// =============================================================================

/// A request for one mercator tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    pub z: u8,
    pub x: u32,
    pub y: u32,
    pub format: TileFormat,
    /// Color expression, if any
    pub color: Option<String>,
}

impl TileRequest {
    pub fn new(z: u8, x: u32, y: u32, format: TileFormat) -> Self {
        Self {
            z,
            x,
            y,
            format,
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Startup-time processing applied to every tile.
#[derive(Debug, Clone, Default)]
pub struct Processing {
    pub scale: Option<ScaleSpec>,
    pub colormap: Option<Colormap>,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Serves encoded tiles from a [`RasterSource`].
pub struct TileService<R: RasterSource> {
    raster: Arc<R>,
    pool: WorkerPool,
    processing: Arc<Processing>,
}

impl<R: RasterSource> TileService<R> {
    pub fn new(raster: R, pool: WorkerPool) -> Self {
        Self {
            raster: Arc::new(raster),
            pool,
            processing: Arc::new(Processing::default()),
        }
    }

    /// Set the rescale and colormap stages.
    pub fn with_processing(mut self, processing: Processing) -> Self {
        self.processing = Arc::new(processing);
        self
    }

    pub fn raster(&self) -> &R {
        &self.raster
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Produce the encoded image for a tile.
    ///
    /// Tiles outside the raster fail with [`TileError::NotFound`] before any
    /// worker is used.
    pub async fn get_tile(&self, request: TileRequest) -> Result<Bytes, TileError> {
        let TileRequest {
            z,
            x,
            y,
            format,
            color,
        } = request;

        if !self.raster.tile_exists(z, x, y) {
            return Err(TileError::NotFound { z, x, y });
        }

        let chain: ColorChain = color.as_deref().unwrap_or("").parse()?;

        let raster = Arc::clone(&self.raster);
        let processing = Arc::clone(&self.processing);
        self.pool
            .run(move || {
                let started = Instant::now();
                let bytes = render_tile(&*raster, z, x, y, format, &chain, &processing)?;
                debug!(
                    z, x, y,
                    format = %format,
                    bytes = bytes.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Rendered tile"
                );
                Ok(bytes)
            })
            .await
    }
}

impl<R: RasterSource> Clone for TileService<R> {
    fn clone(&self) -> Self {
        Self {
            raster: Arc::clone(&self.raster),
            pool: self.pool.clone(),
            processing: Arc::clone(&self.processing),
        }
    }
}

/// Blocking tile pipeline: read, rescale, color, colormap, encode.
pub fn render_tile<R: RasterSource + ?Sized>(
    raster: &R,
    z: u8,
    x: u32,
    y: u32,
    format: TileFormat,
    chain: &ColorChain,
    processing: &Processing,
) -> Result<Bytes, TileError> {
    let tile = raster.read_tile(z, x, y)?;

    let pixels = match &processing.scale {
        Some(scale) => rescale(&tile.data, &tile.mask, scale),
        None => tile.to_u8(),
    };
    let pixels = chain.apply(&pixels)?;
    let pixels = match &processing.colormap {
        Some(colormap) if pixels.bands == 1 => colormap.apply(&pixels),
        _ => pixels,
    };

    encode_tile(&pixels, &tile.mask, format)
}
