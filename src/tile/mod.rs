//! Tile service layer.
//!
//! This module turns raster reads into encoded map tiles:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  WorkerPool  │  │  Encoder        │  │
//! │  │  (bounded    │  │  (png, jpeg,    │  │
//! │  │   blocking)  │  │   webp)         │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              RasterSource               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: entry point for tile requests, runs the pipeline on the pool
//! - [`WorkerPool`]: caps concurrent blocking work
//! - [`TileFormat`]: requested image format and its encoding profile
//! - [`encode_tile`]: pixels + mask to image bytes
//!
//! Tiles are not cached; identical requests re-render identical bytes.

mod encoder;
mod pool;
mod service;

pub use encoder::{encode_tile, TileFormat, TileProfile, JPEG_QUALITY};
pub use pool::{WorkerPool, DEFAULT_WORKERS};
pub use service::{render_tile, Processing, TileRequest, TileService};
