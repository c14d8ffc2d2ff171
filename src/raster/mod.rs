//! Raster access for tile serving.
//!
//! [`RasterSource`] is the capability the server depends on; [`CogRaster`]
//! implements it for Cloud Optimized GeoTIFFs, reprojecting pyramid levels
//! onto the web-mercator grid.

mod cog;
pub mod mercator;
pub mod projection;
mod source;
mod warp;

pub use cog::{CogOptions, CogRaster, NodataOption};
pub use source::{
    BandArray, RasterMetadata, RasterSource, RasterTile, DEFAULT_MAX_ZOOM, DEFAULT_SNAP,
};
pub use warp::Resampling;
