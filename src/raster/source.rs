//! The raster capability the tile server is built on.
//!
//! [`RasterSource`] is the seam between the HTTP layer and raster access: the
//! server only needs immutable metadata and a `read_tile` call. Zoom-range
//! and tile-existence queries are pure functions of the metadata and come as
//! provided methods.

use super::mercator::{lnglat_to_tile, meters_per_pixel};
use crate::error::RasterError;

/// Default tolerance when matching native resolution to a zoom level
pub const DEFAULT_SNAP: f64 = 0.5;

/// Highest zoom level considered by the zoom estimators
pub const DEFAULT_MAX_ZOOM: u8 = 23;

// =============================================================================
// Pixel containers
// =============================================================================

/// Band-major pixel array: all of band 0, then all of band 1, ...
#[derive(Debug, Clone, PartialEq)]
pub struct BandArray<T> {
    pub bands: usize,
    pub width: usize,
    pub height: usize,
    pub data: Vec<T>,
}

impl<T: Copy + Default> BandArray<T> {
    /// Zero-filled array.
    pub fn new(bands: usize, width: usize, height: usize) -> Self {
        BandArray {
            bands,
            width,
            height,
            data: vec![T::default(); bands * width * height],
        }
    }
}

impl<T> BandArray<T> {
    /// Wrap an existing band-major buffer. Returns `None` on a length mismatch.
    pub fn from_vec(bands: usize, width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        (data.len() == bands * width * height).then_some(BandArray {
            bands,
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    pub fn band(&self, index: usize) -> &[T] {
        let n = self.pixels();
        &self.data[index * n..(index + 1) * n]
    }

    pub fn band_mut(&mut self, index: usize) -> &mut [T] {
        let n = self.pixels();
        &mut self.data[index * n..(index + 1) * n]
    }

    /// Apply `f` to every sample, keeping the shape.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> BandArray<U> {
        BandArray {
            bands: self.bands,
            width: self.width,
            height: self.height,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

/// One reprojected tile: pixel values for the selected bands plus a
/// validity mask (0 = invalid, 255 = valid) of `width * height` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTile {
    pub data: BandArray<f32>,
    pub mask: Vec<u8>,
}

impl RasterTile {
    /// Cast the samples to 8 bits, clamping and rounding.
    pub fn to_u8(&self) -> BandArray<u8> {
        self.data.clone().map(|v| {
            if v.is_nan() {
                0
            } else {
                v.round().clamp(0.0, 255.0) as u8
            }
        })
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Immutable description of an opened raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    /// Identifier of the dataset (path)
    pub path: String,

    /// WGS84 extent as [west, south, east, north]
    pub bounds: [f64; 4],

    /// 1-based band indexes returned by `read_tile`
    pub indexes: Vec<usize>,

    /// Sentinel marking invalid pixels
    pub nodata: Option<f64>,

    /// 1-based band holding per-pixel validity
    pub alpha: Option<usize>,

    /// Edge length of returned tiles in pixels
    pub tile_size: u32,

    /// Overview decimation factors, ascending
    pub overview_levels: Vec<u32>,

    /// Ground resolution of the full-resolution image in EPSG:3857 meters
    pub native_resolution: f64,

    /// Number of bands in the file
    pub band_count: usize,

    /// EPSG code of the source CRS
    pub epsg: u32,
}

// =============================================================================
// RasterSource
// =============================================================================

/// A raster that can be served as mercator tiles.
///
/// Implementations must be safe to call from many worker threads at once:
/// `read_tile` may not share mutable state (a file handle included) across
/// concurrent calls.
pub trait RasterSource: Send + Sync + 'static {
    fn metadata(&self) -> &RasterMetadata;

    /// Read a `tile_size` x `tile_size` tile covering mercator tile z/x/y.
    /// Pixels outside the raster extent are masked, never an error.
    fn read_tile(&self, z: u8, x: u32, y: u32) -> Result<RasterTile, RasterError>;

    fn get_bounds(&self) -> [f64; 4] {
        self.metadata().bounds
    }

    /// Midpoint of the bounds as [lng, lat].
    fn get_center(&self) -> [f64; 2] {
        let [west, south, east, north] = self.metadata().bounds;
        [(east - west) / 2.0 + west, (north - south) / 2.0 + south]
    }

    /// Whether tile z/x/y overlaps the raster.
    ///
    /// The upper ends of the tile range accept one extra tile; the lower ends
    /// are exact.
    fn tile_exists(&self, z: u8, x: u32, y: u32) -> bool {
        let [west, south, east, north] = self.metadata().bounds;
        let (min_x, min_y) = lnglat_to_tile(west, north, z);
        let (max_x, max_y) = lnglat_to_tile(east, south, z);
        let (x, y) = (x as u64, y as u64);
        x <= max_x.saturating_add(1)
            && x >= min_x
            && y <= max_y.saturating_add(1)
            && y >= min_y
    }

    /// First zoom (from 1 up) whose snapped pixel size is finer than the
    /// native resolution, `max_z` when none is.
    fn get_max_zoom(&self, snap: f64, max_z: u8) -> u8 {
        let resolution = self.metadata().native_resolution;
        (1..max_z)
            .find(|&z| {
                let mpp = meters_per_pixel(z, 0.0);
                mpp - (mpp / 2.0) * snap < resolution
            })
            .unwrap_or(max_z)
    }

    /// Highest zoom (from `max_z - 1` down) whose snapped pixel size is
    /// still coarser than the coarsest overview, 0 when none is.
    fn get_min_zoom(&self, snap: f64, max_z: u8) -> u8 {
        let metadata = self.metadata();
        let decimation = metadata.overview_levels.last().copied().unwrap_or(1);
        let resolution = metadata.native_resolution * decimation as f64;
        (0..max_z)
            .rev()
            .find(|&z| {
                let mpp = meters_per_pixel(z, 0.0);
                mpp - (mpp / 2.0) * snap > resolution
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(RasterMetadata);

    impl RasterSource for Fixed {
        fn metadata(&self) -> &RasterMetadata {
            &self.0
        }

        fn read_tile(&self, _z: u8, _x: u32, _y: u32) -> Result<RasterTile, RasterError> {
            let size = self.0.tile_size as usize;
            Ok(RasterTile {
                data: BandArray::new(self.0.indexes.len(), size, size),
                mask: vec![0; size * size],
            })
        }
    }

    fn fixture() -> Fixed {
        Fixed(RasterMetadata {
            path: "fixture.tif".to_string(),
            bounds: [
                -61.56738281249997,
                16.225223624120076,
                -61.5618896507246,
                16.23049792684362,
            ],
            indexes: vec![1, 2, 3],
            nodata: None,
            alpha: None,
            tile_size: 512,
            overview_levels: vec![2, 4, 8, 16, 32, 64],
            native_resolution: 0.298_582_141_738_970_3,
            band_count: 3,
            epsg: 3857,
        })
    }

    #[test]
    fn test_center() {
        let [lng, lat] = fixture().get_center();
        assert!((lng + 61.564_636_231_612_28).abs() < 1e-9);
        assert!((lat - 16.227_860_775_481_85).abs() < 1e-9);
    }

    #[test]
    fn test_tile_exists() {
        let raster = fixture();
        assert!(raster.tile_exists(18, 86240, 119094));
        assert!(!raster.tile_exists(18, 8240, 119094));

        // One-tile tolerance on the upper edge only
        let [west, south, east, north] = raster.get_bounds();
        let (min_x, min_y) = lnglat_to_tile(west, north, 18);
        let (max_x, max_y) = lnglat_to_tile(east, south, 18);
        let (min_x, min_y, max_x, max_y) = (min_x as u32, min_y as u32, max_x as u32, max_y as u32);
        assert!(raster.tile_exists(18, max_x + 1, max_y + 1));
        assert!(!raster.tile_exists(18, max_x + 2, max_y));
        assert!(!raster.tile_exists(18, max_x, max_y + 2));
        assert!(!raster.tile_exists(18, min_x - 1, min_y));
        assert!(!raster.tile_exists(18, min_x, min_y - 1));
    }

    #[test]
    fn test_tile_exists_beyond_u64_grid() {
        // 2^z no longer fits the tile index type
        let raster = fixture();
        for z in [64, 70, u8::MAX] {
            assert!(!raster.tile_exists(z, 1, 1));
            assert!(!raster.tile_exists(z, u32::MAX, u32::MAX));
        }
    }

    #[test]
    fn test_zoom_range() {
        let raster = fixture();
        assert_eq!(raster.get_max_zoom(DEFAULT_SNAP, DEFAULT_MAX_ZOOM), 19);
        assert_eq!(raster.get_min_zoom(DEFAULT_SNAP, DEFAULT_MAX_ZOOM), 12);
    }

    #[test]
    fn test_zoom_fallbacks() {
        let mut raster = fixture();
        raster.0.native_resolution = 1e-6;
        assert_eq!(raster.get_max_zoom(DEFAULT_SNAP, DEFAULT_MAX_ZOOM), DEFAULT_MAX_ZOOM);

        raster.0.native_resolution = 1e9;
        assert_eq!(raster.get_min_zoom(DEFAULT_SNAP, DEFAULT_MAX_ZOOM), 0);
        assert_eq!(raster.get_max_zoom(DEFAULT_SNAP, DEFAULT_MAX_ZOOM), 1);
    }

    #[test]
    fn test_snap_is_deterministic() {
        let raster = fixture();
        for snap in [0.0, 0.25, 0.5, 1.0] {
            assert_eq!(
                raster.get_max_zoom(snap, DEFAULT_MAX_ZOOM),
                raster.get_max_zoom(snap, DEFAULT_MAX_ZOOM)
            );
        }
        // A wider window lowers both ends of the range
        assert!(raster.get_min_zoom(1.0, DEFAULT_MAX_ZOOM) <= raster.get_min_zoom(0.0, DEFAULT_MAX_ZOOM));
        assert!(raster.get_max_zoom(1.0, DEFAULT_MAX_ZOOM) <= raster.get_max_zoom(0.0, DEFAULT_MAX_ZOOM));
    }

    #[test]
    fn test_band_array_and_cast() {
        let data = BandArray::from_vec(2, 2, 1, vec![-3.0, 12.4, 300.0, f32::NAN]).unwrap();
        assert_eq!(data.band(0), &[-3.0, 12.4]);
        assert_eq!(data.band(1)[0], 300.0);
        let tile = RasterTile {
            data,
            mask: vec![255, 0],
        };
        assert_eq!(tile.to_u8().data, vec![0, 12, 255, 0]);
        assert!(BandArray::from_vec(1, 2, 2, vec![0u8; 3]).is_none());
    }
}
