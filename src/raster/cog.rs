//! Cloud Optimized GeoTIFF raster source.
//!
//! [`CogRaster::open`] validates the file once and keeps only immutable state:
//! the parsed pyramid, per-level tile locations and the resolved band/mask
//! configuration. Every [`read_tile`](RasterSource::read_tile) opens its own
//! reader from the [`ByteSource`], so concurrent reads never share a handle.

use std::path::Path;

use tracing::{debug, warn};

use super::mercator::{tile_bounds, ORIGIN_SHIFT};
use super::projection::{self, CrsTransform, EPSG_WEB_MERCATOR, EPSG_WGS84};
use super::source::{RasterMetadata, RasterSource, RasterTile};
use super::warp::{is_nodata, sample, LevelGrid, PixelMap, Resampling, TileCache};
use crate::error::{RasterError, TiffError};
use crate::format::geotiff::{read_geo_info, GeoTransform};
use crate::format::tiff::{
    decode_tile, validate_cog, Ifd, SampleLayout, TiffHeader, TiffPyramid, TiffTag, TileData,
    ValueReader, EXTRA_SAMPLE_ASSOCIATED_ALPHA, EXTRA_SAMPLE_UNASSOCIATED_ALPHA,
};
use crate::io::{ByteSource, LocalFile, RangeReader};

/// Points sampled along each edge when estimating the mercator resolution
const EDGE_SAMPLES: usize = 21;

/// Latitude limit of the web-mercator square
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

// =============================================================================
// Options
// =============================================================================

/// How nodata is chosen for the raster.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum NodataOption {
    /// Use the file's GDAL_NODATA value, if any
    #[default]
    Unset,
    /// Ignore any nodata value
    Disabled,
    /// Use this value
    Value(f64),
}

/// Settings applied when opening a COG.
#[derive(Debug, Clone, PartialEq)]
pub struct CogOptions {
    /// 1-based bands to read; `None` selects the defaults
    pub indexes: Option<Vec<usize>>,
    pub nodata: NodataOption,
    /// 1-based band holding validity; takes precedence over nodata
    pub alpha: Option<usize>,
    /// Output tile edge in pixels
    pub tile_size: u32,
    pub resampling: Resampling,
}

impl Default for CogOptions {
    fn default() -> Self {
        Self {
            indexes: None,
            nodata: NodataOption::Unset,
            alpha: None,
            tile_size: 512,
            resampling: Resampling::default(),
        }
    }
}

// =============================================================================
// CogRaster
// =============================================================================

/// One resolution level ready for reads.
#[derive(Debug, Clone)]
struct Level {
    grid: LevelGrid,
    transform: GeoTransform,
    tiles: TileData,
    layout: SampleLayout,
}

/// A COG opened for tile serving.
pub struct CogRaster<B: ByteSource> {
    source: B,
    header: TiffHeader,
    /// Finest first
    levels: Vec<Level>,
    metadata: RasterMetadata,
    resampling: Resampling,
}

impl CogRaster<LocalFile> {
    /// Open a COG from the local filesystem.
    pub fn open_path(path: impl AsRef<Path>, options: CogOptions) -> Result<Self, RasterError> {
        Self::open(LocalFile::new(path), options)
    }
}

impl<B: ByteSource> CogRaster<B> {
    /// Open and validate a COG.
    ///
    /// Fails with [`RasterError::NotCloudOptimized`] when the file is not
    /// tiled, has no overviews or uses an unsupported layout.
    pub fn open(source: B, options: CogOptions) -> Result<Self, RasterError> {
        let path = source.identifier().to_string();
        let reader = source.open().map_err(TiffError::from)?;
        let pyramid = TiffPyramid::parse(&reader)?;
        let header = pyramid.header;
        let not_cog = |reason: String| RasterError::NotCloudOptimized {
            path: path.clone(),
            reason,
        };

        let validation = validate_cog(&pyramid);
        for warning in &validation.warnings {
            warn!(path = %path, "{warning}");
        }
        if !validation.is_valid {
            return Err(not_cog(validation.reason()));
        }

        let base = pyramid
            .base_level()
            .ok_or_else(|| not_cog("full-resolution image is not tiled".to_string()))?;
        let geo = read_geo_info(&reader, &header, &base.ifd)?;
        projection::ensure_supported(geo.epsg)?;

        let mut levels = Vec::with_capacity(pyramid.levels.len());
        for level in &pyramid.levels {
            let layout = level.read_layout(&reader, &header)?;
            layout
                .validate()
                .map_err(|e| not_cog(format!("IFD {}: {e}", level.ifd_index)))?;
            let tiles = TileData::load(&reader, level, &header)?;
            levels.push(Level {
                grid: LevelGrid {
                    width: level.width,
                    height: level.height,
                    tile_width: level.tile_width,
                    tile_height: level.tile_height,
                    tiles_x: level.tiles_x,
                    samples_per_pixel: layout.samples_per_pixel,
                },
                transform: geo.transform.scaled(
                    base.width as f64 / level.width as f64,
                    base.height as f64 / level.height as f64,
                ),
                tiles,
                layout,
            });
        }

        let band_count = levels[0].layout.samples_per_pixel;
        if let Some(level) = levels
            .iter()
            .find(|l| l.layout.samples_per_pixel != band_count)
        {
            return Err(not_cog(format!(
                "overview has {} band(s), full resolution has {band_count}",
                level.layout.samples_per_pixel
            )));
        }

        let file_alpha = find_alpha_band(&reader, &header, &base.ifd, band_count)?;
        let bands = resolve_bands(&options, band_count, file_alpha, geo.nodata)?;

        let base_bounds = geo.transform.bounds(base.width, base.height);
        let bounds = geographic_bounds(base_bounds, geo.epsg)?;
        let native_resolution = mercator_resolution(base_bounds, base.width, base.height, geo.epsg)?;

        let metadata = RasterMetadata {
            path,
            bounds,
            indexes: bands.indexes,
            nodata: bands.nodata,
            alpha: bands.alpha,
            tile_size: options.tile_size,
            overview_levels: pyramid.overview_decimations(),
            native_resolution,
            band_count,
            epsg: geo.epsg,
        };

        debug!(
            path = %metadata.path,
            epsg = metadata.epsg,
            bands = band_count,
            levels = levels.len(),
            indexes = ?metadata.indexes,
            nodata = ?metadata.nodata,
            alpha = ?metadata.alpha,
            "Opened COG"
        );

        Ok(CogRaster {
            source,
            header,
            levels,
            metadata,
            resampling: options.resampling,
        })
    }

    /// Number of resolution levels, full resolution included.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Coarsest level whose pixels are no larger than the output pixels.
    fn select_level(&self, bounds: [f64; 4], size: usize, to_source: &CrsTransform) -> usize {
        let [min_x, min_y, max_x, max_y] = bounds;
        let corners = [(min_x, min_y), (min_x, max_y), (max_x, min_y), (max_x, max_y)];
        let projected: Result<Vec<(f64, f64)>, _> = corners
            .iter()
            .map(|&(x, y)| to_source.apply(x, y))
            .collect();
        let Ok(projected) = projected else {
            return self.levels.len() - 1;
        };

        let (xs, ys): (Vec<f64>, Vec<f64>) = projected.into_iter().unzip();
        let span = |v: &[f64]| {
            v.iter().copied().fold(f64::NEG_INFINITY, f64::max)
                - v.iter().copied().fold(f64::INFINITY, f64::min)
        };
        let target = (span(&xs) / size as f64).min(span(&ys) / size as f64);

        self.levels
            .iter()
            .rposition(|l| {
                let res = l.transform.pixel_width.abs().max(l.transform.pixel_height.abs());
                res <= target * (1.0 + 1e-9)
            })
            .unwrap_or(0)
    }

    /// Decode `indices` of `level` into a cache. Empty tiles (zero byte count)
    /// are filled with `fill`.
    fn load_tiles<R: RangeReader>(
        &self,
        reader: &R,
        level: &Level,
        indices: impl IntoIterator<Item = u32>,
        fill: f32,
    ) -> Result<TileCache, RasterError> {
        let (tw, th) = (level.grid.tile_width as usize, level.grid.tile_height as usize);
        let mut cache = TileCache::new();
        for index in indices {
            let (offset, byte_count) =
                level
                    .tiles
                    .get_tile_location(index)
                    .ok_or(TiffError::Decode {
                        index: index as usize,
                        message: "no tile location".to_string(),
                    })?;
            let samples = if byte_count == 0 {
                vec![fill; tw * th * level.layout.samples_per_pixel]
            } else {
                let bytes = reader
                    .read_exact_at(offset, byte_count as usize)
                    .map_err(TiffError::from)?;
                decode_tile(
                    &bytes,
                    &level.layout,
                    tw,
                    th,
                    level.tiles.jpeg_tables.as_deref(),
                    self.header.byte_order,
                    index as usize,
                )?
            };
            cache.insert(index, samples);
        }
        Ok(cache)
    }
}

impl<B: ByteSource> RasterSource for CogRaster<B> {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    fn read_tile(&self, z: u8, x: u32, y: u32) -> Result<RasterTile, RasterError> {
        let meta = &self.metadata;
        let size = meta.tile_size as usize;
        let bounds = tile_bounds(z, x, y);
        let to_source = CrsTransform::new(EPSG_WEB_MERCATOR, meta.epsg)?;

        let level_index = self.select_level(bounds, size, &to_source);
        let level = &self.levels[level_index];
        let map = PixelMap::build(bounds, size, &to_source, &level.transform, &level.grid);
        let needed = map.required_tiles(&level.grid, self.resampling);

        let nodata = meta.nodata.map(|v| v as f32);
        let mut samples: Vec<usize> = meta.indexes.iter().map(|i| i - 1).collect();
        if let Some(alpha) = meta.alpha {
            samples.push(alpha - 1);
        }

        debug!(
            z, x, y,
            level = level_index,
            source_tiles = needed.len(),
            "Reading tile"
        );

        let cache = if needed.is_empty() {
            TileCache::new()
        } else {
            let reader = self.source.open().map_err(TiffError::from)?;
            self.load_tiles(&reader, level, needed, nodata.unwrap_or(0.0))?
        };

        let mut data = sample(&map, &level.grid, &cache, &samples, self.resampling, nodata);
        let inside = map.inside();
        let pixels = data.pixels();
        let band_count = meta.indexes.len();

        let mask: Vec<u8> = if meta.alpha.is_some() {
            let alpha = data.band(band_count);
            inside
                .iter()
                .zip(alpha)
                .map(|(&i, &a)| if i && a > 0.0 { 255 } else { 0 })
                .collect()
        } else if let Some(nodata) = nodata {
            (0..pixels)
                .map(|p| {
                    let void = (0..band_count).all(|b| is_nodata(data.data[b * pixels + p], nodata));
                    if inside[p] && !void {
                        255
                    } else {
                        0
                    }
                })
                .collect()
        } else {
            inside.iter().map(|&i| if i { 255 } else { 0 }).collect()
        };

        data.data.truncate(band_count * pixels);
        data.bands = band_count;

        Ok(RasterTile { data, mask })
    }
}

// =============================================================================
// Band and mask resolution
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Bands {
    indexes: Vec<usize>,
    nodata: Option<f64>,
    alpha: Option<usize>,
}

/// 1-based band declared as alpha by ExtraSamples.
fn find_alpha_band<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
    band_count: usize,
) -> Result<Option<usize>, RasterError> {
    let Some(entry) = ifd.get_entry_by_tag(TiffTag::ExtraSamples) else {
        return Ok(None);
    };
    let extra = ValueReader::new(reader, header).read_u16_array(entry)?;
    let first_extra = band_count.saturating_sub(extra.len());
    Ok(extra
        .iter()
        .position(|&v| v == EXTRA_SAMPLE_ASSOCIATED_ALPHA || v == EXTRA_SAMPLE_UNASSOCIATED_ALPHA)
        .map(|pos| first_extra + pos + 1))
}

/// Settle band indexes, nodata and alpha.
///
/// An explicit alpha band disables nodata. Without an explicit selection, a
/// 4-band file whose ExtraSamples declares an alpha channel is read as RGB
/// plus that alpha, provided no nodata applies.
fn resolve_bands(
    options: &CogOptions,
    band_count: usize,
    file_alpha: Option<usize>,
    file_nodata: Option<f64>,
) -> Result<Bands, RasterError> {
    let check = |index: usize| -> Result<usize, RasterError> {
        if (1..=band_count).contains(&index) {
            Ok(index)
        } else {
            Err(RasterError::InvalidBandIndex { index, band_count })
        }
    };

    let mut alpha = options.alpha.map(check).transpose()?;
    let mut nodata = match options.nodata {
        NodataOption::Value(v) => Some(v),
        NodataOption::Disabled => None,
        NodataOption::Unset => file_nodata,
    };
    if alpha.is_some() {
        nodata = None;
    }

    let indexes = match &options.indexes {
        Some(indexes) => indexes.iter().map(|&i| check(i)).collect::<Result<Vec<_>, _>>()?,
        None => {
            if alpha.is_none() && nodata.is_none() && band_count == 4 && file_alpha.is_some() {
                alpha = file_alpha;
            }
            (1..=band_count).filter(|&b| Some(b) != alpha).collect()
        }
    };

    if indexes.len() != 1 && indexes.len() != 3 {
        return Err(RasterError::UnsupportedBandCount(indexes.len()));
    }

    Ok(Bands {
        indexes,
        nodata,
        alpha,
    })
}

// =============================================================================
// Bounds and resolution
// =============================================================================

/// Corners of `bounds` in EPSG:4326 as [west, south, east, north].
fn geographic_bounds(bounds: [f64; 4], epsg: u32) -> Result<[f64; 4], RasterError> {
    let to_wgs84 = CrsTransform::new(epsg, EPSG_WGS84)?;
    let [min_x, min_y, max_x, max_y] = bounds;
    let mut out = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for (x, y) in [(min_x, min_y), (min_x, max_y), (max_x, min_y), (max_x, max_y)] {
        let (lng, lat) = to_wgs84.apply(x, y)?;
        out[0] = out[0].min(lng);
        out[1] = out[1].min(lat);
        out[2] = out[2].max(lng);
        out[3] = out[3].max(lat);
    }
    Ok(out)
}

/// Pixel size of the raster once warped to EPSG:3857: the diagonal of the
/// projected extent divided by the pixel diagonal.
fn mercator_resolution(
    bounds: [f64; 4],
    width: u32,
    height: u32,
    epsg: u32,
) -> Result<f64, RasterError> {
    let to_wgs84 = CrsTransform::new(epsg, EPSG_WGS84)?;
    let to_mercator = CrsTransform::new(EPSG_WGS84, EPSG_WEB_MERCATOR)?;
    let [min_x, min_y, max_x, max_y] = bounds;

    let mut extent = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    let steps = (EDGE_SAMPLES - 1) as f64;
    for i in 0..EDGE_SAMPLES {
        let t = i as f64 / steps;
        let x = min_x + t * (max_x - min_x);
        let y = min_y + t * (max_y - min_y);
        for (px, py) in [(x, min_y), (x, max_y), (min_x, y), (max_x, y)] {
            let (lng, lat) = to_wgs84.apply(px, py)?;
            let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
            let (mx, my) = to_mercator.apply(lng, lat)?;
            extent[0] = extent[0].min(mx.max(-ORIGIN_SHIFT));
            extent[1] = extent[1].min(my);
            extent[2] = extent[2].max(mx.min(ORIGIN_SHIFT));
            extent[3] = extent[3].max(my);
        }
    }

    let diagonal = (extent[2] - extent[0]).hypot(extent[3] - extent[1]);
    let pixels = (width as f64).hypot(height as f64);
    Ok(diagonal / pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CogOptions {
        CogOptions::default()
    }

    #[test]
    fn test_default_bands() {
        let bands = resolve_bands(&options(), 3, None, None).unwrap();
        assert_eq!(bands.indexes, vec![1, 2, 3]);
        assert_eq!((bands.nodata, bands.alpha), (None, None));

        let bands = resolve_bands(&options(), 1, None, Some(-9999.0)).unwrap();
        assert_eq!(bands.indexes, vec![1]);
        assert_eq!(bands.nodata, Some(-9999.0));
    }

    #[test]
    fn test_rgba_uses_extra_sample_alpha() {
        let bands = resolve_bands(&options(), 4, Some(4), None).unwrap();
        assert_eq!(bands.indexes, vec![1, 2, 3]);
        assert_eq!(bands.alpha, Some(4));

        // A nodata value keeps the alpha band out of the mask
        let mut opts = options();
        opts.nodata = NodataOption::Value(0.0);
        assert!(matches!(
            resolve_bands(&opts, 4, Some(4), None),
            Err(RasterError::UnsupportedBandCount(4))
        ));
    }

    #[test]
    fn test_explicit_alpha_disables_nodata() {
        let mut opts = options();
        opts.alpha = Some(4);
        let bands = resolve_bands(&opts, 4, None, Some(0.0)).unwrap();
        assert_eq!(bands.indexes, vec![1, 2, 3]);
        assert_eq!(bands.nodata, None);
        assert_eq!(bands.alpha, Some(4));
    }

    #[test]
    fn test_nodata_options() {
        let mut opts = options();
        opts.nodata = NodataOption::Disabled;
        assert_eq!(resolve_bands(&opts, 3, None, Some(0.0)).unwrap().nodata, None);

        opts.nodata = NodataOption::Value(255.0);
        assert_eq!(resolve_bands(&opts, 3, None, Some(0.0)).unwrap().nodata, Some(255.0));
    }

    #[test]
    fn test_invalid_band_selection() {
        let mut opts = options();
        opts.indexes = Some(vec![1, 2, 5]);
        assert!(matches!(
            resolve_bands(&opts, 3, None, None),
            Err(RasterError::InvalidBandIndex { index: 5, band_count: 3 })
        ));

        opts.indexes = Some(vec![1, 2]);
        assert!(matches!(
            resolve_bands(&opts, 3, None, None),
            Err(RasterError::UnsupportedBandCount(2))
        ));

        assert!(matches!(
            resolve_bands(&options(), 2, None, None),
            Err(RasterError::UnsupportedBandCount(2))
        ));
    }

    #[test]
    fn test_geographic_bounds_mercator() {
        let [west, south, east, north] =
            geographic_bounds([0.0, 0.0, ORIGIN_SHIFT, ORIGIN_SHIFT], 3857).unwrap();
        assert!((west - 0.0).abs() < 1e-9);
        assert!((south - 0.0).abs() < 1e-9);
        assert!((east - 180.0).abs() < 1e-9);
        assert!((north - MAX_MERCATOR_LAT).abs() < 1e-6);
    }

    #[test]
    fn test_mercator_resolution_identity() {
        // 1000 x 500 pixels of 2 m in EPSG:3857
        let res = mercator_resolution([0.0, 0.0, 2000.0, 1000.0], 1000, 500, 3857).unwrap();
        assert!((res - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_mercator_resolution_geographic() {
        // One degree square at the equator, 0.001 degree pixels
        let res = mercator_resolution([0.0, 0.0, 1.0, 1.0], 1000, 1000, 4326).unwrap();
        assert!(res > 110.0 && res < 112.5, "{res}");
    }
}
