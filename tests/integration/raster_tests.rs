//! Raster integration tests: opening COGs built in memory and reading
//! mercator tiles from them.

use std::io::Write;

use cog_glui::raster::mercator::{mercator_to_lnglat, tile_bounds};
use cog_glui::raster::{
    CogOptions, CogRaster, NodataOption, RasterSource, DEFAULT_MAX_ZOOM, DEFAULT_SNAP,
};
use cog_glui::{InMemory, RasterError};

use super::test_utils::{gradient, open_raster, Codec, CogBuilder, FIXTURE_TILE};

fn fixture_lnglat_bounds() -> [f64; 4] {
    let (z, x, y) = FIXTURE_TILE;
    let [west, south, east, north] = tile_bounds(z, x, y);
    let (w, s) = mercator_to_lnglat(west, south);
    let (e, n) = mercator_to_lnglat(east, north);
    [w, s, e, n]
}

fn assert_bounds_close(actual: [f64; 4], expected: [f64; 4]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-7, "{actual:?} vs {expected:?}");
    }
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_fixture_metadata() {
    let raster = open_raster(CogBuilder::new().build(), CogOptions::default());
    let metadata = raster.metadata();

    assert_eq!(metadata.path, "memory://fixture.tif");
    assert_eq!(metadata.epsg, 3857);
    assert_eq!(metadata.band_count, 3);
    assert_eq!(metadata.indexes, vec![1, 2, 3]);
    assert_eq!(metadata.overview_levels, vec![2, 4]);
    assert_eq!(metadata.tile_size, 512);
    assert_eq!(metadata.nodata, None);
    assert_eq!(metadata.alpha, None);
    assert_eq!(raster.level_count(), 3);
    assert_bounds_close(raster.get_bounds(), fixture_lnglat_bounds());

    let [w, s, e, n] = fixture_lnglat_bounds();
    let [lng, lat] = raster.get_center();
    assert!((lng - (w + e) / 2.0).abs() < 1e-9);
    assert!((lat - (s + n) / 2.0).abs() < 1e-9);
}

#[test]
fn test_fixture_zoom_range() {
    let raster = open_raster(CogBuilder::new().build(), CogOptions::default());

    // 1.19 m pixels, coarsest overview 4.78 m
    assert_eq!(raster.get_max_zoom(DEFAULT_SNAP, DEFAULT_MAX_ZOOM), 17);
    assert_eq!(raster.get_min_zoom(DEFAULT_SNAP, DEFAULT_MAX_ZOOM), 14);

    // Without overviews beyond 2 the minimum zoom moves in
    let raster = open_raster(
        CogBuilder::new().with_overviews(vec![2]).build(),
        CogOptions::default(),
    );
    assert_eq!(raster.get_min_zoom(DEFAULT_SNAP, DEFAULT_MAX_ZOOM), 15);
}

#[test]
fn test_fixture_tile_exists() {
    let raster = open_raster(CogBuilder::new().build(), CogOptions::default());
    let (z, x, y) = FIXTURE_TILE;

    assert!(raster.tile_exists(z, x, y));
    assert!(raster.tile_exists(z + 1, 2 * x + 1, 2 * y + 1));
    assert!(raster.tile_exists(z - 2, x / 4, y / 4));
    assert!(!raster.tile_exists(z, x - 2, y));
    assert!(!raster.tile_exists(z, x, y - 2));
    assert!(!raster.tile_exists(z, x + 3, y));
    assert!(!raster.tile_exists(z, x, y + 3));
}

#[test]
fn test_rgba_uses_alpha_band() {
    fn rgba(band: usize, x: u32, y: u32) -> u8 {
        match band {
            3 if x < 256 => 0,
            3 => 255,
            _ => gradient(band, x, y),
        }
    }
    let raster = open_raster(
        CogBuilder::new().with_bands(4).with_pattern(rgba).build(),
        CogOptions::default(),
    );
    assert_eq!(raster.metadata().indexes, vec![1, 2, 3]);
    assert_eq!(raster.metadata().alpha, Some(4));

    let (z, x, y) = FIXTURE_TILE;
    let tile = raster.read_tile(z, x, y).unwrap();
    assert_eq!(tile.data.bands, 3);
    assert_eq!(tile.mask[10 * 512 + 10], 0);
    assert_eq!(tile.mask[10 * 512 + 500], 255);
}

#[test]
fn test_band_selection() {
    let options = CogOptions {
        indexes: Some(vec![3, 2, 1]),
        ..CogOptions::default()
    };
    let raster = open_raster(CogBuilder::new().build(), options);
    let (z, x, y) = FIXTURE_TILE;
    let tile = raster.read_tile(z, x, y).unwrap();

    // Band 3 first
    let i = 40 * 512 + 100;
    assert!((tile.data.band(0)[i] - 76.0).abs() <= 1.0);
    assert!((tile.data.band(2)[i] - 50.0).abs() <= 1.0);

    let options = CogOptions {
        indexes: Some(vec![1, 2, 7]),
        ..CogOptions::default()
    };
    let result = CogRaster::open(
        InMemory::new(CogBuilder::new().build(), "bands.tif"),
        options,
    );
    assert!(matches!(
        result,
        Err(RasterError::InvalidBandIndex { index: 7, .. })
    ));
}

#[test]
fn test_two_bands_need_bidx() {
    let result = CogRaster::open(
        InMemory::new(CogBuilder::new().with_bands(2).build(), "two.tif"),
        CogOptions::default(),
    );
    assert!(matches!(result, Err(RasterError::UnsupportedBandCount(2))));
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_missing_overviews_is_not_cog() {
    let result = CogRaster::open(
        InMemory::new(CogBuilder::new().with_overviews(vec![]).build(), "flat.tif"),
        CogOptions::default(),
    );
    assert!(matches!(
        result,
        Err(RasterError::NotCloudOptimized { .. })
    ));
}

#[test]
fn test_not_a_tiff() {
    let result = CogRaster::open(
        InMemory::new(b"PNG not a tiff at all".to_vec(), "junk.tif"),
        CogOptions::default(),
    );
    assert!(matches!(result, Err(RasterError::Tiff(_))));
}

#[test]
fn test_missing_file() {
    let result = CogRaster::open_path("/definitely/not/here.tif", CogOptions::default());
    assert!(result.is_err());
}

// =============================================================================
// Tile Reads
// =============================================================================

#[test]
fn test_read_fixture_tile() {
    let raster = open_raster(CogBuilder::new().build(), CogOptions::default());
    let (z, x, y) = FIXTURE_TILE;
    let tile = raster.read_tile(z, x, y).unwrap();

    assert_eq!(tile.data.bands, 3);
    assert_eq!((tile.data.width, tile.data.height), (512, 512));
    assert!(tile.mask.iter().all(|&m| m == 255));

    let i = 40 * 512 + 100;
    assert!((tile.data.band(0)[i] - 50.0).abs() <= 1.0);
    assert!((tile.data.band(1)[i] - 20.0).abs() <= 1.0);
    assert!((tile.data.band(2)[i] - 76.0).abs() <= 1.0);
}

#[test]
fn test_uncompressed_matches_deflate() {
    let deflate = open_raster(CogBuilder::new().build(), CogOptions::default());
    let raw = open_raster(
        CogBuilder::new().with_codec(Codec::None).build(),
        CogOptions::default(),
    );
    let (z, x, y) = FIXTURE_TILE;
    let a = deflate.read_tile(z + 1, 2 * x, 2 * y).unwrap();
    let b = raw.read_tile(z + 1, 2 * x, 2 * y).unwrap();
    assert_eq!(a.data, b.data);
    assert_eq!(a.mask, b.mask);
}

#[test]
fn test_low_zoom_reads_overview_and_masks_outside() {
    let raster = open_raster(CogBuilder::new().build(), CogOptions::default());
    let (z, x, y) = FIXTURE_TILE;
    let tile = raster.read_tile(z - 2, x / 4, y / 4).unwrap();

    let valid = tile.mask.iter().filter(|&&m| m == 255).count();
    // The raster is a quarter of a z15 tile wide, so 1/16 of the z14 tile
    let expected = 512 * 512 / 16;
    assert!(valid.abs_diff(expected) < 512 * 4, "valid {valid}");
    assert!(tile.mask.iter().all(|&m| m == 0 || m == 255));
}

#[test]
fn test_nodata_from_file_and_override() {
    let bytes = CogBuilder::new().with_bands(1).with_nodata("-9999").build();
    let raster = open_raster(bytes.clone(), CogOptions::default());
    assert_eq!(raster.metadata().nodata, Some(-9999.0));

    let options = CogOptions {
        nodata: NodataOption::Value(0.0),
        ..CogOptions::default()
    };
    assert_eq!(open_raster(bytes.clone(), options).metadata().nodata, Some(0.0));

    let options = CogOptions {
        nodata: NodataOption::Disabled,
        ..CogOptions::default()
    };
    assert_eq!(open_raster(bytes, options).metadata().nodata, None);
}

#[test]
fn test_geographic_raster() {
    let raster = open_raster(CogBuilder::geographic().build(), CogOptions::default());
    assert_eq!(raster.metadata().epsg, 4326);
    assert_bounds_close(raster.get_bounds(), fixture_lnglat_bounds());

    // Same ground footprint as the mercator fixture
    assert_eq!(raster.get_max_zoom(DEFAULT_SNAP, DEFAULT_MAX_ZOOM), 17);

    let (z, x, y) = FIXTURE_TILE;
    let tile = raster.read_tile(z, x, y).unwrap();
    let center = 256 * 512 + 256;
    assert_eq!(tile.mask[center], 255);
    // Latitude spacing differs slightly between the grids
    assert!((tile.data.band(0)[center] - 128.0).abs() <= 2.0);
    assert!((tile.data.band(1)[center] - 128.0).abs() <= 3.0);
}

#[test]
fn test_open_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&CogBuilder::new().build()).unwrap();
    file.flush().unwrap();

    let raster = CogRaster::open_path(file.path(), CogOptions::default()).unwrap();
    let (z, x, y) = FIXTURE_TILE;
    let tile = raster.read_tile(z, x, y).unwrap();
    assert_eq!(tile.data.width, 512);
    assert!(tile.mask.iter().all(|&m| m == 255));
}
