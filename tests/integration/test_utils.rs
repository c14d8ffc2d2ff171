//! Test utilities for integration tests.
//!
//! [`CogBuilder`] writes small little-endian GeoTIFF COGs in memory: a tiled
//! base image, reduced-resolution overviews and the GeoTIFF tags the raster
//! layer reads.

use std::io::Write;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use flate2::write::ZlibEncoder;
use flate2::Compression as ZlibLevel;
use http_body_util::BodyExt;
use tower::ServiceExt;

use cog_glui::raster::mercator::{mercator_to_lnglat, tile_bounds};
use cog_glui::raster::{CogOptions, CogRaster};
use cog_glui::server::{create_router, RouterConfig};
use cog_glui::tile::{TileService, WorkerPool};
use cog_glui::InMemory;

/// The z16 tile the default fixture covers exactly.
pub const FIXTURE_TILE: (u8, u32, u32) = (16, 21560, 29773);

// =============================================================================
// Pixel Patterns
// =============================================================================

/// Default pattern: red ramps with x, green with y, blue stays mid-range.
pub fn gradient(band: usize, x: u32, y: u32) -> u8 {
    match band {
        0 => (x / 2) as u8,
        1 => (y / 2) as u8,
        _ => 64 + ((x + y) % 128) as u8,
    }
}

// =============================================================================
// COG Builder
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Deflate,
}

impl Codec {
    fn code(self) -> u16 {
        match self {
            Codec::None => 1,
            Codec::Deflate => 8,
        }
    }
}

/// Builder for in-memory COGs.
pub struct CogBuilder {
    width: u32,
    height: u32,
    tile_size: u32,
    bands: usize,
    overviews: Vec<u32>,
    codec: Codec,
    epsg: u16,
    /// (west, north) of the base image in CRS units
    origin: (f64, f64),
    /// Pixel size in CRS units
    pixel_size: (f64, f64),
    nodata: Option<String>,
    pattern: fn(usize, u32, u32) -> u8,
}

impl CogBuilder {
    /// 512 x 512 RGB over [`FIXTURE_TILE`] in EPSG:3857, 256-pixel tiles,
    /// deflate, overviews 2 and 4.
    pub fn new() -> Self {
        let (z, x, y) = FIXTURE_TILE;
        let [west, south, east, north] = tile_bounds(z, x, y);
        Self {
            width: 512,
            height: 512,
            tile_size: 256,
            bands: 3,
            overviews: vec![2, 4],
            codec: Codec::Deflate,
            epsg: 3857,
            origin: (west, north),
            pixel_size: ((east - west) / 512.0, (north - south) / 512.0),
            nodata: None,
            pattern: gradient,
        }
    }

    /// Same extent as [`CogBuilder::new`], in EPSG:4326.
    pub fn geographic() -> Self {
        let (z, x, y) = FIXTURE_TILE;
        let [west, south, east, north] = tile_bounds(z, x, y);
        let (lng_w, lat_s) = mercator_to_lnglat(west, south);
        let (lng_e, lat_n) = mercator_to_lnglat(east, north);
        Self {
            epsg: 4326,
            origin: (lng_w, lat_n),
            pixel_size: ((lng_e - lng_w) / 512.0, (lat_n - lat_s) / 512.0),
            ..Self::new()
        }
    }

    pub fn with_bands(mut self, bands: usize) -> Self {
        self.bands = bands;
        self
    }

    pub fn with_overviews(mut self, overviews: Vec<u32>) -> Self {
        self.overviews = overviews;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_nodata(mut self, nodata: &str) -> Self {
        self.nodata = Some(nodata.to_string());
        self
    }

    pub fn with_pattern(mut self, pattern: fn(usize, u32, u32) -> u8) -> Self {
        self.pattern = pattern;
        self
    }

    /// Build the file bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut levels = vec![(1u32, 0u32)];
        levels.extend(self.overviews.iter().map(|&f| (f, 1)));

        // Encoded tiles per level, tile-row major
        let tiles: Vec<Vec<Vec<u8>>> = levels
            .iter()
            .map(|&(factor, _)| self.encode_level(factor))
            .collect();

        // Entry counts are fixed per level, so IFD offsets are known up front
        let entry_counts: Vec<usize> = levels
            .iter()
            .map(|&(factor, subfile)| self.entries(factor, subfile, &[], &[]).len())
            .collect();
        let mut ifd_offsets = Vec::new();
        let mut cursor = 8u32;
        for count in &entry_counts {
            ifd_offsets.push(cursor);
            cursor += 2 + 12 * *count as u32 + 4;
        }
        let data_start = cursor;

        let mut data = Vec::new();
        let mut ifds = Vec::new();
        for (level, &(factor, subfile)) in levels.iter().enumerate() {
            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for tile in &tiles[level] {
                offsets.push(data_start + data.len() as u32);
                counts.push(tile.len() as u32);
                data.extend_from_slice(tile);
            }

            let mut entries = self.entries(factor, subfile, &offsets, &counts);
            entries.sort_by_key(|e| e.tag);

            let next = ifd_offsets.get(level + 1).copied().unwrap_or(0);
            ifds.extend(write_ifd(&entries, next, data_start, &mut data));
        }

        let mut out = Vec::with_capacity(data_start as usize + data.len());
        out.extend_from_slice(b"II");
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&8u32.to_le_bytes());
        out.extend(ifds);
        assert_eq!(out.len() as u32, data_start);
        out.extend(data);
        out
    }

    fn level_size(&self, factor: u32) -> (u32, u32) {
        (
            self.width.div_ceil(factor),
            self.height.div_ceil(factor),
        )
    }

    /// Every tile of a level, padded to full tiles.
    fn encode_level(&self, factor: u32) -> Vec<Vec<u8>> {
        let (width, height) = self.level_size(factor);
        let ts = self.tile_size;
        let mut tiles = Vec::new();
        for ty in 0..height.div_ceil(ts) {
            for tx in 0..width.div_ceil(ts) {
                let mut raw = Vec::with_capacity((ts * ts) as usize * self.bands);
                for row in 0..ts {
                    for col in 0..ts {
                        let (x, y) = (tx * ts + col, ty * ts + row);
                        for band in 0..self.bands {
                            let value = if x < width && y < height {
                                (self.pattern)(band, x * factor, y * factor)
                            } else {
                                0
                            };
                            raw.push(value);
                        }
                    }
                }
                tiles.push(match self.codec {
                    Codec::None => raw,
                    Codec::Deflate => {
                        let mut encoder = ZlibEncoder::new(Vec::new(), ZlibLevel::default());
                        encoder.write_all(&raw).unwrap();
                        encoder.finish().unwrap()
                    }
                });
            }
        }
        tiles
    }

    fn entries(&self, factor: u32, subfile: u32, offsets: &[u32], counts: &[u32]) -> Vec<Entry> {
        let (width, height) = self.level_size(factor);
        let tile_count = (width.div_ceil(self.tile_size) * height.div_ceil(self.tile_size)) as usize;
        let pad = |v: &[u32]| -> Vec<u32> {
            let mut v = v.to_vec();
            v.resize(tile_count, 0);
            v
        };
        let photometric = if self.bands >= 3 { 2 } else { 1 };

        let mut entries = vec![
            Entry::long(254, &[subfile]),
            Entry::long(256, &[width]),
            Entry::long(257, &[height]),
            Entry::short(258, &vec![8; self.bands]),
            Entry::short(259, &[self.codec.code()]),
            Entry::short(262, &[photometric]),
            Entry::short(277, &[self.bands as u16]),
            Entry::short(284, &[1]),
            Entry::long(322, &[self.tile_size]),
            Entry::long(323, &[self.tile_size]),
            Entry::long(324, &pad(offsets)),
            Entry::long(325, &pad(counts)),
            Entry::short(339, &vec![1; self.bands]),
        ];
        if self.bands == 4 {
            // Unassociated alpha
            entries.push(Entry::short(338, &[2]));
        }

        if subfile == 0 {
            let (west, north) = self.origin;
            let (sx, sy) = self.pixel_size;
            entries.push(Entry::double(33550, &[sx, sy, 0.0]));
            entries.push(Entry::double(33922, &[0.0, 0.0, 0.0, west, north, 0.0]));
            entries.push(Entry::short(34735, &self.geokeys()));
            if let Some(nodata) = &self.nodata {
                entries.push(Entry::ascii(42113, nodata));
            }
        }
        entries
    }

    fn geokeys(&self) -> Vec<u16> {
        let (model, crs_key) = if self.epsg == 4326 {
            (2, 2048) // ModelTypeGeographic, GeographicTypeGeoKey
        } else {
            (1, 3072) // ModelTypeProjected, ProjectedCSTypeGeoKey
        };
        vec![
            1, 1, 0, 3, // header: version, revision, minor, key count
            1024, 0, 1, model, // GTModelTypeGeoKey
            1025, 0, 1, 1, // GTRasterTypeGeoKey = PixelIsArea
            crs_key, 0, 1, self.epsg,
        ]
    }
}

impl Default for CogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A tag with its value already serialized little-endian.
struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    bytes: Vec<u8>,
}

impl Entry {
    fn short(tag: u16, values: &[u16]) -> Self {
        Self {
            tag,
            field_type: 3,
            count: values.len() as u32,
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn long(tag: u16, values: &[u32]) -> Self {
        Self {
            tag,
            field_type: 4,
            count: values.len() as u32,
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn double(tag: u16, values: &[f64]) -> Self {
        Self {
            tag,
            field_type: 12,
            count: values.len() as u32,
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn ascii(tag: u16, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        Self {
            tag,
            field_type: 2,
            count: bytes.len() as u32,
            bytes,
        }
    }
}

/// Serialize one IFD; values over 4 bytes are appended to `data`.
fn write_ifd(entries: &[Entry], next: u32, data_start: u32, data: &mut Vec<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&entry.field_type.to_le_bytes());
        out.extend_from_slice(&entry.count.to_le_bytes());
        if entry.bytes.len() <= 4 {
            let mut inline = entry.bytes.clone();
            inline.resize(4, 0);
            out.extend(inline);
        } else {
            if data.len() % 2 == 1 {
                data.push(0);
            }
            let offset = data_start + data.len() as u32;
            data.extend_from_slice(&entry.bytes);
            out.extend_from_slice(&offset.to_le_bytes());
        }
    }
    out.extend_from_slice(&next.to_le_bytes());
    out
}

// =============================================================================
// Service Helpers
// =============================================================================

/// Open built bytes as a raster.
pub fn open_raster(bytes: Vec<u8>, options: CogOptions) -> CogRaster<InMemory> {
    CogRaster::open(InMemory::new(bytes, "memory://fixture.tif"), options).unwrap()
}

/// Router over the default fixture with default options.
pub fn fixture_router() -> Router {
    router_for(CogBuilder::new().build(), CogOptions::default())
}

pub fn router_for(bytes: Vec<u8>, options: CogOptions) -> Router {
    let service = TileService::new(open_raster(bytes, options), WorkerPool::new(4));
    create_router(service, RouterConfig::new("127.0.0.1", 8080).with_tracing(false))
}

/// GET `uri` through the router.
pub async fn get(router: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.oneshot(request).await.unwrap()
}

/// Collect a response body.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// URL of the default fixture tile in `format`.
pub fn fixture_tile_uri(format: &str) -> String {
    let (z, x, y) = FIXTURE_TILE;
    format!("/tiles/{z}/{x}/{y}.{format}")
}
