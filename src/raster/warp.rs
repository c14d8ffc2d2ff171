//! Reprojection of a pyramid level onto a mercator tile.
//!
//! Warping happens in three passes:
//!
//! 1. [`PixelMap::build`] maps each output pixel centre from EPSG:3857 to
//!    the source CRS and then to continuous pixel coordinates of the level.
//! 2. [`PixelMap::required_tiles`] lists the source tiles those coordinates
//!    touch, so the caller decodes each of them exactly once.
//! 3. [`sample`] reads the decoded tiles (nearest or bilinear).

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use super::projection::CrsTransform;
use super::source::BandArray;
use crate::format::geotiff::GeoTransform;

// =============================================================================
// Resampling
// =============================================================================

/// Resampling kernel used when reading source pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Resampling {
    Nearest,
    #[default]
    Bilinear,
}

impl Resampling {
    pub fn name(self) -> &'static str {
        match self {
            Resampling::Nearest => "nearest",
            Resampling::Bilinear => "bilinear",
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Resampling::Nearest),
            "bilinear" => Ok(Resampling::Bilinear),
            other => Err(format!(
                "unknown resampling '{other}', expected nearest or bilinear"
            )),
        }
    }
}

// =============================================================================
// Level grid
// =============================================================================

/// Tile grid of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelGrid {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub samples_per_pixel: usize,
}

impl LevelGrid {
    #[inline]
    fn tile_of(&self, col: u32, row: u32) -> u32 {
        (row / self.tile_height) * self.tiles_x + col / self.tile_width
    }

    /// Offset of the first sample of pixel (col, row) inside its tile.
    #[inline]
    fn offset_in_tile(&self, col: u32, row: u32) -> usize {
        let (tx, ty) = (col % self.tile_width, row % self.tile_height);
        (ty as usize * self.tile_width as usize + tx as usize) * self.samples_per_pixel
    }

    #[inline]
    fn contains(&self, px: f64, py: f64) -> bool {
        px >= 0.0 && py >= 0.0 && px < self.width as f64 && py < self.height as f64
    }

    /// Pixels read for continuous coordinate (px, py), clamped to the level.
    fn neighbours(&self, px: f64, py: f64, resampling: Resampling) -> Kernel {
        let max_col = self.width.saturating_sub(1) as f64;
        let max_row = self.height.saturating_sub(1) as f64;
        match resampling {
            Resampling::Nearest => Kernel::One(
                px.floor().clamp(0.0, max_col) as u32,
                py.floor().clamp(0.0, max_row) as u32,
            ),
            Resampling::Bilinear => {
                // Pixel centres sit at half-integer coordinates
                let (u, v) = (px - 0.5, py - 0.5);
                let (u0, v0) = (u.floor(), v.floor());
                let (fu, fv) = (u - u0, v - v0);
                let col = |c: f64| c.clamp(0.0, max_col) as u32;
                let row = |r: f64| r.clamp(0.0, max_row) as u32;
                Kernel::Four([
                    (col(u0), row(v0), (1.0 - fu) * (1.0 - fv)),
                    (col(u0 + 1.0), row(v0), fu * (1.0 - fv)),
                    (col(u0), row(v0 + 1.0), (1.0 - fu) * fv),
                    (col(u0 + 1.0), row(v0 + 1.0), fu * fv),
                ])
            }
        }
    }
}

enum Kernel {
    One(u32, u32),
    Four([(u32, u32, f64); 4]),
}

impl Kernel {
    fn pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let (one, four) = match self {
            Kernel::One(c, r) => (Some((*c, *r)), None),
            Kernel::Four(taps) => (None, Some(taps.iter().map(|&(c, r, _)| (c, r)))),
        };
        one.into_iter().chain(four.into_iter().flatten())
    }
}

// =============================================================================
// Pixel map
// =============================================================================

/// Source pixel coordinates of every output pixel, `None` outside the level.
#[derive(Debug, Clone)]
pub struct PixelMap {
    pub width: usize,
    pub height: usize,
    coords: Vec<Option<(f64, f64)>>,
}

impl PixelMap {
    /// Map a `size` x `size` grid over `bounds` (EPSG:3857, min_x/min_y/max_x/max_y).
    ///
    /// `to_source` converts EPSG:3857 to the raster CRS; points it cannot
    /// project are treated as outside the raster.
    pub fn build(
        bounds: [f64; 4],
        size: usize,
        to_source: &CrsTransform,
        transform: &GeoTransform,
        grid: &LevelGrid,
    ) -> Self {
        let [min_x, min_y, max_x, max_y] = bounds;
        let res_x = (max_x - min_x) / size as f64;
        let res_y = (max_y - min_y) / size as f64;

        let mut coords = Vec::with_capacity(size * size);
        for row in 0..size {
            let my = max_y - (row as f64 + 0.5) * res_y;
            for col in 0..size {
                let mx = min_x + (col as f64 + 0.5) * res_x;
                let mapped = to_source
                    .apply(mx, my)
                    .ok()
                    .map(|(sx, sy)| transform.world_to_pixel(sx, sy))
                    .filter(|&(px, py)| grid.contains(px, py));
                coords.push(mapped);
            }
        }

        PixelMap {
            width: size,
            height: size,
            coords,
        }
    }

    /// Per-pixel flag: inside the source extent.
    pub fn inside(&self) -> Vec<bool> {
        self.coords.iter().map(Option::is_some).collect()
    }

    /// Source tiles touched by the map, in ascending index order.
    pub fn required_tiles(&self, grid: &LevelGrid, resampling: Resampling) -> BTreeSet<u32> {
        let mut tiles = BTreeSet::new();
        for &(px, py) in self.coords.iter().flatten() {
            for (col, row) in grid.neighbours(px, py, resampling).pixels() {
                tiles.insert(grid.tile_of(col, row));
            }
        }
        tiles
    }
}

// =============================================================================
// Sampling
// =============================================================================

/// NaN-aware nodata comparison.
#[inline]
pub fn is_nodata(value: f32, nodata: f32) -> bool {
    if nodata.is_nan() {
        value.is_nan()
    } else {
        value == nodata
    }
}

/// Decoded source tiles keyed by tile index, each holding interleaved samples.
pub type TileCache = HashMap<u32, Vec<f32>>;

struct Reader<'a> {
    grid: &'a LevelGrid,
    tiles: &'a TileCache,
    samples: &'a [usize],
    nodata: Option<f32>,
}

impl Reader<'_> {
    fn value(&self, col: u32, row: u32, sample: usize) -> Option<f32> {
        let tile = self.tiles.get(&self.grid.tile_of(col, row))?;
        tile.get(self.grid.offset_in_tile(col, row) + sample).copied()
    }

    /// A pixel is void when every selected sample equals nodata.
    fn is_void(&self, col: u32, row: u32) -> bool {
        match self.nodata {
            Some(nodata) => self.samples.iter().all(|&s| {
                self.value(col, row, s)
                    .map_or(true, |v| is_nodata(v, nodata))
            }),
            None => false,
        }
    }
}

/// Read `samples` (0-based sample offsets within a pixel) for every mapped
/// pixel. Unmapped pixels are filled with `nodata` or 0.
///
/// Bilinear weights skip void neighbours so nodata never bleeds into valid
/// pixels; a pixel whose four neighbours are all void stays nodata.
pub fn sample(
    map: &PixelMap,
    grid: &LevelGrid,
    tiles: &TileCache,
    samples: &[usize],
    resampling: Resampling,
    nodata: Option<f32>,
) -> BandArray<f32> {
    let fill = nodata.unwrap_or(0.0);
    let mut out = BandArray {
        bands: samples.len(),
        width: map.width,
        height: map.height,
        data: vec![fill; samples.len() * map.width * map.height],
    };
    let pixels = out.pixels();

    let reader = Reader {
        grid,
        tiles,
        samples,
        nodata,
    };

    for (index, coord) in map.coords.iter().enumerate() {
        let Some((px, py)) = *coord else {
            continue;
        };
        match grid.neighbours(px, py, resampling) {
            Kernel::One(col, row) => {
                for (band, &s) in samples.iter().enumerate() {
                    if let Some(v) = reader.value(col, row, s) {
                        out.data[band * pixels + index] = v;
                    }
                }
            }
            Kernel::Four(taps) => {
                let taps: Vec<(u32, u32, f64)> = taps
                    .into_iter()
                    .filter(|&(c, r, w)| w > 0.0 && !reader.is_void(c, r))
                    .collect();
                let total: f64 = taps.iter().map(|t| t.2).sum();
                if total <= 0.0 {
                    continue;
                }
                for (band, &s) in samples.iter().enumerate() {
                    let mut acc = 0.0f64;
                    let mut weight = 0.0f64;
                    for &(c, r, w) in &taps {
                        if let Some(v) = reader.value(c, r, s) {
                            acc += v as f64 * w;
                            weight += w;
                        }
                    }
                    if weight > 0.0 {
                        out.data[band * pixels + index] = (acc / weight) as f32;
                    }
                }
            }
        }
    }

    out
}
