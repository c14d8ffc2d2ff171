//! GeoTIFF georeferencing.
//!
//! Reads the affine geotransform (ModelPixelScale + ModelTiepoint, or
//! ModelTransformation), the EPSG code from the GeoKey directory, and GDAL's
//! nodata tag.

use crate::error::{RasterError, TiffError};
use crate::io::RangeReader;

use super::tiff::{Ifd, TiffHeader, TiffTag, ValueReader};

/// GTModelTypeGeoKey
const KEY_MODEL_TYPE: u16 = 1024;

/// GTRasterTypeGeoKey
const KEY_RASTER_TYPE: u16 = 1025;

/// GeographicTypeGeoKey
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;

/// ProjectedCSTypeGeoKey
const KEY_PROJECTED_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

// =============================================================================
// GeoTransform
// =============================================================================

/// North-up affine transform from pixel (col, row) to CRS coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up rasters
    pub pixel_height: f64,
}

impl GeoTransform {
    /// From ModelPixelScale (sx, sy, sz) and one ModelTiepoint (i, j, k, x, y, z).
    pub fn from_scale_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        let (sx, sy) = (scale[0], scale[1]);
        Some(GeoTransform {
            origin_x: tiepoint[3] - tiepoint[0] * sx,
            origin_y: tiepoint[4] + tiepoint[1] * sy,
            pixel_width: sx,
            pixel_height: -sy,
        })
    }

    /// From a row-major 4x4 ModelTransformation matrix.
    pub fn from_matrix(m: &[f64]) -> Result<Self, RasterError> {
        if m.len() < 16 {
            return Err(RasterError::MissingGeoreference);
        }
        if m[1] != 0.0 || m[4] != 0.0 {
            return Err(RasterError::RotatedGeotransform);
        }
        Ok(GeoTransform {
            origin_x: m[3],
            origin_y: m[7],
            pixel_width: m[0],
            pixel_height: m[5],
        })
    }

    #[inline]
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    #[inline]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Extent of a `width` x `height` raster as (min_x, min_y, max_x, max_y).
    pub fn bounds(&self, width: u32, height: u32) -> [f64; 4] {
        let (x0, y0) = self.pixel_to_world(0.0, 0.0);
        let (x1, y1) = self.pixel_to_world(width as f64, height as f64);
        [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]
    }

    /// Same extent with pixels `factor_x` / `factor_y` times larger.
    pub fn scaled(&self, factor_x: f64, factor_y: f64) -> Self {
        GeoTransform {
            pixel_width: self.pixel_width * factor_x,
            pixel_height: self.pixel_height * factor_y,
            ..*self
        }
    }

    /// Move the origin from a pixel centre to its corner.
    pub fn shifted_half_pixel(&self) -> Self {
        let (origin_x, origin_y) = self.pixel_to_world(-0.5, -0.5);
        GeoTransform {
            origin_x,
            origin_y,
            ..*self
        }
    }
}

// =============================================================================
// GeoKeys
// =============================================================================

/// The GeoKeys this crate interprets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeoKeys {
    pub model_type: Option<u16>,
    pub raster_type: Option<u16>,
    pub geographic_type: Option<u16>,
    pub projected_type: Option<u16>,
}

impl GeoKeys {
    /// Parse a GeoKeyDirectory: a 4-short header followed by
    /// (key, location, count, value) quadruples. Only keys stored directly
    /// in the value slot (location 0) are read.
    pub fn parse(directory: &[u16]) -> Self {
        let mut keys = GeoKeys::default();
        let Some(&count) = directory.get(3) else {
            return keys;
        };

        for entry in directory[4..].chunks_exact(4).take(count as usize) {
            let (key, location, value) = (entry[0], entry[1], entry[3]);
            if location != 0 {
                continue;
            }
            match key {
                KEY_MODEL_TYPE => keys.model_type = Some(value),
                KEY_RASTER_TYPE => keys.raster_type = Some(value),
                KEY_GEOGRAPHIC_TYPE => keys.geographic_type = Some(value),
                KEY_PROJECTED_TYPE => keys.projected_type = Some(value),
                _ => {}
            }
        }
        keys
    }

    pub fn is_pixel_is_point(&self) -> bool {
        self.raster_type == Some(RASTER_PIXEL_IS_POINT)
    }

    /// EPSG code of the raster CRS.
    pub fn epsg(&self) -> Result<u32, RasterError> {
        let code = match self.model_type {
            Some(MODEL_TYPE_PROJECTED) => self.projected_type,
            Some(MODEL_TYPE_GEOGRAPHIC) => self.geographic_type,
            Some(other) => {
                return Err(RasterError::UnsupportedCrs(format!("model type {other}")));
            }
            None => self.projected_type.or(self.geographic_type),
        };
        match code {
            Some(USER_DEFINED) => Err(RasterError::UnsupportedCrs(
                "user-defined CRS".to_string(),
            )),
            Some(code) if code > 0 => Ok(code as u32),
            _ => Err(RasterError::UnsupportedCrs("no EPSG code in GeoKeys".to_string())),
        }
    }
}

// =============================================================================
// Reading from an IFD
// =============================================================================

/// Georeferencing of the base IFD.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    pub transform: GeoTransform,
    pub epsg: u32,
    pub nodata: Option<f64>,
}

/// Read transform, CRS and nodata from `ifd`.
pub fn read_geo_info<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
) -> Result<GeoInfo, RasterError> {
    let values = ValueReader::new(reader, header);
    let doubles = |tag: TiffTag| -> Result<Option<Vec<f64>>, TiffError> {
        ifd.get_entry_by_tag(tag)
            .map(|entry| values.read_f64_array(entry))
            .transpose()
    };

    let keys = match ifd.get_entry_by_tag(TiffTag::GeoKeyDirectory) {
        Some(entry) => GeoKeys::parse(&values.read_u16_array(entry)?),
        None => GeoKeys::default(),
    };

    let transform = match (
        doubles(TiffTag::ModelPixelScale)?,
        doubles(TiffTag::ModelTiepoint)?,
        doubles(TiffTag::ModelTransformation)?,
    ) {
        (Some(scale), Some(tiepoint), _) => GeoTransform::from_scale_tiepoint(&scale, &tiepoint)
            .ok_or(RasterError::MissingGeoreference)?,
        (_, _, Some(matrix)) => GeoTransform::from_matrix(&matrix)?,
        _ => return Err(RasterError::MissingGeoreference),
    };
    let transform = if keys.is_pixel_is_point() {
        transform.shifted_half_pixel()
    } else {
        transform
    };

    let nodata = match ifd.get_entry_by_tag(TiffTag::GdalNodata) {
        Some(entry) => parse_gdal_nodata(&values.read_string(entry)?),
        None => None,
    };

    Ok(GeoInfo {
        transform,
        epsg: keys.epsg()?,
        nodata,
    })
}

/// Parse the GDAL_NODATA ASCII value ("-9999", "nan", "inf").
pub fn parse_gdal_nodata(value: &str) -> Option<f64> {
    let value = value.trim_end_matches('\0').trim();
    match value.to_ascii_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => value.parse().ok(),
    }
}
