//! Point transforms between EPSG coordinate reference systems.
//!
//! Web-mercator and WGS84 use closed-form math; every other EPSG code goes
//! through `proj4rs` with the proj strings from `crs-definitions`.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use super::mercator::{lnglat_to_mercator, mercator_to_lnglat};
use crate::error::RasterError;

pub const EPSG_WEB_MERCATOR: u32 = 3857;
pub const EPSG_WGS84: u32 = 4326;

/// Legacy codes for web-mercator
const WEB_MERCATOR_ALIASES: [u32; 2] = [900913, 3785];

fn canonical(epsg: u32) -> u32 {
    if WEB_MERCATOR_ALIASES.contains(&epsg) {
        EPSG_WEB_MERCATOR
    } else {
        epsg
    }
}

fn proj_string(epsg: u32) -> Option<&'static str> {
    u16::try_from(epsg)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

/// Whether a CRS is expressed in degrees
pub fn is_geographic(epsg: u32) -> bool {
    match canonical(epsg) {
        EPSG_WGS84 => true,
        EPSG_WEB_MERCATOR => false,
        code => proj_string(code).is_some_and(|s| s.contains("+proj=longlat")),
    }
}

/// Check that an EPSG code can be transformed.
pub fn ensure_supported(epsg: u32) -> Result<(), RasterError> {
    CrsTransform::new(epsg, EPSG_WGS84).map(|_| ())
}

enum Kind {
    Identity,
    MercatorToLngLat,
    LngLatToMercator,
    Proj {
        source: Box<Proj>,
        target: Box<Proj>,
        source_geographic: bool,
        target_geographic: bool,
    },
}

/// Transform from one EPSG CRS to another.
pub struct CrsTransform {
    kind: Kind,
}

impl CrsTransform {
    pub fn new(from: u32, to: u32) -> Result<Self, RasterError> {
        let (from, to) = (canonical(from), canonical(to));
        let kind = match (from, to) {
            _ if from == to => Kind::Identity,
            (EPSG_WEB_MERCATOR, EPSG_WGS84) => Kind::MercatorToLngLat,
            (EPSG_WGS84, EPSG_WEB_MERCATOR) => Kind::LngLatToMercator,
            _ => Kind::Proj {
                source: Box::new(load(from)?),
                target: Box::new(load(to)?),
                source_geographic: is_geographic(from),
                target_geographic: is_geographic(to),
            },
        };
        Ok(CrsTransform { kind })
    }

    /// Transform one point. Geographic coordinates are in degrees.
    pub fn apply(&self, x: f64, y: f64) -> Result<(f64, f64), RasterError> {
        match &self.kind {
            Kind::Identity => Ok((x, y)),
            Kind::MercatorToLngLat => Ok(mercator_to_lnglat(x, y)),
            Kind::LngLatToMercator => Ok(lnglat_to_mercator(x, y)),
            Kind::Proj {
                source,
                target,
                source_geographic,
                target_geographic,
            } => {
                // proj4rs works in radians for geographic CRSs
                let mut point = if *source_geographic {
                    (x.to_radians(), y.to_radians(), 0.0)
                } else {
                    (x, y, 0.0)
                };
                transform(source, target, &mut point)
                    .map_err(|e| RasterError::Projection(format!("{e:?}")))?;
                let (out_x, out_y) = if *target_geographic {
                    (point.0.to_degrees(), point.1.to_degrees())
                } else {
                    (point.0, point.1)
                };
                if out_x.is_finite() && out_y.is_finite() {
                    Ok((out_x, out_y))
                } else {
                    Err(RasterError::Projection(format!(
                        "({x}, {y}) has no finite image"
                    )))
                }
            }
        }
    }
}

fn load(epsg: u32) -> Result<Proj, RasterError> {
    let definition = proj_string(epsg)
        .ok_or_else(|| RasterError::UnsupportedCrs(format!("EPSG:{epsg} is unknown")))?;
    Proj::from_proj_string(definition)
        .map_err(|e| RasterError::UnsupportedCrs(format!("EPSG:{epsg}: {e:?}")))
}
