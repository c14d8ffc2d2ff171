//! Web-mercator tile grid math.

use std::f64::consts::PI;

/// WGS84 semi-major axis, the sphere radius of EPSG:3857
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half the width of the EPSG:3857 square world, in meters
pub const ORIGIN_SHIFT: f64 = PI * EARTH_RADIUS;

/// Tile edge used by the zoom/resolution relation
const ZOOM_TILE_SIZE: f64 = 256.0;

/// Guards against float error pushing an exact tile edge into the previous tile
const TILE_EPSILON: f64 = 1e-14;

/// Tile containing a longitude/latitude at zoom `z`.
///
/// Positions on or beyond the antimeridian or the poles clamp to the first or
/// last tile of the row/column.
pub fn lnglat_to_tile(lng: f64, lat: f64, z: u8) -> (u64, u64) {
    let x = lng / 360.0 + 0.5;
    let sinlat = lat.to_radians().sin();
    let y = 0.5 - 0.25 * ((1.0 + sinlat) / (1.0 - sinlat)).ln() / PI;

    let z2 = 2f64.powi(z as i32);
    let to_index = |v: f64| -> u64 {
        if v <= 0.0 {
            0
        } else if v >= 1.0 {
            z2 as u64 - 1
        } else {
            ((v + TILE_EPSILON) * z2).floor() as u64
        }
    };
    (to_index(x), to_index(y))
}

/// Tile extent in EPSG:3857 as (min_x, min_y, max_x, max_y).
pub fn tile_bounds(z: u8, x: u32, y: u32) -> [f64; 4] {
    let size = 2.0 * ORIGIN_SHIFT / 2f64.powi(z as i32);
    let min_x = -ORIGIN_SHIFT + x as f64 * size;
    let max_y = ORIGIN_SHIFT - y as f64 * size;
    [min_x, max_y - size, min_x + size, max_y]
}

/// Ground resolution of a 256-pixel tile at zoom `z` and latitude `lat`.
pub fn meters_per_pixel(z: u8, lat: f64) -> f64 {
    lat.to_radians().cos() * 2.0 * PI * EARTH_RADIUS / (ZOOM_TILE_SIZE * 2f64.powi(z as i32))
}

/// EPSG:4326 degrees to EPSG:3857 meters.
pub fn lnglat_to_mercator(lng: f64, lat: f64) -> (f64, f64) {
    let x = EARTH_RADIUS * lng.to_radians();
    let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// EPSG:3857 meters to EPSG:4326 degrees.
pub fn mercator_to_lnglat(x: f64, y: f64) -> (f64, f64) {
    let lng = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lng, lat)
}
