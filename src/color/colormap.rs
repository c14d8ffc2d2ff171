//! Named colormaps for single-band rasters.

use crate::raster::BandArray;

/// Control points (level, RGB); the lookup table interpolates linearly
/// between them.
type Stops = &'static [(u8, [u8; 3])];

const GRAY: Stops = &[(0, [0, 0, 0]), (255, [255, 255, 255])];

/// Vegetation index palette: greys for low values, then blue, green, yellow
/// and red
const CFASTIE: Stops = &[
    (0, [255, 255, 255]),
    (50, [60, 60, 60]),
    (90, [30, 60, 200]),
    (128, [40, 170, 70]),
    (170, [250, 240, 30]),
    (215, [240, 40, 20]),
    (255, [60, 0, 0]),
];

/// Elevation palette: dark forest green through ochre and brown to snow
const SCHWARZWALD: Stops = &[
    (0, [0, 90, 50]),
    (64, [60, 150, 60]),
    (128, [230, 220, 120]),
    (192, [150, 100, 50]),
    (255, [255, 255, 255]),
];

pub const COLORMAP_NAMES: [&str; 3] = ["cfastie", "schwarzwald", "gray"];

/// A 256-entry RGB lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Colormap {
    name: &'static str,
    table: [[u8; 3]; 256],
}

impl Colormap {
    /// Look up a colormap by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let (name, stops) = match name.to_ascii_lowercase().as_str() {
            "cfastie" => ("cfastie", CFASTIE),
            "schwarzwald" => ("schwarzwald", SCHWARZWALD),
            "gray" | "grey" => ("gray", GRAY),
            _ => return None,
        };
        Some(Colormap {
            name,
            table: build_table(stops),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn color(&self, level: u8) -> [u8; 3] {
        self.table[level as usize]
    }

    /// Map the first band of `data` to three RGB bands.
    pub fn apply(&self, data: &BandArray<u8>) -> BandArray<u8> {
        let mut out = BandArray::new(3, data.width, data.height);
        let n = data.pixels();
        for (i, &level) in data.band(0).iter().enumerate() {
            let [r, g, b] = self.color(level);
            out.data[i] = r;
            out.data[n + i] = g;
            out.data[2 * n + i] = b;
        }
        out
    }
}

fn build_table(stops: Stops) -> [[u8; 3]; 256] {
    let mut table = [[0u8; 3]; 256];
    for pair in stops.windows(2) {
        let (start, from) = pair[0];
        let (end, to) = pair[1];
        let span = (end - start) as f32;
        for level in start..=end {
            let t = (level - start) as f32 / span;
            let mut color = [0u8; 3];
            for c in 0..3 {
                let v = from[c] as f32 + (to[c] as f32 - from[c] as f32) * t;
                color[c] = v.round() as u8;
            }
            table[level as usize] = color;
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        for name in COLORMAP_NAMES {
            assert_eq!(Colormap::from_name(name).map(|c| c.name()), Some(name));
        }
        assert!(Colormap::from_name("GREY").is_some());
        assert!(Colormap::from_name("viridis").is_none());
    }

    #[test]
    fn test_tables_hit_control_points() {
        let gray = Colormap::from_name("gray").unwrap();
        assert_eq!(gray.color(0), [0, 0, 0]);
        assert_eq!(gray.color(128), [128, 128, 128]);
        assert_eq!(gray.color(255), [255, 255, 255]);

        let cfastie = Colormap::from_name("cfastie").unwrap();
        assert_eq!(cfastie.color(128), [40, 170, 70]);
        assert_eq!(cfastie.color(255), [60, 0, 0]);
    }

    #[test]
    fn test_apply() {
        let gray = Colormap::from_name("gray").unwrap();
        let data = BandArray::from_vec(1, 2, 1, vec![0u8, 200]).unwrap();
        let rgb = gray.apply(&data);
        assert_eq!(rgb.bands, 3);
        assert_eq!(rgb.data, vec![0, 200, 0, 200, 0, 200]);
    }
}
