//! Linear rescaling of raw samples to 8 bits.

use crate::error::RasterError;
use crate::raster::BandArray;

/// Input ranges mapped to [0, 255]: one pair for every band, or one pair
/// per band.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSpec {
    pairs: Vec<(f64, f64)>,
}

impl ScaleSpec {
    /// Validate `pairs` against the number of bands that will be rescaled.
    pub fn new(pairs: Vec<(f64, f64)>, band_count: usize) -> Result<Self, RasterError> {
        if pairs.is_empty() {
            return Err(RasterError::InvalidScale("no scale given".to_string()));
        }
        if pairs.len() != 1 && pairs.len() != band_count {
            return Err(RasterError::InvalidScale(format!(
                "{} scale pairs for {band_count} band(s); give one pair or one per band",
                pairs.len()
            )));
        }
        if let Some((min, max)) = pairs.iter().find(|(min, max)| !(min < max)) {
            return Err(RasterError::InvalidScale(format!(
                "minimum {min} is not below maximum {max}"
            )));
        }
        Ok(ScaleSpec { pairs })
    }

    pub fn pairs(&self) -> &[(f64, f64)] {
        &self.pairs
    }

    fn pair(&self, band: usize) -> (f64, f64) {
        if self.pairs.len() == 1 {
            self.pairs[0]
        } else {
            self.pairs[band]
        }
    }
}

/// Map each band from its `[min, max]` to `[0, 255]`, clipping out-of-range
/// values. Positions where `mask` is 0 become 0.
pub fn rescale(data: &BandArray<f32>, mask: &[u8], scale: &ScaleSpec) -> BandArray<u8> {
    let mut out = BandArray::new(data.bands, data.width, data.height);
    for band in 0..data.bands {
        let (min, max) = scale.pair(band);
        let range = max - min;
        for ((dst, &src), &valid) in out.band_mut(band).iter_mut().zip(data.band(band)).zip(mask) {
            if valid == 0 || src.is_nan() {
                continue;
            }
            let v = (src as f64 - min) / range * 255.0;
            *dst = v.clamp(0.0, 255.0).round() as u8;
        }
    }
    out
}
