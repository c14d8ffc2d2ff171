//! Color operation chains.
//!
//! An expression such as `"gamma rgb 1.8, sigmoidal rgb 10 0.15, saturation 1.2"`
//! is split into whitespace tokens (commas are ignored) and a new operation
//! starts at every operation name. `gamma` and `sigmoidal` take a band
//! selector (`r`, `g`, `b` or `1`..`3`, e.g. `rg` or `13`); `saturation`
//! always works on the three RGB bands.

use std::str::FromStr;

use crate::error::ColorError;
use crate::raster::BandArray;

/// Bands a selector can name
const MAX_SELECTABLE_BAND: usize = 3;

/// Tolerance on argument domains, matching f64 machine epsilon
const EPSILON: f64 = f64::EPSILON;

// =============================================================================
// Operations
// =============================================================================

/// One parsed color operation. Band numbers are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorOp {
    /// `x^(1/g)` on the selected bands
    Gamma { bands: Vec<usize>, gamma: f64 },

    /// Sigmoidal contrast; a negative contrast applies the inverse curve
    Sigmoidal {
        bands: Vec<usize>,
        contrast: f64,
        bias: f64,
    },

    /// Scale chroma in LCh space
    Saturation { proportion: f64 },
}

impl ColorOp {
    fn name(&self) -> &'static str {
        match self {
            ColorOp::Gamma { .. } => "gamma",
            ColorOp::Sigmoidal { .. } => "sigmoidal",
            ColorOp::Saturation { .. } => "saturation",
        }
    }

    /// Reject operations that reference bands the array does not have.
    fn check_bands(&self, available: usize) -> Result<(), ColorError> {
        let out_of_range = |band: usize| ColorError::BandOutOfRange {
            op: self.name().to_string(),
            band,
            available,
        };
        match self {
            ColorOp::Gamma { bands, .. } | ColorOp::Sigmoidal { bands, .. } => {
                match bands.iter().find(|&&b| b > available) {
                    Some(&band) => Err(out_of_range(band)),
                    None => Ok(()),
                }
            }
            ColorOp::Saturation { .. } if available < 3 => Err(out_of_range(3)),
            ColorOp::Saturation { .. } => Ok(()),
        }
    }

    /// Apply to an array normalised to [0, 1].
    fn apply(&self, data: &mut BandArray<f32>) {
        match self {
            ColorOp::Gamma { bands, gamma } => {
                let exponent = (1.0 / gamma) as f32;
                for &band in bands {
                    for v in data.band_mut(band - 1) {
                        *v = v.powf(exponent);
                    }
                }
            }
            ColorOp::Sigmoidal {
                bands,
                contrast,
                bias,
            } => {
                let curve = Sigmoid::new(*contrast, *bias);
                for &band in bands {
                    for v in data.band_mut(band - 1) {
                        *v = curve.apply(*v as f64) as f32;
                    }
                }
            }
            ColorOp::Saturation { proportion } => saturate(data, *proportion),
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// An ordered list of color operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorChain {
    ops: Vec<ColorOp>,
}

impl ColorChain {
    pub fn ops(&self) -> &[ColorOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every operation in order.
    ///
    /// Samples are normalised once (`v / 255`) and quantised once at the end
    /// (clip to [0, 1], scale to 255, round).
    pub fn apply(&self, data: &BandArray<u8>) -> Result<BandArray<u8>, ColorError> {
        for op in &self.ops {
            op.check_bands(data.bands)?;
        }
        if self.ops.is_empty() {
            return Ok(data.clone());
        }

        let mut work = data.clone().map(|v| v as f32 / 255.0);
        for op in &self.ops {
            op.apply(&mut work);
        }
        Ok(work.map(quantize))
    }
}

impl FromStr for ColorChain {
    type Err = ColorError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let expr = expr.replace(',', "");
        let mut groups: Vec<Vec<String>> = Vec::new();
        for token in expr.split_whitespace() {
            let token = token.to_ascii_lowercase();
            let starts_op = matches!(token.as_str(), "gamma" | "sigmoidal" | "saturation");
            match groups.last_mut() {
                Some(group) if !starts_op => group.push(token),
                _ => groups.push(vec![token]),
            }
        }

        let ops = groups
            .iter()
            .map(|group| parse_op(group))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ColorChain { ops })
    }
}

fn parse_op(tokens: &[String]) -> Result<ColorOp, ColorError> {
    let (name, rest) = match tokens.split_first() {
        Some((name, rest)) => (name.as_str(), rest),
        None => return Err(ColorError::UnknownOperation(String::new())),
    };

    match name {
        "gamma" => {
            let (bands, args) = split_bands(name, rest)?;
            let [gamma] = numbers::<1>(name, args)?;
            if gamma.is_nan() || gamma <= 0.0 {
                return Err(out_of_domain(name, "gamma must be greater than 0"));
            }
            Ok(ColorOp::Gamma { bands, gamma })
        }
        "sigmoidal" => {
            let (bands, args) = split_bands(name, rest)?;
            let [contrast, bias] = numbers::<2>(name, args)?;
            if !(-EPSILON..=1.0 + EPSILON).contains(&bias) {
                return Err(out_of_domain(name, "bias must be between 0 and 1"));
            }
            Ok(ColorOp::Sigmoidal {
                bands,
                contrast,
                bias,
            })
        }
        "saturation" => {
            let [proportion] = numbers::<1>(name, rest)?;
            if proportion.is_nan() || proportion < 0.0 {
                return Err(out_of_domain(name, "proportion must not be negative"));
            }
            Ok(ColorOp::Saturation { proportion })
        }
        other => Err(ColorError::UnknownOperation(other.to_string())),
    }
}

/// Split the band selector off the arguments.
fn split_bands<'a>(op: &str, tokens: &'a [String]) -> Result<(Vec<usize>, &'a [String]), ColorError> {
    let Some((selector, args)) = tokens.split_first() else {
        return Err(ColorError::ArgumentCount {
            op: op.to_string(),
            expected: if op == "gamma" { 2 } else { 3 },
            actual: 0,
        });
    };

    let mut bands = Vec::new();
    for c in selector.chars() {
        let band = match c {
            'r' => 1,
            'g' => 2,
            'b' => 3,
            d => d.to_digit(10).map_or(0, |d| d as usize),
        };
        if !(1..=MAX_SELECTABLE_BAND).contains(&band) {
            return Err(ColorError::InvalidBand {
                op: op.to_string(),
                band: selector.clone(),
            });
        }
        if !bands.contains(&band) {
            bands.push(band);
        }
    }
    Ok((bands, args))
}

fn numbers<const N: usize>(op: &str, tokens: &[String]) -> Result<[f64; N], ColorError> {
    if tokens.len() != N {
        return Err(ColorError::ArgumentCount {
            op: op.to_string(),
            expected: N,
            actual: tokens.len(),
        });
    }
    let mut out = [0.0; N];
    for (slot, token) in out.iter_mut().zip(tokens) {
        *slot = token.parse().map_err(|_| ColorError::InvalidArgument {
            op: op.to_string(),
            value: token.clone(),
        })?;
    }
    Ok(out)
}

fn out_of_domain(op: &str, message: &str) -> ColorError {
    ColorError::OutOfDomain {
        op: op.to_string(),
        message: message.to_string(),
    }
}

#[inline]
fn quantize(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

// =============================================================================
// Sigmoidal contrast
// =============================================================================

struct Sigmoid {
    contrast: f64,
    bias: f64,
}

impl Sigmoid {
    fn new(contrast: f64, bias: f64) -> Self {
        // A zero bias would make the curve degenerate
        let bias = if bias == 0.0 { EPSILON } else { bias };
        Sigmoid { contrast, bias }
    }

    fn apply(&self, x: f64) -> f64 {
        let (alpha, beta) = (self.bias, self.contrast);
        if beta == 0.0 {
            return x;
        }
        let logistic = |t: f64| 1.0 / (1.0 + t.exp());
        if beta > 0.0 {
            let numerator = logistic(beta * (alpha - x)) - logistic(beta * alpha);
            let denominator = logistic(beta * (alpha - 1.0)) - logistic(beta * alpha);
            numerator / denominator
        } else {
            let inner = x / (1.0 + (beta * alpha - beta).exp()) - x / (1.0 + (beta * alpha).exp())
                + 1.0 / (1.0 + (beta * alpha).exp());
            (beta * alpha - (1.0 / inner - 1.0).ln()) / beta
        }
    }
}

// =============================================================================
// Saturation (sRGB <-> LCh)
// =============================================================================

/// D65 reference white
const WHITE: [f64; 3] = [0.95047, 1.0, 1.08883];

const LAB_EPSILON: f64 = 0.008856;
const LAB_KAPPA: f64 = 7.787;

fn saturate(data: &mut BandArray<f32>, proportion: f64) {
    let n = data.pixels();
    for i in 0..n {
        let rgb = [
            data.data[i] as f64,
            data.data[n + i] as f64,
            data.data[2 * n + i] as f64,
        ];
        let [l, c, h] = rgb_to_lch(rgb);
        let [r, g, b] = lch_to_rgb([l, c * proportion, h]);
        data.data[i] = r as f32;
        data.data[n + i] = g as f32;
        data.data[2 * n + i] = b as f32;
    }
}

fn srgb_to_linear(v: f64) -> f64 {
    if v > 0.04045 {
        ((v + 0.055) / 1.055).powf(2.4)
    } else {
        v / 12.92
    }
}

fn linear_to_srgb(v: f64) -> f64 {
    if v > 0.003_130_8 {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    } else {
        12.92 * v
    }
}

fn lab_f(t: f64) -> f64 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        LAB_KAPPA * t + 16.0 / 116.0
    }
}

fn lab_f_inv(f: f64) -> f64 {
    let cube = f * f * f;
    if cube > LAB_EPSILON {
        cube
    } else {
        (f - 16.0 / 116.0) / LAB_KAPPA
    }
}

pub(crate) fn rgb_to_lch(rgb: [f64; 3]) -> [f64; 3] {
    let [r, g, b] = rgb.map(srgb_to_linear);
    let x = r * 0.4124 + g * 0.3576 + b * 0.1805;
    let y = r * 0.2126 + g * 0.7152 + b * 0.0722;
    let z = r * 0.0193 + g * 0.1192 + b * 0.9505;

    let (fx, fy, fz) = (lab_f(x / WHITE[0]), lab_f(y / WHITE[1]), lab_f(z / WHITE[2]));
    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let bb = 200.0 * (fy - fz);
    [l, a.hypot(bb), bb.atan2(a)]
}

pub(crate) fn lch_to_rgb(lch: [f64; 3]) -> [f64; 3] {
    let [l, c, h] = lch;
    let (a, b) = (c * h.cos(), c * h.sin());

    let fy = (l + 16.0) / 116.0;
    let fx = a / 500.0 + fy;
    let fz = fy - b / 200.0;
    let (x, y, z) = (
        lab_f_inv(fx) * WHITE[0],
        lab_f_inv(fy) * WHITE[1],
        lab_f_inv(fz) * WHITE[2],
    );

    let r = x * 3.2406 + y * -1.5372 + z * -0.4986;
    let g = x * -0.9689 + y * 1.8758 + z * 0.0415;
    let bl = x * 0.0557 + y * -0.2040 + z * 1.0570;
    [r, g, bl].map(linear_to_srgb)
}
