//! Tile image encoding.
//!
//! Encoding parameters come from a fixed per-format profile table:
//!
//! | Format | Profile                                   | Channels              |
//! |--------|-------------------------------------------|-----------------------|
//! | PNG    | default compression, adaptive filtering   | RGBA, or gray + alpha |
//! | JPEG   | quality 85                                | RGB or gray (no mask) |
//! | WebP   | lossless                                  | RGBA                  |

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::error::TileError;
use crate::raster::BandArray;

/// JPEG quality used for tiles.
pub const JPEG_QUALITY: u8 = 85;

// =============================================================================
// Format
// =============================================================================

/// Output image format of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileFormat {
    Png,
    Jpeg,
    WebP,
}

impl TileFormat {
    /// Parse a URL extension. `jpg` and `jpeg` both select JPEG.
    pub fn from_extension(ext: &str) -> Result<Self, TileError> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Ok(TileFormat::Png),
            "jpg" | "jpeg" => Ok(TileFormat::Jpeg),
            "webp" => Ok(TileFormat::WebP),
            _ => Err(TileError::InvalidFormat {
                format: ext.to_string(),
            }),
        }
    }

    /// Extension advertised in tile URLs.
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
            TileFormat::WebP => "webp",
        }
    }

    pub fn profile(self) -> TileProfile {
        match self {
            TileFormat::Png => TileProfile::Png {
                compression: CompressionType::Default,
                filter: FilterType::Adaptive,
            },
            TileFormat::Jpeg => TileProfile::Jpeg {
                quality: JPEG_QUALITY,
            },
            TileFormat::WebP => TileProfile::WebP,
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TileFormat::from_extension(s).map_err(|e| e.to_string())
    }
}

/// Encoder settings for one format.
#[derive(Debug, Clone, Copy)]
pub enum TileProfile {
    Png {
        compression: CompressionType,
        filter: FilterType,
    },
    Jpeg {
        quality: u8,
    },
    /// Lossless WebP
    WebP,
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a 1- or 3-band tile with its validity mask.
///
/// The mask becomes the alpha channel except for JPEG, which has none.
pub fn encode_tile(
    pixels: &BandArray<u8>,
    mask: &[u8],
    format: TileFormat,
) -> Result<Bytes, TileError> {
    let (width, height) = (pixels.width as u32, pixels.height as u32);
    let gray = match pixels.bands {
        1 => true,
        3 => false,
        n => {
            return Err(TileError::EncodeError {
                message: format!("cannot encode {n} band(s), expected 1 or 3"),
            })
        }
    };
    if mask.len() != pixels.pixels() {
        return Err(TileError::EncodeError {
            message: format!(
                "mask has {} entries for {} pixels",
                mask.len(),
                pixels.pixels()
            ),
        });
    }

    let mut out = Vec::new();
    let result = match format.profile() {
        TileProfile::Png {
            compression,
            filter,
        } => {
            let color = if gray {
                ExtendedColorType::La8
            } else {
                ExtendedColorType::Rgba8
            };
            PngEncoder::new_with_quality(&mut out, compression, filter).write_image(
                &interleave(pixels, Some(mask), false),
                width,
                height,
                color,
            )
        }
        TileProfile::Jpeg { quality } => {
            let encoder = JpegEncoder::new_with_quality(&mut out, quality);
            let color = if gray {
                ExtendedColorType::L8
            } else {
                ExtendedColorType::Rgb8
            };
            encoder.write_image(&interleave(pixels, None, false), width, height, color)
        }
        TileProfile::WebP => WebPEncoder::new_lossless(&mut out).write_image(
            &interleave(pixels, Some(mask), true),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
    };
    result.map_err(|e| TileError::EncodeError {
        message: e.to_string(),
    })?;

    Ok(Bytes::from(out))
}

/// Band-major to pixel-interleaved, optionally appending the mask as alpha.
/// `expand_gray` repeats a single band into RGB.
fn interleave(pixels: &BandArray<u8>, alpha: Option<&[u8]>, expand_gray: bool) -> Vec<u8> {
    let n = pixels.pixels();
    let color_bands = if expand_gray && pixels.bands == 1 {
        3
    } else {
        pixels.bands
    };
    let channels = color_bands + usize::from(alpha.is_some());
    let mut out = Vec::with_capacity(n * channels);
    for i in 0..n {
        for c in 0..color_bands {
            let band = c.min(pixels.bands - 1);
            out.push(pixels.data[band * n + i]);
        }
        if let Some(alpha) = alpha {
            out.push(alpha[i]);
        }
    }
    out
}
