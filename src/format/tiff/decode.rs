//! Tile decompression and sample conversion.
//!
//! A compressed TIFF tile goes through three steps: decompression (none, LZW,
//! Deflate or JPEG), predictor reversal, and conversion of the pixel-interleaved
//! samples to `f32` according to BitsPerSample and SampleFormat.

use std::io::Read;

use crate::error::TiffError;
use crate::format::jpeg::decode_jpeg_tile;

use super::parser::ByteOrder;
use super::tags::{Compression, Predictor, SampleFormat};

/// How the samples of one level are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    pub compression: Compression,
    pub predictor: Predictor,
    pub sample_format: SampleFormat,
    pub bits_per_sample: u16,
    pub samples_per_pixel: usize,
}

impl SampleLayout {
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Check that samples of this layout can be converted.
    pub fn validate(&self) -> Result<(), TiffError> {
        let supported = matches!(
            (self.sample_format, self.bits_per_sample),
            (SampleFormat::Uint | SampleFormat::Int, 8 | 16 | 32)
                | (SampleFormat::Float, 32 | 64)
        );
        if !supported {
            return Err(TiffError::UnsupportedLayout(format!(
                "{}-bit {:?} samples",
                self.bits_per_sample, self.sample_format
            )));
        }
        if !self.compression.is_supported() {
            return Err(TiffError::UnsupportedCompression(
                self.compression.name().to_string(),
            ));
        }
        if self.compression == Compression::Jpeg && self.bits_per_sample != 8 {
            return Err(TiffError::UnsupportedLayout(
                "JPEG compression requires 8-bit samples".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decode one tile into `width * height * samples_per_pixel` interleaved samples.
///
/// `index` is the tile index within its level, used in error messages.
pub fn decode_tile(
    data: &[u8],
    layout: &SampleLayout,
    width: usize,
    height: usize,
    jpeg_tables: Option<&[u8]>,
    byte_order: ByteOrder,
    index: usize,
) -> Result<Vec<f32>, TiffError> {
    let spp = layout.samples_per_pixel;
    let sample_count = width * height * spp;
    let err = |message: String| TiffError::Decode { index, message };

    if layout.compression == Compression::Jpeg {
        let (samples, channels) = decode_jpeg_tile(jpeg_tables, data).map_err(err)?;
        if channels != spp || samples.len() < sample_count {
            return Err(err(format!(
                "JPEG tile has {channels} channel(s) and {} samples, expected {spp} and {sample_count}",
                samples.len()
            )));
        }
        return Ok(samples[..sample_count].iter().map(|&v| v as f32).collect());
    }

    let mut raw = match layout.compression {
        Compression::None => data.to_vec(),
        Compression::Lzw => weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .decode(data)
            .map_err(|e| err(format!("LZW: {e}")))?,
        Compression::Deflate | Compression::AdobeDeflate => {
            let mut out = Vec::with_capacity(sample_count * layout.bytes_per_sample());
            flate2::read::ZlibDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| err(format!("Deflate: {e}")))?;
            out
        }
        other => return Err(TiffError::UnsupportedCompression(other.name().to_string())),
    };

    let expected = sample_count * layout.bytes_per_sample();
    if raw.len() < expected {
        return Err(err(format!(
            "decompressed {} bytes, expected {expected}",
            raw.len()
        )));
    }
    raw.truncate(expected);

    let row_len = width * spp * layout.bytes_per_sample();
    match layout.predictor {
        Predictor::None => {}
        Predictor::Horizontal => {
            for row in raw.chunks_exact_mut(row_len) {
                undo_horizontal(row, spp, layout.bytes_per_sample(), byte_order);
            }
        }
        Predictor::FloatingPoint => {
            for row in raw.chunks_exact_mut(row_len) {
                undo_floating_point(row, spp, layout.bytes_per_sample(), byte_order);
            }
        }
    }

    Ok(to_f32(&raw, layout, byte_order))
}

/// Reverse horizontal differencing in one row. Accumulation happens on whole
/// samples, stride one pixel.
fn undo_horizontal(row: &mut [u8], spp: usize, bytes: usize, order: ByteOrder) {
    let stride = spp * bytes;
    match bytes {
        1 => {
            for i in stride..row.len() {
                row[i] = row[i].wrapping_add(row[i - stride]);
            }
        }
        2 => {
            for i in (stride..row.len()).step_by(2) {
                let prev = order.read_u16(&row[i - stride..]);
                let curr = order.read_u16(&row[i..]);
                write_u16(&mut row[i..i + 2], curr.wrapping_add(prev), order);
            }
        }
        4 => {
            for i in (stride..row.len()).step_by(4) {
                let prev = order.read_u32(&row[i - stride..]);
                let curr = order.read_u32(&row[i..]);
                write_u32(&mut row[i..i + 4], curr.wrapping_add(prev), order);
            }
        }
        _ => {}
    }
}

/// Reverse the floating point predictor in one row: byte differencing over the
/// whole row, then the byte planes (most significant first) are re-interleaved.
fn undo_floating_point(row: &mut [u8], spp: usize, bytes: usize, order: ByteOrder) {
    for i in spp..row.len() {
        row[i] = row[i].wrapping_add(row[i - spp]);
    }

    let samples = row.len() / bytes;
    let planes = row.to_vec();
    for s in 0..samples {
        for b in 0..bytes {
            // Planes are big-endian; store back in file order.
            let dst = match order {
                ByteOrder::BigEndian => b,
                ByteOrder::LittleEndian => bytes - 1 - b,
            };
            row[s * bytes + dst] = planes[b * samples + s];
        }
    }
}

fn write_u16(dst: &mut [u8], value: u16, order: ByteOrder) {
    dst.copy_from_slice(&match order {
        ByteOrder::LittleEndian => value.to_le_bytes(),
        ByteOrder::BigEndian => value.to_be_bytes(),
    });
}

fn write_u32(dst: &mut [u8], value: u32, order: ByteOrder) {
    dst.copy_from_slice(&match order {
        ByteOrder::LittleEndian => value.to_le_bytes(),
        ByteOrder::BigEndian => value.to_be_bytes(),
    });
}

fn to_f32(raw: &[u8], layout: &SampleLayout, order: ByteOrder) -> Vec<f32> {
    let bytes = layout.bytes_per_sample();
    let chunks = raw.chunks_exact(bytes);
    match (layout.sample_format, layout.bits_per_sample) {
        (SampleFormat::Uint, 8) => raw.iter().map(|&v| v as f32).collect(),
        (SampleFormat::Int, 8) => raw.iter().map(|&v| v as i8 as f32).collect(),
        (SampleFormat::Uint, 16) => chunks.map(|c| order.read_u16(c) as f32).collect(),
        (SampleFormat::Int, 16) => chunks.map(|c| order.read_u16(c) as i16 as f32).collect(),
        (SampleFormat::Uint, 32) => chunks.map(|c| order.read_u32(c) as f32).collect(),
        (SampleFormat::Int, 32) => chunks.map(|c| order.read_u32(c) as i32 as f32).collect(),
        (SampleFormat::Float, 32) => chunks.map(|c| f32::from_bits(order.read_u32(c))).collect(),
        (SampleFormat::Float, 64) => chunks
            .map(|c| f64::from_bits(order.read_u64(c)) as f32)
            .collect(),
        // Rejected by SampleLayout::validate when the raster is opened
        _ => vec![0.0; raw.len() / bytes.max(1)],
    }
}
