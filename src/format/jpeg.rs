//! JPEG-compressed TIFF tiles.
//!
//! GDAL writes JPEG COG tiles as abbreviated streams: each tile lacks the
//! quantization (DQT) and Huffman (DHT) tables, which live once in the IFD's
//! `JPEGTables` tag. Before decoding, the tables are spliced into the tile:
//!
//! ```text
//! SOI + tables_content + tile_content + EOI
//! ```

use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use image::{DynamicImage, ImageFormat, ImageReader};

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

// =============================================================================
// Stream analysis
// =============================================================================

/// Whether `data` starts with SOI and reaches SOS without any DQT or DHT
/// segment, i.e. it needs external tables to decode.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Skip the segment: marker + 2-byte length + payload
        if pos + 3 < data.len() && marker[1] != 0x00 && marker[1] != 0xD8 && marker[1] != 0xD9 {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

/// Splice `tables` (SOI ... EOI) in front of an abbreviated tile stream.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables_end = if tables.len() >= 2 && tables[tables.len() - 2..] == EOI {
        tables.len() - 2
    } else {
        tables.len()
    };
    let tile_start = if tile_data.len() >= 2 && tile_data[0..2] == SOI {
        2
    } else {
        0
    };

    let mut result = BytesMut::with_capacity(tables_end + tile_data.len() - tile_start);
    result.extend_from_slice(&tables[..tables_end]);
    result.extend_from_slice(&tile_data[tile_start..]);
    result.freeze()
}

/// Complete a tile stream with the level's tables when it needs them.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    match tables {
        Some(tables) if is_abbreviated_stream(tile_data) => merge_jpeg_tables(tables, tile_data),
        _ => Bytes::copy_from_slice(tile_data),
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a JPEG tile into pixel-interleaved 8-bit samples.
///
/// Three-component streams come back as RGB (YCbCr is converted by the
/// decoder), single-component streams as gray. Returns the samples and the
/// number of channels.
pub fn decode_jpeg_tile(tables: Option<&[u8]>, tile_data: &[u8]) -> Result<(Vec<u8>, usize), String> {
    let stream = prepare_tile_jpeg(tables, tile_data);
    let image = ImageReader::with_format(Cursor::new(stream.as_ref()), ImageFormat::Jpeg)
        .decode()
        .map_err(|e| format!("JPEG decode error: {e}"))?;

    Ok(match image {
        DynamicImage::ImageLuma8(gray) => (gray.into_raw(), 1),
        DynamicImage::ImageRgb8(rgb) => (rgb.into_raw(), 3),
        other => (other.to_rgb8().into_raw(), 3),
    })
}
