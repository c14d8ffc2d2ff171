//! TIFF tag value reading.
//!
//! Values are stored either inline in the IFD entry or at an offset in the
//! file. Arrays (TileOffsets, TileByteCounts, GeoTIFF doubles) are fetched with
//! a single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values through a [`RangeReader`], respecting the file's byte order.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw bytes of an entry's value, inline or fetched from the file.
    pub fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            Ok(self.reader.read_exact_at(offset, size as usize)?)
        }
    }

    /// Read a single Short or Long value.
    pub fn read_u32(&self, entry: &IfdEntry) -> Result<u32, TiffError> {
        if let Some(value) = entry.inline_u32(self.header.byte_order) {
            return Ok(value);
        }
        let values = self.read_u64_array(entry)?;
        match values.as_slice() {
            [v] => u32::try_from(*v).map_err(|_| invalid(entry, format!("{v} overflows u32"))),
            _ => Err(invalid(entry, format!("expected count 1, got {}", entry.count))),
        }
    }

    /// Read a single Short, Long or Long8 value.
    pub fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        let values = self.read_u64_array(entry)?;
        match values.as_slice() {
            [v] => Ok(*v),
            _ => Err(invalid(entry, format!("expected count 1, got {}", entry.count))),
        }
    }

    /// Read an unsigned integer array (TileOffsets, TileByteCounts, ...).
    pub fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if entry.count == 0 {
            return Ok(Vec::new());
        }
        match field_type {
            FieldType::Byte | FieldType::Short | FieldType::Long | FieldType::Long8 | FieldType::Ifd8 => {
                let bytes = self.read_bytes(entry)?;
                Ok(parse_u64_array(&bytes, entry.count as usize, field_type, self.byte_order()))
            }
            other => Err(invalid(entry, format!("expected an unsigned integer type, got {other:?}"))),
        }
    }

    /// Read a Short array (BitsPerSample, SampleFormat, GeoKeyDirectory, ...).
    pub fn read_u16_array(&self, entry: &IfdEntry) -> Result<Vec<u16>, TiffError> {
        self.read_u64_array(entry)?
            .into_iter()
            .map(|v| u16::try_from(v).map_err(|_| invalid(entry, format!("{v} overflows u16"))))
            .collect()
    }

    /// Read a floating point array. Integer and rational types are widened.
    pub fn read_f64_array(&self, entry: &IfdEntry) -> Result<Vec<f64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if entry.count == 0 {
            return Ok(Vec::new());
        }
        let bytes = self.read_bytes(entry)?;
        let order = self.byte_order();
        let count = entry.count as usize;

        let values = match field_type {
            FieldType::Double => (0..count)
                .map(|i| f64::from_bits(order.read_u64(&bytes[i * 8..])))
                .collect(),
            FieldType::Float => (0..count)
                .map(|i| f32::from_bits(order.read_u32(&bytes[i * 4..])) as f64)
                .collect(),
            FieldType::Rational => (0..count)
                .map(|i| {
                    let num = order.read_u32(&bytes[i * 8..]) as f64;
                    let den = order.read_u32(&bytes[i * 8 + 4..]) as f64;
                    num / den
                })
                .collect(),
            FieldType::SShort => (0..count)
                .map(|i| order.read_u16(&bytes[i * 2..]) as i16 as f64)
                .collect(),
            FieldType::SLong => (0..count)
                .map(|i| order.read_u32(&bytes[i * 4..]) as i32 as f64)
                .collect(),
            FieldType::Byte | FieldType::Short | FieldType::Long | FieldType::Long8 => {
                parse_u64_array(&bytes, count, field_type, order)
                    .into_iter()
                    .map(|v| v as f64)
                    .collect()
            }
            other => return Err(invalid(entry, format!("expected a numeric type, got {other:?}"))),
        };
        Ok(values)
    }

    /// Read an ASCII value, stripping the NUL terminator.
    pub fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type != FieldType::Ascii {
            return Err(invalid(entry, format!("expected Ascii, got {field_type:?}")));
        }

        let bytes = self.read_bytes(entry)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

fn invalid(entry: &IfdEntry, message: String) -> TiffError {
    TiffError::InvalidTagValue {
        tag: entry.tag.map(|t| t.name()).unwrap_or("unknown"),
        message,
    }
}

// =============================================================================
// Parsing from bytes
// =============================================================================

/// Parse an unsigned integer array from raw bytes. Truncated input yields
/// fewer values.
pub fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let size = field_type.size_in_bytes();
    (0..count)
        .map(|i| i * size)
        .take_while(|offset| offset + size <= bytes.len())
        .filter_map(|offset| {
            let b = &bytes[offset..];
            match field_type {
                FieldType::Byte => Some(b[0] as u64),
                FieldType::Short => Some(byte_order.read_u16(b) as u64),
                FieldType::Long => Some(byte_order.read_u32(b) as u64),
                FieldType::Long8 | FieldType::Ifd8 => Some(byte_order.read_u64(b)),
                _ => None,
            }
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
