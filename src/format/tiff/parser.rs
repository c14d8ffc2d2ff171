//! TIFF header and IFD parsing.
//!
//! This module handles the byte-level structure of TIFF and BigTIFF files:
//! the header, and the Image File Directories chained from it. Tag values
//! that do not fit inline are read later through [`super::ValueReader`].
//!
//! # TIFF Header Structure
//!
//! ## Classic TIFF (8 bytes)
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (42 = 0x002A)
//! Bytes 4-7: Offset to first IFD (4 bytes)
//! ```
//!
//! ## BigTIFF (16 bytes)
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (43 = 0x002B)
//! Bytes 4-5: Offset byte size (must be 8)
//! Bytes 6-7: Reserved (must be 0)
//! Bytes 8-15: Offset to first IFD (8 bytes)
//! ```

use crate::error::TiffError;
use crate::io::{read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le};

use super::tags::{FieldType, TiffTag};

// =============================================================================
// Constants
// =============================================================================

/// Magic bytes indicating little-endian byte order ("II" for Intel)
const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;

/// Magic bytes indicating big-endian byte order ("MM" for Motorola)
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;

/// Version number for classic TIFF
const VERSION_TIFF: u16 = 42;

/// Version number for BigTIFF
const VERSION_BIGTIFF: u16 = 43;

/// Size of classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of BigTIFF header in bytes
pub const BIGTIFF_HEADER_SIZE: usize = 16;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of a TIFF file.
///
/// TIFF files declare their byte order in the first two bytes of the header.
/// All multi-byte values in the file must be read respecting this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian ("II" = Intel)
    LittleEndian,
    /// Big-endian ("MM" = Motorola)
    BigEndian,
}

impl ByteOrder {
    /// Read a u16 from a byte slice using this byte order.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => read_u16_le(bytes),
            ByteOrder::BigEndian => read_u16_be(bytes),
        }
    }

    /// Read a u32 from a byte slice using this byte order.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => read_u32_le(bytes),
            ByteOrder::BigEndian => read_u32_be(bytes),
        }
    }

    /// Read a u64 from a byte slice using this byte order.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => read_u64_le(bytes),
            ByteOrder::BigEndian => read_u64_be(bytes),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
///
/// Contains the essential information needed to begin parsing IFDs:
/// - Byte order for reading all subsequent values
/// - Whether this is classic TIFF or BigTIFF (affects entry sizes and offset widths)
/// - Location of the first IFD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Whether this is a BigTIFF file (64-bit offsets)
    pub is_bigtiff: bool,

    /// Offset to the first IFD in the file
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse the 8-byte classic or 16-byte BigTIFF header.
    ///
    /// `file_size` bounds the first IFD offset.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        let (is_bigtiff, first_ifd_offset) = match version {
            VERSION_TIFF => (false, byte_order.read_u32(&bytes[4..8]) as u64),
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..16]))
            }
            _ => return Err(TiffError::InvalidVersion(version)),
        };

        if first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Size of an IFD entry in bytes.
    ///
    /// Classic TIFF: 12 bytes (2 tag + 2 type + 4 count + 4 value/offset)
    /// BigTIFF: 20 bytes (2 tag + 2 type + 8 count + 8 value/offset)
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Size of the entry count field at the start of an IFD.
    ///
    /// Classic TIFF: 2 bytes (u16)
    /// BigTIFF: 8 bytes (u64)
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of the next IFD offset field at the end of an IFD.
    ///
    /// Classic TIFF: 4 bytes (u32)
    /// BigTIFF: 8 bytes (u64)
    #[inline]
    pub const fn ifd_next_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Size of the value/offset field in an IFD entry.
    ///
    /// This determines the inline value threshold:
    /// Classic TIFF: 4 bytes
    /// BigTIFF: 8 bytes
    #[inline]
    pub const fn value_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }
}

// =============================================================================
// IfdEntry
// =============================================================================

/// A single 12-byte (classic) or 20-byte (BigTIFF) IFD entry.
///
/// The value/offset field is kept raw; whether it holds the value itself or a
/// file offset depends on the field type and count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    /// Numeric tag ID
    pub tag_id: u16,

    /// Known tag, if recognized
    pub tag: Option<TiffTag>,

    /// Raw field type (kept for error reporting when unknown)
    pub field_type_raw: u16,

    /// Decoded field type
    pub field_type: Option<FieldType>,

    /// Number of values
    pub count: u64,

    /// Raw value/offset bytes (4 used for classic TIFF, 8 for BigTIFF)
    pub value_offset_bytes: [u8; 8],

    /// Whether the value is stored inline in `value_offset_bytes`
    pub is_inline: bool,

    /// Whether the entry came from a BigTIFF (8-byte offsets)
    pub is_bigtiff: bool,
}

impl IfdEntry {
    /// Parse an entry from its raw bytes.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Self {
        let byte_order = header.byte_order;
        let tag_id = byte_order.read_u16(&bytes[0..2]);
        let field_type_raw = byte_order.read_u16(&bytes[2..4]);
        let field_type = FieldType::from_u16(field_type_raw);

        let (count, value_start) = if header.is_bigtiff {
            (byte_order.read_u64(&bytes[4..12]), 12)
        } else {
            (byte_order.read_u32(&bytes[4..8]) as u64, 8)
        };

        let value_size = header.value_offset_size();
        let mut value_offset_bytes = [0u8; 8];
        value_offset_bytes[..value_size].copy_from_slice(&bytes[value_start..value_start + value_size]);

        let is_inline = field_type
            .map(|ft| ft.fits_inline(count, header.is_bigtiff))
            .unwrap_or(false);

        IfdEntry {
            tag_id,
            tag: TiffTag::from_u16(tag_id),
            field_type_raw,
            field_type,
            count,
            value_offset_bytes,
            is_inline,
            is_bigtiff: header.is_bigtiff,
        }
    }

    /// Total size of the value in bytes, if the field type is known.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|ft| ft.size_in_bytes() as u64 * self.count)
    }

    /// Interpret the value/offset field as a file offset.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.is_bigtiff {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            byte_order.read_u32(&self.value_offset_bytes[..4]) as u64
        }
    }

    /// Read a single inline Short or Long value.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Byte => Some(self.value_offset_bytes[0] as u32),
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u32),
            FieldType::Long => Some(byte_order.read_u32(&self.value_offset_bytes)),
            _ => None,
        }
    }

    /// Read a single inline Short, Long or Long8 value.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        match self.field_type? {
            FieldType::Long8 | FieldType::Ifd8 if self.is_inline && self.count == 1 => {
                Some(byte_order.read_u64(&self.value_offset_bytes))
            }
            _ => self.inline_u32(byte_order).map(u64::from),
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed Image File Directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    /// File offset this IFD was read from
    pub offset: u64,

    /// Entries in file order (sorted by tag per the TIFF spec)
    pub entries: Vec<IfdEntry>,

    /// Offset of the next IFD in the chain (0 = end)
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Number of bytes occupied by an IFD with `entry_count` entries.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.ifd_next_offset_size()
    }

    /// Parse an IFD from its raw bytes (count, entries and next offset).
    pub fn parse(bytes: &[u8], header: &TiffHeader, offset: u64) -> Result<Self, TiffError> {
        let byte_order = header.byte_order;
        let count_size = header.ifd_count_size();

        if bytes.len() < count_size {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let entry_count = if header.is_bigtiff {
            byte_order.read_u64(&bytes[..8])
        } else {
            byte_order.read_u16(&bytes[..2]) as u64
        };

        let expected = Self::calculate_size(entry_count, header);
        if bytes.len() < expected {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let entry_size = header.ifd_entry_size();
        let entries = (0..entry_count as usize)
            .map(|i| {
                let start = count_size + i * entry_size;
                IfdEntry::parse(&bytes[start..start + entry_size], header)
            })
            .collect();

        let next_start = count_size + entry_count as usize * entry_size;
        let next_ifd_offset = if header.is_bigtiff {
            byte_order.read_u64(&bytes[next_start..next_start + 8])
        } else {
            byte_order.read_u32(&bytes[next_start..next_start + 4]) as u64
        };

        Ok(Ifd {
            offset,
            entries,
            next_ifd_offset,
        })
    }

    /// Find an entry by tag.
    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        let id = tag.as_u16();
        self.entries.iter().find(|e| e.tag_id == id)
    }

    /// Read a single inline integer value for `tag`.
    pub fn get_u32(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(tag)?.inline_u32(byte_order)
    }

    pub fn image_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::ImageWidth, byte_order)
    }

    pub fn image_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::ImageLength, byte_order)
    }

    pub fn tile_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::TileWidth, byte_order)
    }

    pub fn tile_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::TileLength, byte_order)
    }

    /// Compression tag value (1 = none when absent).
    pub fn compression(&self, byte_order: ByteOrder) -> u16 {
        self.get_u32(TiffTag::Compression, byte_order)
            .map(|v| v as u16)
            .unwrap_or(1)
    }

    /// SamplesPerPixel (1 when absent).
    pub fn samples_per_pixel(&self, byte_order: ByteOrder) -> u16 {
        self.get_u32(TiffTag::SamplesPerPixel, byte_order)
            .map(|v| v as u16)
            .unwrap_or(1)
    }

    /// NewSubfileType bit flags (0 when absent).
    pub fn subfile_type(&self, byte_order: ByteOrder) -> u32 {
        self.get_u32(TiffTag::NewSubfileType, byte_order)
            .unwrap_or(0)
    }

    /// PlanarConfiguration (1 = chunky when absent).
    pub fn planar_configuration(&self, byte_order: ByteOrder) -> u16 {
        self.get_u32(TiffTag::PlanarConfiguration, byte_order)
            .map(|v| v as u16)
            .unwrap_or(1)
    }

    /// Predictor (1 = none when absent).
    pub fn predictor(&self, byte_order: ByteOrder) -> u16 {
        self.get_u32(TiffTag::Predictor, byte_order)
            .map(|v| v as u16)
            .unwrap_or(1)
    }

    /// Whether the IFD describes a tiled image.
    pub fn is_tiled(&self) -> bool {
        self.get_entry_by_tag(TiffTag::TileWidth).is_some()
            && self.get_entry_by_tag(TiffTag::TileOffsets).is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================
