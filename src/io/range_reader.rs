use bytes::Bytes;

use crate::error::IoError;

/// Positional reads from a raster file.
///
/// The TIFF parser and the tile decoder only ever need "give me `len` bytes at
/// `offset`", so both the file-backed and the in-memory dataset implement this.
/// Reads are blocking; callers run them on the worker pool.
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Get the total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Identifier for logging (file path or a synthetic name).
    fn identifier(&self) -> &str;
}

/// Check that `offset..offset+len` lies within a resource of `size` bytes.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        }),
    }
}

// =============================================================================
// Endian Helpers
// =============================================================================
//
// Callers slice exactly the field width out of an IFD buffer they have
// already length-checked; a short slice is a bug and panics.

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[inline]
pub fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes(array(bytes))
}

#[inline]
pub fn read_u16_be(bytes: &[u8]) -> u16 {
    u16::from_be_bytes(array(bytes))
}

#[inline]
pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(array(bytes))
}

#[inline]
pub fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes(array(bytes))
}

#[inline]
pub fn read_u64_le(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(array(bytes))
}

#[inline]
pub fn read_u64_be(bytes: &[u8]) -> u64 {
    u64::from_be_bytes(array(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range() {
        assert!(check_range(0, 10, 10).is_ok());
        assert!(check_range(5, 5, 10).is_ok());
        assert!(matches!(
            check_range(5, 6, 10),
            Err(IoError::RangeOutOfBounds {
                offset: 5,
                requested: 6,
                size: 10
            })
        ));
        assert!(check_range(u64::MAX, 2, 10).is_err());
    }

    #[test]
    fn test_endian_helpers() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0xFF];

        assert_eq!(read_u16_le(&bytes), 0x0201);
        assert_eq!(read_u16_be(&bytes), 0x0102);
        assert_eq!(read_u32_le(&bytes), 0x0403_0201);
        assert_eq!(read_u32_be(&bytes), 0x0102_0304);
        assert_eq!(read_u64_le(&bytes), 0x0807_0605_0403_0201);
        assert_eq!(read_u64_be(&bytes), 0x0102_0304_0506_0708);

        // Trailing bytes are ignored
        assert_eq!(read_u16_be(&bytes[7..]), 0x08FF);
    }
}
