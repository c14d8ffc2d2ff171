//! TIFF reader for Cloud Optimized GeoTIFFs.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values must be read respecting this order.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. The parser handles both transparently.
//!
//! - **IFD (Image File Directory)**: metadata and pointers to image data. A COG
//!   has one IFD for the full-resolution image followed by one per overview,
//!   optionally interleaved with mask IFDs.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.

mod decode;
mod parser;
mod pyramid;
mod tags;
mod validation;
mod values;

pub use decode::{decode_tile, SampleLayout};
pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pyramid::{IfdRole, PyramidLevel, TiffPyramid, TileData};
pub use tags::{
    Compression, FieldType, Predictor, SampleFormat, TiffTag, EXTRA_SAMPLE_ASSOCIATED_ALPHA,
    EXTRA_SAMPLE_UNASSOCIATED_ALPHA, SUBFILE_MASK, SUBFILE_REDUCED_IMAGE,
};
pub use validation::{validate_cog, validate_ifd, ValidationError, ValidationResult};
pub use values::{parse_u64_array, ValueReader};
