//! TIFF tag and field type definitions.
//!
//! This module defines the vocabulary for TIFF parsing, including:
//! - Field types that determine how values are encoded
//! - Tag IDs that identify metadata fields, including the GeoTIFF and GDAL
//!   private tags a COG carries
//!
//! The definitions support both classic TIFF and BigTIFF formats.

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types that determine how values are encoded.
///
/// Each field type has a specific size in bytes, which is critical for:
/// - Determining if a value fits inline in an IFD entry
/// - Reading arrays of values correctly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer (1 byte)
    Byte = 1,

    /// 8-bit ASCII character (1 byte)
    Ascii = 2,

    /// Unsigned 16-bit integer (2 bytes)
    Short = 3,

    /// Unsigned 32-bit integer (4 bytes)
    Long = 4,

    /// Two Longs: numerator, denominator (8 bytes)
    Rational = 5,

    /// Signed 8-bit integer (1 byte)
    SByte = 6,

    /// Undefined byte data (1 byte per element)
    Undefined = 7,

    /// Signed 16-bit integer (2 bytes)
    SShort = 8,

    /// Signed 32-bit integer (4 bytes)
    SLong = 9,

    /// Two SLongs (8 bytes)
    SRational = 10,

    /// IEEE single precision (4 bytes)
    Float = 11,

    /// IEEE double precision (8 bytes); GeoTIFF model tags use this
    Double = 12,

    /// Unsigned 64-bit integer (8 bytes) - BigTIFF only
    Long8 = 16,

    /// Signed 64-bit integer (8 bytes) - BigTIFF only
    SLong8 = 17,

    /// 64-bit IFD offset (8 bytes) - BigTIFF only
    Ifd8 = 18,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float => 4,
            FieldType::Rational
            | FieldType::SRational
            | FieldType::Double
            | FieldType::Long8
            | FieldType::SLong8
            | FieldType::Ifd8 => 8,
        }
    }

    /// Create a FieldType from its numeric value.
    ///
    /// Returns `None` for unknown type values.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            6 => Some(FieldType::SByte),
            7 => Some(FieldType::Undefined),
            8 => Some(FieldType::SShort),
            9 => Some(FieldType::SLong),
            10 => Some(FieldType::SRational),
            11 => Some(FieldType::Float),
            12 => Some(FieldType::Double),
            16 => Some(FieldType::Long8),
            17 => Some(FieldType::SLong8),
            18 => Some(FieldType::Ifd8),
            _ => None,
        }
    }

    /// Maximum bytes that can be stored inline in a classic TIFF IFD entry.
    pub const INLINE_THRESHOLD_TIFF: usize = 4;

    /// Maximum bytes that can be stored inline in a BigTIFF IFD entry.
    pub const INLINE_THRESHOLD_BIGTIFF: usize = 8;

    /// Check if a value with this type and count fits inline in a TIFF entry.
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let total_size = self.size_in_bytes() as u64 * count;
        let threshold = if is_bigtiff {
            Self::INLINE_THRESHOLD_BIGTIFF as u64
        } else {
            Self::INLINE_THRESHOLD_TIFF as u64
        };
        total_size <= threshold
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// TIFF tag IDs relevant to COG parsing.
///
/// Tags not listed here are kept in the IFD as raw entries but have no name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    // -------------------------------------------------------------------------
    // Basic Image Structure
    // -------------------------------------------------------------------------
    /// Bit flags: 1 = reduced resolution (overview), 4 = transparency mask
    NewSubfileType = 254,

    /// Image width in pixels
    ImageWidth = 256,

    /// Image height (length) in pixels
    ImageLength = 257,

    /// Bits per sample, one value per sample
    BitsPerSample = 258,

    /// Compression scheme used
    Compression = 259,

    /// Photometric interpretation (MinIsBlack, RGB, YCbCr, ...)
    PhotometricInterpretation = 262,

    /// Number of components per pixel
    SamplesPerPixel = 277,

    /// How components are organized (1 = chunky, 2 = planar)
    PlanarConfiguration = 284,

    /// Differencing applied before compression
    Predictor = 317,

    /// Meaning of samples beyond the color channels (2 = unassociated alpha)
    ExtraSamples = 338,

    /// 1 = uint, 2 = int, 3 = IEEE float
    SampleFormat = 339,

    // -------------------------------------------------------------------------
    // Strip Organization (rejected for COGs)
    // -------------------------------------------------------------------------
    /// Byte offsets of strips
    StripOffsets = 273,

    /// Row count per strip
    RowsPerStrip = 278,

    /// Byte counts of strips
    StripByteCounts = 279,

    // -------------------------------------------------------------------------
    // Tile Organization
    // -------------------------------------------------------------------------
    /// Width of each tile in pixels
    TileWidth = 322,

    /// Height (length) of each tile in pixels
    TileLength = 323,

    /// Byte offsets of each tile in the file
    TileOffsets = 324,

    /// Byte counts of each tile
    TileByteCounts = 325,

    // -------------------------------------------------------------------------
    // JPEG Handling
    // -------------------------------------------------------------------------
    /// Shared quantization and Huffman tables for abbreviated tile streams
    JpegTables = 347,

    // -------------------------------------------------------------------------
    // GeoTIFF
    // -------------------------------------------------------------------------
    /// Pixel size in model units (ScaleX, ScaleY, ScaleZ)
    ModelPixelScale = 33550,

    /// Raster to model tie points (I, J, K, X, Y, Z)
    ModelTiepoint = 33922,

    /// 4x4 raster to model affine matrix
    ModelTransformation = 34264,

    /// GeoKey directory
    GeoKeyDirectory = 34735,

    /// Double-valued GeoKeys
    GeoDoubleParams = 34736,

    /// ASCII-valued GeoKeys
    GeoAsciiParams = 34737,

    // -------------------------------------------------------------------------
    // GDAL private tags
    // -------------------------------------------------------------------------
    /// Nodata value as an ASCII string
    GdalNodata = 42113,
}

impl TiffTag {
    /// Create a TiffTag from its numeric value.
    ///
    /// Returns `None` for unrecognized tags. Unknown tags are not an error;
    /// they are simply ignored during parsing.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            254 => Some(TiffTag::NewSubfileType),
            256 => Some(TiffTag::ImageWidth),
            257 => Some(TiffTag::ImageLength),
            258 => Some(TiffTag::BitsPerSample),
            259 => Some(TiffTag::Compression),
            262 => Some(TiffTag::PhotometricInterpretation),
            273 => Some(TiffTag::StripOffsets),
            277 => Some(TiffTag::SamplesPerPixel),
            278 => Some(TiffTag::RowsPerStrip),
            279 => Some(TiffTag::StripByteCounts),
            284 => Some(TiffTag::PlanarConfiguration),
            317 => Some(TiffTag::Predictor),
            322 => Some(TiffTag::TileWidth),
            323 => Some(TiffTag::TileLength),
            324 => Some(TiffTag::TileOffsets),
            325 => Some(TiffTag::TileByteCounts),
            338 => Some(TiffTag::ExtraSamples),
            339 => Some(TiffTag::SampleFormat),
            347 => Some(TiffTag::JpegTables),
            33550 => Some(TiffTag::ModelPixelScale),
            33922 => Some(TiffTag::ModelTiepoint),
            34264 => Some(TiffTag::ModelTransformation),
            34735 => Some(TiffTag::GeoKeyDirectory),
            34736 => Some(TiffTag::GeoDoubleParams),
            34737 => Some(TiffTag::GeoAsciiParams),
            42113 => Some(TiffTag::GdalNodata),
            _ => None,
        }
    }

    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Tag name used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            TiffTag::NewSubfileType => "NewSubfileType",
            TiffTag::ImageWidth => "ImageWidth",
            TiffTag::ImageLength => "ImageLength",
            TiffTag::BitsPerSample => "BitsPerSample",
            TiffTag::Compression => "Compression",
            TiffTag::PhotometricInterpretation => "PhotometricInterpretation",
            TiffTag::SamplesPerPixel => "SamplesPerPixel",
            TiffTag::PlanarConfiguration => "PlanarConfiguration",
            TiffTag::Predictor => "Predictor",
            TiffTag::ExtraSamples => "ExtraSamples",
            TiffTag::SampleFormat => "SampleFormat",
            TiffTag::StripOffsets => "StripOffsets",
            TiffTag::RowsPerStrip => "RowsPerStrip",
            TiffTag::StripByteCounts => "StripByteCounts",
            TiffTag::TileWidth => "TileWidth",
            TiffTag::TileLength => "TileLength",
            TiffTag::TileOffsets => "TileOffsets",
            TiffTag::TileByteCounts => "TileByteCounts",
            TiffTag::JpegTables => "JPEGTables",
            TiffTag::ModelPixelScale => "ModelPixelScale",
            TiffTag::ModelTiepoint => "ModelTiepoint",
            TiffTag::ModelTransformation => "ModelTransformation",
            TiffTag::GeoKeyDirectory => "GeoKeyDirectory",
            TiffTag::GeoDoubleParams => "GeoDoubleParams",
            TiffTag::GeoAsciiParams => "GeoAsciiParams",
            TiffTag::GdalNodata => "GDAL_NODATA",
        }
    }
}

// =============================================================================
// Compression Values
// =============================================================================

/// TIFF compression scheme identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    /// No compression
    None = 1,

    /// LZW compression
    Lzw = 5,

    /// "Old-style" JPEG (not supported)
    OldJpeg = 6,

    /// JPEG compression
    Jpeg = 7,

    /// Deflate/zlib compression
    Deflate = 8,

    /// Adobe Deflate (same stream format as Deflate)
    AdobeDeflate = 32946,

    /// JPEG 2000 (not supported)
    Jpeg2000 = 33003,

    /// Zstandard (not supported)
    Zstd = 50000,

    /// WebP (not supported)
    Webp = 50001,
}

impl Compression {
    /// Create a Compression from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            5 => Some(Compression::Lzw),
            6 => Some(Compression::OldJpeg),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::Deflate),
            32946 => Some(Compression::AdobeDeflate),
            33003 => Some(Compression::Jpeg2000),
            50000 => Some(Compression::Zstd),
            50001 => Some(Compression::Webp),
            _ => None,
        }
    }

    /// Check if tiles with this compression can be decoded.
    #[inline]
    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            Compression::None
                | Compression::Lzw
                | Compression::Jpeg
                | Compression::Deflate
                | Compression::AdobeDeflate
        )
    }

    /// Get a human-readable name for the compression scheme.
    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::Jpeg2000 => "JPEG 2000",
            Compression::Zstd => "ZSTD",
            Compression::Webp => "WebP",
        }
    }
}

// =============================================================================
// Sample Interpretation
// =============================================================================

/// Numeric interpretation of samples (SampleFormat tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Uint,
    Int,
    Float,
}

impl SampleFormat {
    /// Decode the SampleFormat tag value. Value 4 (undefined) is read as uint.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 | 4 => Some(SampleFormat::Uint),
            2 => Some(SampleFormat::Int),
            3 => Some(SampleFormat::Float),
            _ => None,
        }
    }
}

/// Differencing predictor (Predictor tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    None,
    Horizontal,
    FloatingPoint,
}

impl Predictor {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Predictor::None),
            2 => Some(Predictor::Horizontal),
            3 => Some(Predictor::FloatingPoint),
            _ => None,
        }
    }
}

/// ExtraSamples value for unassociated alpha.
pub const EXTRA_SAMPLE_UNASSOCIATED_ALPHA: u16 = 2;

/// ExtraSamples value for associated (premultiplied) alpha.
pub const EXTRA_SAMPLE_ASSOCIATED_ALPHA: u16 = 1;

/// NewSubfileType bit for reduced-resolution images.
pub const SUBFILE_REDUCED_IMAGE: u32 = 1;

/// NewSubfileType bit for transparency masks.
pub const SUBFILE_MASK: u32 = 4;

// =============================================================================
// Tests
// =============================================================================
