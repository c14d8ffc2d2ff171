use thiserror::Error;

/// I/O errors that can occur when reading raster bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// The underlying file could not be opened or read
    #[error("I/O error on {path}: {message}")]
    File { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Unsupported sample layout (bit depth, sample format, planar configuration)
    #[error("Unsupported sample layout: {0}")]
    UnsupportedLayout(String),

    /// File uses strips instead of tiles
    #[error("Unsupported organization: file uses strips instead of tiles")]
    StripOrganization,

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// A compressed tile could not be decoded
    #[error("Failed to decode tile {index}: {message}")]
    Decode { index: usize, message: String },
}

/// Errors raised while opening a raster or reading a tile from it
#[derive(Debug, Clone, Error)]
pub enum RasterError {
    /// TIFF structure error
    #[error(transparent)]
    Tiff(#[from] TiffError),

    /// The file is a TIFF but not a Cloud Optimized GeoTIFF
    #[error("{path} is not a valid Cloud Optimized GeoTIFF: {reason}")]
    NotCloudOptimized { path: String, reason: String },

    /// No geotransform tags
    #[error("Raster has no georeferencing (ModelPixelScale/ModelTiepoint or ModelTransformation)")]
    MissingGeoreference,

    /// ModelTransformation with rotation or shear terms
    #[error("Rotated or sheared geotransforms are not supported")]
    RotatedGeotransform,

    /// CRS cannot be expressed as an EPSG code or is unknown
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    /// Band index outside 1..=band_count
    #[error("Invalid band index {index}: raster has {band_count} band(s)")]
    InvalidBandIndex { index: usize, band_count: usize },

    /// Band selection does not resolve to 1 or 3 bands
    #[error("Raster has {0} band(s) selected; select 1 or 3 bands with --bidx")]
    UnsupportedBandCount(usize),

    /// Scale pairs do not match the band count
    #[error("Invalid scale: {0}")]
    InvalidScale(String),

    /// Coordinate transformation failed
    #[error("Projection error: {0}")]
    Projection(String),
}

/// Errors raised by color expressions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ColorError {
    /// First token of an operation is not a known operation name
    #[error("{0} is not a valid operation")]
    UnknownOperation(String),

    /// Band selector references an invalid band
    #[error("{op} BAND must be between 1 and 3, got '{band}'")]
    InvalidBand { op: String, band: String },

    /// Band selector references a band the tile does not have
    #[error("{op} references band {band} but the tile has {available} band(s)")]
    BandOutOfRange {
        op: String,
        band: usize,
        available: usize,
    },

    /// Argument is not a number
    #[error("{op}: '{value}' is not a number")]
    InvalidArgument { op: String, value: String },

    /// Wrong number of arguments for the operation
    #[error("{op} expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        op: String,
        expected: usize,
        actual: usize,
    },

    /// Argument out of its valid domain
    #[error("{op}: {message}")]
    OutOfDomain { op: String, message: String },
}

/// Errors that can occur while serving a single tile request
#[derive(Debug, Error)]
pub enum TileError {
    /// Tile lies outside the raster (not a failure, mapped to 404)
    #[error("Tile {z}/{x}/{y} is outside the raster bounds")]
    NotFound { z: u8, x: u32, y: u32 },

    /// Requested image format is not one of png, jpg, jpeg, webp
    #[error("Unsupported tile format: {format}")]
    InvalidFormat { format: String },

    /// Color expression failed to parse or apply
    #[error("Invalid color expression: {0}")]
    InvalidColorExpression(#[from] ColorError),

    /// Raster read failure
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    /// Image encoding failure
    #[error("Failed to encode tile: {message}")]
    EncodeError { message: String },

    /// The worker task panicked or was cancelled
    #[error("Tile worker failed: {message}")]
    Worker { message: String },
}
