//! Cloud Optimized GeoTIFF validation.
//!
//! A raster is only served if it is a COG in the subset this crate reads:
//! - **Organization**: base and every overview tiled (no strips)
//! - **Overviews**: at least one reduced-resolution IFD
//! - **Compression**: none, LZW, JPEG, Deflate
//! - **Layout**: chunky (pixel-interleaved) planar configuration
//! - **Structure**: tile offsets and byte counts present on every level
//!
//! Layout problems that are legal TIFF but slow to read remotely (IFDs far
//! from the start of the file, overviews out of order) are warnings.

use thiserror::Error;

use super::parser::{ByteOrder, Ifd};
use super::pyramid::{IfdRole, TiffPyramid};
use super::tags::{Compression, TiffTag};

/// Main IFD offsets beyond this are reported as a warning.
const MAX_MAIN_IFD_OFFSET: u64 = 300;

// =============================================================================
// Validation Result
// =============================================================================

/// Outcome of validating a file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        ValidationResult {
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// All errors joined into one message.
    pub fn reason(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A reason the file is not a usable COG.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no full-resolution image found")]
    NoBaseImage,

    #[error("IFD {ifd_index} is not tiled")]
    NotTiled { ifd_index: usize },

    #[error("no internal overviews")]
    NoOverviews,

    #[error("IFD {ifd_index} uses unsupported compression {compression_name}")]
    UnsupportedCompression {
        ifd_index: usize,
        compression_name: String,
    },

    #[error("IFD {ifd_index} uses planar (band-separate) configuration")]
    PlanarSeparate { ifd_index: usize },

    #[error("IFD {ifd_index} is missing {missing_tags:?}")]
    MissingTileTags {
        ifd_index: usize,
        missing_tags: Vec<&'static str>,
    },
}

// =============================================================================
// IFD Validation
// =============================================================================

/// Validate one base or overview IFD.
pub fn validate_ifd(ifd: &Ifd, ifd_index: usize, byte_order: ByteOrder) -> ValidationResult {
    let mut result = ValidationResult::ok();

    if !ifd.is_tiled() {
        result.add_error(ValidationError::NotTiled { ifd_index });
        return result;
    }

    let code = ifd.compression(byte_order);
    let supported = Compression::from_u16(code).filter(|c| c.is_supported());
    if supported.is_none() {
        result.add_error(ValidationError::UnsupportedCompression {
            ifd_index,
            compression_name: Compression::from_u16(code)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| format!("Unknown ({code})")),
        });
    }

    if ifd.planar_configuration(byte_order) != 1 {
        result.add_error(ValidationError::PlanarSeparate { ifd_index });
    }

    let missing_tags: Vec<&'static str> = [
        TiffTag::TileLength,
        TiffTag::TileByteCounts,
        TiffTag::ImageWidth,
        TiffTag::ImageLength,
    ]
    .into_iter()
    .filter(|tag| ifd.get_entry_by_tag(*tag).is_none())
    .map(TiffTag::name)
    .collect();
    if !missing_tags.is_empty() {
        result.add_error(ValidationError::MissingTileTags {
            ifd_index,
            missing_tags,
        });
    }

    if let (Some(w), Some(h)) = (ifd.tile_width(byte_order), ifd.tile_height(byte_order)) {
        if w % 16 != 0 || h % 16 != 0 {
            result.add_warning(format!(
                "IFD {ifd_index}: tile dimensions {w}x{h} are not multiples of 16"
            ));
        }
    }

    result
}

/// Validate the whole file as a COG.
pub fn validate_cog(pyramid: &TiffPyramid) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let byte_order = pyramid.header.byte_order;

    let Some((base_index, base)) = pyramid.base_ifd() else {
        result.add_error(ValidationError::NoBaseImage);
        return result;
    };

    if base.offset > MAX_MAIN_IFD_OFFSET {
        result.add_warning(format!(
            "main IFD at offset {} (expected < {MAX_MAIN_IFD_OFFSET})",
            base.offset
        ));
    }

    if pyramid.overview_count() == 0 {
        result.add_error(ValidationError::NoOverviews);
    }

    for (index, (ifd, role)) in pyramid.ifds.iter().zip(&pyramid.roles).enumerate() {
        if !matches!(role, IfdRole::Base | IfdRole::Overview) {
            continue;
        }
        let ifd_result = validate_ifd(ifd, index, byte_order);
        for error in ifd_result.errors {
            result.add_error(error);
        }
        for warning in ifd_result.warnings {
            result.add_warning(warning);
        }
    }

    // Overviews should follow the base in decreasing size
    let widths: Vec<u32> = pyramid
        .ifds
        .iter()
        .zip(&pyramid.roles)
        .enumerate()
        .filter(|(i, (_, role))| *i == base_index || **role == IfdRole::Overview)
        .filter_map(|(_, (ifd, _))| ifd.image_width(byte_order))
        .collect();
    if widths.windows(2).any(|w| w[1] >= w[0]) {
        result.add_warning("overviews are not sorted by decreasing size".to_string());
    }

    result
}
