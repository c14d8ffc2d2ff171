//! COG pyramid structure.
//!
//! A Cloud Optimized GeoTIFF stores the full-resolution image in its first
//! IFD and reduced-resolution copies (overviews) in the following ones. This
//! module walks the IFD chain, classifies each IFD by its `NewSubfileType`
//! flags and exposes the tiled levels sorted from finest to coarsest.
//!
//! # Classification
//!
//! - **Base**: the first IFD without the reduced-resolution or mask bits
//! - **Overview**: reduced-resolution bit set, mask bit unset
//! - **Mask**: mask bit set; ignored (masks come from nodata or alpha)

use std::collections::HashSet;

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::decode::SampleLayout;
use super::parser::{ByteOrder, Ifd, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{
    Compression, Predictor, SampleFormat, TiffTag, SUBFILE_MASK, SUBFILE_REDUCED_IMAGE,
};
use super::values::ValueReader;

/// Maximum number of IFDs to follow in the chain
const MAX_IFDS: usize = 64;

// =============================================================================
// PyramidLevel
// =============================================================================

/// One tiled resolution level.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// Index of this level (0 = full resolution)
    pub level_index: usize,

    /// Index of the IFD in the file's chain
    pub ifd_index: usize,

    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,

    /// Number of tiles in X direction
    pub tiles_x: u32,

    /// Number of tiles in Y direction
    pub tiles_y: u32,

    /// Decimation factor relative to level 0, rounded (1 for level 0)
    pub decimation: u32,

    pub ifd: Ifd,
}

impl PyramidLevel {
    /// Build a level from a tiled IFD. Returns `None` when tile or image
    /// dimensions are missing.
    fn from_ifd(ifd: Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order).filter(|&w| w > 0)?;
        let tile_height = ifd.tile_height(byte_order).filter(|&h| h > 0)?;
        let width = ifd.image_width(byte_order)?;
        let height = ifd.image_height(byte_order)?;

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
            decimation: 1,
            ifd,
        })
    }

    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Linear tile index for a tile coordinate, `None` outside the grid.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<u32> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y * self.tiles_x + tile_x)
    }

    /// Read the sample layout (compression, predictor, bit depth, format).
    pub fn read_layout<R: RangeReader>(
        &self,
        reader: &R,
        header: &TiffHeader,
    ) -> Result<SampleLayout, TiffError> {
        let values = ValueReader::new(reader, header);
        let byte_order = header.byte_order;
        let samples_per_pixel = self.ifd.samples_per_pixel(byte_order) as usize;

        let bits = match self.ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
            Some(entry) => values.read_u16_array(entry)?,
            None => vec![1],
        };
        let bits_per_sample = uniform(&bits, "BitsPerSample")?;

        let formats = match self.ifd.get_entry_by_tag(TiffTag::SampleFormat) {
            Some(entry) => values.read_u16_array(entry)?,
            None => vec![1],
        };
        let format_code = uniform(&formats, "SampleFormat")?;
        let sample_format = SampleFormat::from_u16(format_code).ok_or_else(|| {
            TiffError::UnsupportedLayout(format!("SampleFormat {format_code}"))
        })?;

        let compression_code = self.ifd.compression(byte_order);
        let compression = Compression::from_u16(compression_code).ok_or_else(|| {
            TiffError::UnsupportedCompression(format!("code {compression_code}"))
        })?;

        let predictor_code = self.ifd.predictor(byte_order);
        let predictor = Predictor::from_u16(predictor_code)
            .ok_or_else(|| TiffError::UnsupportedLayout(format!("Predictor {predictor_code}")))?;

        Ok(SampleLayout {
            compression,
            predictor,
            sample_format,
            bits_per_sample,
            samples_per_pixel,
        })
    }
}

/// Per-sample tags must agree across samples.
fn uniform(values: &[u16], tag: &'static str) -> Result<u16, TiffError> {
    match values.split_first() {
        Some((first, rest)) if rest.iter().all(|v| v == first) => Ok(*first),
        Some(_) => Err(TiffError::UnsupportedLayout(format!(
            "mixed {tag} values {values:?}"
        ))),
        None => Err(TiffError::InvalidTagValue {
            tag,
            message: "empty".to_string(),
        }),
    }
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// Role of an IFD within a COG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfdRole {
    Base,
    Overview,
    Mask,
    Other,
}

/// A parsed TIFF file split into its pyramid levels.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,

    /// Every IFD of the main chain, in file order
    pub ifds: Vec<Ifd>,

    /// Role of each IFD, parallel to `ifds`
    pub roles: Vec<IfdRole>,

    /// Tiled base + overview levels, finest first
    pub levels: Vec<PyramidLevel>,
}

impl TiffPyramid {
    /// Parse the header and IFD chain and identify the pyramid levels.
    pub fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(reader.size()) as usize;
        let header_bytes = reader.read_exact_at(0, header_len)?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::parse_all_ifds(reader, &header)?;
        Ok(Self::from_ifds(header, ifds))
    }

    fn parse_all_ifds<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            if !seen.insert(offset) || offset >= reader.size() {
                return Err(TiffError::InvalidIfdOffset(offset));
            }

            let count_bytes = reader.read_exact_at(offset, header.ifd_count_size())?;
            let entry_count = if header.is_bigtiff {
                header.byte_order.read_u64(&count_bytes)
            } else {
                header.byte_order.read_u16(&count_bytes) as u64
            };

            let ifd_size = Ifd::calculate_size(entry_count, header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size)?;
            let ifd = Ifd::parse(&ifd_bytes, header, offset)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    /// Classify already-parsed IFDs.
    pub(crate) fn from_ifds(header: TiffHeader, ifds: Vec<Ifd>) -> Self {
        let byte_order = header.byte_order;

        let mut base_seen = false;
        let roles: Vec<IfdRole> = ifds
            .iter()
            .map(|ifd| {
                let subfile = ifd.subfile_type(byte_order);
                if subfile & SUBFILE_MASK != 0 {
                    IfdRole::Mask
                } else if subfile & SUBFILE_REDUCED_IMAGE != 0 {
                    IfdRole::Overview
                } else if !base_seen {
                    base_seen = true;
                    IfdRole::Base
                } else {
                    IfdRole::Other
                }
            })
            .collect();

        let mut levels: Vec<PyramidLevel> = ifds
            .iter()
            .zip(&roles)
            .enumerate()
            .filter(|(_, (_, role))| matches!(role, IfdRole::Base | IfdRole::Overview))
            .filter_map(|(index, (ifd, _))| PyramidLevel::from_ifd(ifd.clone(), index, byte_order))
            .collect();

        // Base first, then overviews by decreasing width
        levels.sort_by(|a, b| {
            let a_base = roles[a.ifd_index] == IfdRole::Base;
            let b_base = roles[b.ifd_index] == IfdRole::Base;
            b_base.cmp(&a_base).then(b.width.cmp(&a.width))
        });

        let base_width = levels
            .first()
            .filter(|l| roles[l.ifd_index] == IfdRole::Base)
            .map(|l| l.width as f64);
        for (index, level) in levels.iter_mut().enumerate() {
            level.level_index = index;
            if let Some(base_width) = base_width {
                level.decimation = (base_width / level.width as f64).round().max(1.0) as u32;
            }
        }

        TiffPyramid {
            header,
            ifds,
            roles,
            levels,
        }
    }

    /// Full-resolution level, if it is tiled.
    pub fn base_level(&self) -> Option<&PyramidLevel> {
        self.levels
            .first()
            .filter(|l| self.roles[l.ifd_index] == IfdRole::Base)
    }

    /// Base IFD, tiled or not.
    pub fn base_ifd(&self) -> Option<(usize, &Ifd)> {
        self.roles
            .iter()
            .position(|r| *r == IfdRole::Base)
            .map(|i| (i, &self.ifds[i]))
    }

    /// Number of reduced-resolution IFDs, tiled or not.
    pub fn overview_count(&self) -> usize {
        self.roles.iter().filter(|r| **r == IfdRole::Overview).count()
    }

    /// Decimation factors of the overview levels, ascending.
    pub fn overview_decimations(&self) -> Vec<u32> {
        let mut factors: Vec<u32> = self.levels.iter().skip(1).map(|l| l.decimation).collect();
        factors.sort_unstable();
        factors
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.base_level().map(|l| (l.width, l.height))
    }
}

// =============================================================================
// Tile data
// =============================================================================

/// Tile locations and JPEG tables for one level.
#[derive(Debug, Clone)]
pub struct TileData {
    /// Byte offset of each tile in the file
    pub offsets: Vec<u64>,

    /// Byte count of each tile
    pub byte_counts: Vec<u64>,

    /// JPEGTables data (if present)
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    /// Load tile offsets, byte counts and JPEG tables for a level.
    pub fn load<R: RangeReader>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let offsets_entry = level
            .ifd
            .get_entry_by_tag(TiffTag::TileOffsets)
            .ok_or(TiffError::MissingTag("TileOffsets"))?;
        let counts_entry = level
            .ifd
            .get_entry_by_tag(TiffTag::TileByteCounts)
            .ok_or(TiffError::MissingTag("TileByteCounts"))?;

        let offsets = values.read_u64_array(offsets_entry)?;
        let byte_counts = values.read_u64_array(counts_entry)?;

        let expected = level.tile_count() as usize;
        if offsets.len() < expected || byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "{} offsets and {} byte counts for {expected} tiles",
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match level.ifd.get_entry_by_tag(TiffTag::JpegTables) {
            Some(entry) => Some(values.read_bytes(entry)?),
            None => None,
        };

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// Offset and size of a tile.
    pub fn get_tile_location(&self, tile_index: u32) -> Option<(u64, u64)> {
        let idx = tile_index as usize;
        Some((*self.offsets.get(idx)?, *self.byte_counts.get(idx)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tiff::parser::IfdEntry;
    use crate::format::tiff::FieldType;
    use crate::io::BytesReader;

    fn header() -> TiffHeader {
        TiffHeader {
            byte_order: ByteOrder::LittleEndian,
            is_bigtiff: false,
            first_ifd_offset: 8,
        }
    }

    fn short(tag: TiffTag, value: u32) -> IfdEntry {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&value.to_le_bytes());
        IfdEntry {
            tag_id: tag.as_u16(),
            tag: Some(tag),
            field_type_raw: 4,
            field_type: Some(FieldType::Long),
            count: 1,
            value_offset_bytes: bytes,
            is_inline: true,
            is_bigtiff: false,
        }
    }

    fn ifd(width: u32, subfile: u32, tiled: bool) -> Ifd {
        let mut entries = vec![
            short(TiffTag::NewSubfileType, subfile),
            short(TiffTag::ImageWidth, width),
            short(TiffTag::ImageLength, width),
        ];
        if tiled {
            entries.push(short(TiffTag::TileWidth, 256));
            entries.push(short(TiffTag::TileLength, 256));
            entries.push(short(TiffTag::TileOffsets, 0));
            entries.push(short(TiffTag::TileByteCounts, 0));
        } else {
            entries.push(short(TiffTag::StripOffsets, 0));
        }
        Ifd {
            offset: 0,
            entries,
            next_ifd_offset: 0,
        }
    }

    #[test]
    fn test_classifies_base_overviews_and_masks() {
        let pyramid = TiffPyramid::from_ifds(
            header(),
            vec![
                ifd(1024, 0, true),
                ifd(256, SUBFILE_REDUCED_IMAGE, true),
                ifd(1024, SUBFILE_MASK, true),
                ifd(512, SUBFILE_REDUCED_IMAGE, true),
            ],
        );

        assert_eq!(
            pyramid.roles,
            vec![IfdRole::Base, IfdRole::Overview, IfdRole::Mask, IfdRole::Overview]
        );
        let widths: Vec<u32> = pyramid.levels.iter().map(|l| l.width).collect();
        assert_eq!(widths, vec![1024, 512, 256]);
        assert_eq!(pyramid.overview_decimations(), vec![2, 4]);
        assert_eq!(pyramid.overview_count(), 2);
        assert_eq!(pyramid.base_level().map(|l| l.ifd_index), Some(0));
    }

    #[test]
    fn test_untiled_base_is_not_a_level() {
        let pyramid = TiffPyramid::from_ifds(header(), vec![ifd(1024, 0, false)]);
        assert!(pyramid.base_level().is_none());
        assert_eq!(pyramid.base_ifd().map(|(i, _)| i), Some(0));
        assert!(pyramid.overview_decimations().is_empty());
    }

    #[test]
    fn test_tile_index_and_grid() {
        let level = PyramidLevel::from_ifd(ifd(1000, 0, true), 0, ByteOrder::LittleEndian).unwrap();
        assert_eq!((level.tiles_x, level.tiles_y), (4, 4));
        assert_eq!(level.tile_count(), 16);
        assert_eq!(level.tile_index(3, 1), Some(7));
        assert_eq!(level.tile_index(4, 0), None);
    }

    #[test]
    fn test_parse_rejects_ifd_loop() {
        // Classic LE header pointing at an IFD whose next offset points back at itself
        let mut data = vec![b'I', b'I', 42, 0, 8, 0, 0, 0];
        data.extend(0u16.to_le_bytes());
        data.extend(8u32.to_le_bytes());
        let reader = BytesReader::new(data, "mem://loop");
        assert!(matches!(
            TiffPyramid::parse(&reader),
            Err(TiffError::InvalidIfdOffset(8))
        ));
    }

    #[test]
    fn test_uniform_sample_tags() {
        assert_eq!(uniform(&[8, 8, 8], "BitsPerSample").unwrap(), 8);
        assert!(matches!(
            uniform(&[8, 16], "BitsPerSample"),
            Err(TiffError::UnsupportedLayout(_))
        ));
    }
}
