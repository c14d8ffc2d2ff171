//! File format readers.
//!
//! [`tiff`] parses the TIFF container and decodes tiles, [`geotiff`] adds the
//! georeferencing layer, and [`jpeg`] handles JPEG-compressed tiles.

pub mod geotiff;
pub mod jpeg;
pub mod tiff;
