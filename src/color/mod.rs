//! Color processing applied to tiles before encoding.
//!
//! Order of application: [`rescale`] (raw samples to 8 bits), then the
//! [`ColorChain`] operations, then a [`Colormap`] for single-band tiles.

mod colormap;
mod operations;
mod rescale;

pub use colormap::{Colormap, COLORMAP_NAMES};
pub use operations::{ColorChain, ColorOp};
pub use rescale::{rescale, ScaleSpec};
