//! Command-line configuration for cog-glui.
//!
//! Options are parsed with clap. Server settings can also come from the
//! environment with the `COG_GLUI_` prefix, and the Mapbox token from
//! `MAPBOX_ACCESS_TOKEN`.
//!
//! # Example
//!
//! ```text
//! cog-glui scene.tif --bidx 4,3,2 --scale 0 4000 --playground
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::color::{Colormap, COLORMAP_NAMES};
use crate::raster::{CogOptions, NodataOption, Resampling};
use crate::tile::{TileFormat, DEFAULT_WORKERS};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default edge of served tiles, in pixels.
pub const DEFAULT_TILE_DIMENSIONS: u32 = 512;

/// Default `tileSize` given to mapbox-gl.
pub const DEFAULT_GL_TILE_SIZE: u32 = 512;

/// Prefix of public Mapbox tokens.
const MAPBOX_PUBLIC_PREFIX: &str = "pk";

// =============================================================================
// Value Parsers
// =============================================================================

/// 1-based band indexes given with `--bidx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandIndexes(pub Vec<usize>);

/// Parse `"1,2,3"` or `"1"`: one or three positive integers.
pub fn parse_bidx(value: &str) -> Result<BandIndexes, String> {
    const USAGE: &str =
        "bidx must be a string with 1 or 3 ints comma-separated, representing the band indexes for R,G,B";

    let bands = value
        .split(',')
        .map(|b| b.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| USAGE.to_string())?;

    if !matches!(bands.len(), 1 | 3) || bands.contains(&0) {
        return Err(USAGE.to_string());
    }
    Ok(BandIndexes(bands))
}

/// Parse a nodata token: `nan`, `none`/`nil`/`nada` (no masking), or a number.
pub fn parse_nodata(value: &str) -> Result<NodataOption, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "nan" => Ok(NodataOption::Value(f64::NAN)),
        "none" | "nil" | "nada" => Ok(NodataOption::Disabled),
        other => other
            .parse::<f64>()
            .map(NodataOption::Value)
            .map_err(|_| format!("'{value}' is not a valid nodata value (number, nan or none)")),
    }
}

/// Accept an empty token or a public (`pk`) Mapbox token.
pub fn parse_mapbox_token(value: &str) -> Result<String, String> {
    if value.is_empty() || value.starts_with(MAPBOX_PUBLIC_PREFIX) {
        Ok(value.to_string())
    } else {
        Err("Mapbox access token must be public (pk). \
             Get a public token at https://www.mapbox.com/account/"
            .to_string())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// cog-glui - Inspect a Cloud Optimized GeoTIFF in the browser.
///
/// Serves the raster as web-mercator tiles and a mapbox-gl preview page.
#[derive(Parser, Debug, Clone)]
#[command(name = "cog-glui")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Path to the Cloud Optimized GeoTIFF.
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    // =========================================================================
    // Raster Configuration
    // =========================================================================
    /// Band indexes to serve, "1,2,3" or "1" (default: all bands).
    #[arg(short, long, value_parser = parse_bidx)]
    pub bidx: Option<BandIndexes>,

    /// Nodata value: a number, "nan", or "none" to disable masking.
    #[arg(long, value_parser = parse_nodata, allow_hyphen_values = true)]
    pub nodata: Option<NodataOption>,

    /// Band index holding per-pixel validity.
    #[arg(long)]
    pub alpha: Option<usize>,

    /// Edge of served tiles in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_DIMENSIONS)]
    pub tiles_dimensions: u32,

    /// Resampling used when warping to web mercator (nearest or bilinear).
    #[arg(long, default_value_t = Resampling::Bilinear)]
    pub resampling: Resampling,

    // =========================================================================
    // Tile Configuration
    // =========================================================================
    /// Tile image format (png, jpg or webp).
    #[arg(long, default_value_t = TileFormat::Png)]
    pub tiles_format: TileFormat,

    /// Linear rescale range for raw values; give once for all bands or once per band.
    #[arg(
        long,
        num_args = 2,
        value_names = ["MIN", "MAX"],
        action = ArgAction::Append,
        allow_negative_numbers = true
    )]
    pub scale: Vec<f64>,

    /// Colormap for single-band rasters (cfastie, schwarzwald, gray).
    #[arg(long)]
    pub colormap: Option<String>,

    /// Number of concurrent tile workers.
    #[arg(long, default_value_t = DEFAULT_WORKERS, env = "COG_GLUI_WORKERS")]
    pub workers: usize,

    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "COG_GLUI_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "COG_GLUI_PORT")]
    pub port: u16,

    /// mapbox-gl tileSize.
    #[arg(long, default_value_t = DEFAULT_GL_TILE_SIZE)]
    pub gl_tile_size: u32,

    /// Open the playground page instead of the simple viewer.
    #[arg(long, default_value_t = false)]
    pub playground: bool,

    /// Public Mapbox access token appended to the preview URL.
    #[arg(long, env = "MAPBOX_ACCESS_TOKEN", value_parser = parse_mapbox_token)]
    pub mapbox_token: Option<String>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tiles_dimensions == 0 {
            return Err("tiles_dimensions must be greater than 0".to_string());
        }
        if self.gl_tile_size == 0 {
            return Err("gl_tile_size must be greater than 0".to_string());
        }
        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }

        if let Some(alpha) = self.alpha {
            if alpha == 0 {
                return Err("alpha must be a 1-based band index".to_string());
            }
            if matches!(self.nodata, Some(NodataOption::Value(_))) {
                return Err("--nodata and --alpha cannot be used together".to_string());
            }
            if let Some(BandIndexes(indexes)) = &self.bidx {
                if indexes.contains(&alpha) {
                    return Err(format!(
                        "alpha band {alpha} cannot also be one of the bidx bands"
                    ));
                }
            }
        }

        for (min, max) in self.scale_pairs() {
            if !(min < max) {
                return Err(format!("scale range must have MIN < MAX, got {min} {max}"));
            }
        }

        if let Some(name) = &self.colormap {
            if Colormap::from_name(name).is_none() {
                return Err(format!(
                    "unknown colormap '{name}', expected one of: {}",
                    COLORMAP_NAMES.join(", ")
                ));
            }
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `--scale` values grouped as (min, max) pairs.
    pub fn scale_pairs(&self) -> Vec<(f64, f64)> {
        self.scale
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    /// The colormap selected with `--colormap`, if it is known.
    pub fn colormap(&self) -> Option<Colormap> {
        self.colormap.as_deref().and_then(Colormap::from_name)
    }

    /// Token for the preview URL, `None` when unset or empty.
    pub fn mapbox_token(&self) -> Option<&str> {
        self.mapbox_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Options for opening the raster.
    pub fn cog_options(&self) -> CogOptions {
        CogOptions {
            indexes: self.bidx.as_ref().map(|b| b.0.clone()),
            nodata: self.nodata.unwrap_or_default(),
            alpha: self.alpha,
            tile_size: self.tiles_dimensions,
            resampling: self.resampling,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
