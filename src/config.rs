//! Command-line configuration for the `wsi-reader` tool.
//!
//! The binary exposes three subcommands:
//!
//! - `info` - print slide metadata as JSON
//! - `region` - read a region at a level or downsample factor and save it as PNG
//! - `thumbnail` - save a downsampled view of the whole slide
//!
//! # Environment Variables
//!
//! - `WSI_VERBOSE` - Enable debug logging (same as `--verbose`)
//! - `RUST_LOG` - Overrides the log filter entirely
//!
//! # Example
//!
//! ```text
//! wsi-reader region slide.svs --x 1000 --y 2000 --downsample 3 \
//!     --width 512 --height 512 --output region.png --mask-output mask.png
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::slide::ReadOptions;

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Reader - read any region of a Whole Slide Image.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-reader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false, env = "WSI_VERBOSE")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print slide metadata as JSON.
    Info(InfoConfig),

    /// Read a region and save it as PNG.
    Region(RegionConfig),

    /// Save a downsampled view of the whole slide as PNG.
    Thumbnail(ThumbnailConfig),
}

// =============================================================================
// Info
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Path to the slide file.
    pub path: PathBuf,

    /// Image series to open (multi-series TIFF files).
    #[arg(long, default_value_t = 0)]
    pub series: usize,
}

impl InfoConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_path(&self.path)
    }
}

// =============================================================================
// Region
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct RegionConfig {
    /// Path to the slide file.
    pub path: PathBuf,

    /// Image series to open (multi-series TIFF files).
    #[arg(long, default_value_t = 0)]
    pub series: usize,

    /// Left edge of the region (may be negative).
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub x: i64,

    /// Top edge of the region (may be negative).
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub y: i64,

    /// Pyramid level to read; coordinates are in this level's frame.
    #[arg(long, conflicts_with = "downsample")]
    pub level: Option<usize>,

    /// Downsample factor to read at; coordinates are in the downsampled frame.
    #[arg(long)]
    pub downsample: Option<f64>,

    /// Region width in pixels.
    #[arg(long)]
    pub width: u32,

    /// Region height in pixels.
    #[arg(long)]
    pub height: u32,

    /// Build lower resolutions from level 0 instead of the pyramid.
    #[arg(long, default_value_t = false)]
    pub level0: bool,

    /// Output PNG for the pixels.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Optional output PNG for the validity mask.
    #[arg(long)]
    pub mask_output: Option<PathBuf>,
}

/// Where a region is addressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegionTarget {
    Level(usize),
    Downsample(f64),
}

impl RegionConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_path(&self.path)?;
        if self.width == 0 || self.height == 0 {
            return Err("--width and --height must be greater than 0".to_string());
        }
        if let Some(ds) = self.downsample {
            if !(ds.is_finite() && ds > 0.0) {
                return Err(format!("--downsample must be positive, got {}", ds));
            }
        }
        Ok(())
    }

    /// Level or downsample; level 0 when neither is given.
    pub fn target(&self) -> RegionTarget {
        match (self.level, self.downsample) {
            (_, Some(ds)) => RegionTarget::Downsample(ds),
            (Some(level), None) => RegionTarget::Level(level),
            (None, None) => RegionTarget::Level(0),
        }
    }

    pub fn read_options(&self) -> ReadOptions {
        ReadOptions::new().with_level_0_downsample(self.level0)
    }
}

// =============================================================================
// Thumbnail
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ThumbnailConfig {
    /// Path to the slide file.
    pub path: PathBuf,

    /// Image series to open (multi-series TIFF files).
    #[arg(long, default_value_t = 0)]
    pub series: usize,

    /// Maximum thumbnail width.
    #[arg(long, default_value_t = 512)]
    pub width: u32,

    /// Maximum thumbnail height.
    #[arg(long, default_value_t = 512)]
    pub height: u32,

    /// Output PNG.
    #[arg(short, long)]
    pub output: PathBuf,
}

impl ThumbnailConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_path(&self.path)?;
        if self.width == 0 || self.height == 0 {
            return Err("--width and --height must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn validate_path(path: &std::path::Path) -> Result<(), String> {
    if path.as_os_str().is_empty() {
        return Err("slide path is required".to_string());
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
