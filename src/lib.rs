//! # WSI Reader
//!
//! A format-independent reader for Whole Slide Images (WSI).
//!
//! Whole slide images are gigapixel pyramids: a full-resolution level 0 plus
//! successively downsampled levels, each tiled and compressed by some vendor
//! format. This library answers one question for all of them: "give me this
//! pixel rectangle at this resolution".
//!
//! ## Features
//!
//! - **Any region**: negative origins and regions overhanging the slide are
//!   padded, with a validity mask marking real pixels
//! - **Any resolution**: read by pyramid level or by arbitrary downsample
//!   factor, resampled to the exact requested size
//! - **Format backends**: tiled TIFF (SVS, OME-TIFF) built in, OpenSlide behind
//!   the `openslide` feature, and an in-memory reader
//!
//! ## Architecture
//!
//! - [`region`] - pixel buffers, request geometry, level selection, resampling
//! - [`slide`] - the `SlideReader` backend trait and the `Slide` façade
//! - [`mod@format`] - format detection and backends
//! - [`config`] - CLI configuration for the `wsi-reader` binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_reader::{open_slide, ReadOptions};
//!
//! let slide = open_slide("slide.svs")?;
//! let (width, height) = slide.dimensions()?;
//!
//! // Centered 1024x1024 crop at level 0
//! let origin = (i64::from(width / 2) - 512, i64::from(height / 2) - 512);
//! let region = slide.read_region(origin, 0, 1024, ReadOptions::new())?;
//! assert_eq!(region.pixels.shape().0, 1024);
//! # Ok::<(), wsi_reader::SlideError>(())
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod region;
pub mod slide;

// Re-export commonly used types
pub use error::{BackendError, FormatError, SlideError};
pub use format::{detect_format, is_tiff_header, MemoryReader, SlideFormat, TiffReader};
pub use region::{
    best_level_for_downsample, PixelBuffer, PixelData, PixelType, Region, RegionSize,
    ValidityMask,
};
pub use slide::{
    open_slide, open_slide_series, DynSlide, Mpp, ReadOptions, Slide, SlideInfo, SlideReader,
};
