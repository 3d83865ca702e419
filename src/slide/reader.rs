//! SlideReader trait for format-agnostic slide access.
//!
//! This module defines the `SlideReader` trait, the contract every format
//! backend fulfils. A reader exposes immutable pyramid metadata and one raw
//! read operation; it never clips, pads or resamples. That work happens once,
//! in [`Slide`](super::Slide), for all formats.
//!
//! Implemented by:
//! - [`crate::format::TiffReader`] for tiled TIFF files (SVS, OME-TIFF, ...)
//! - [`crate::format::MemoryReader`] for pyramids already held in memory
//! - `crate::format::OpenSlideReader` (feature `openslide`) for vendor formats

use serde::Serialize;

use crate::error::BackendError;
use crate::region::{PixelType, Region};

// =============================================================================
// Microns Per Pixel
// =============================================================================

/// Physical pixel size in micrometers, per axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Mpp {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl Mpp {
    pub const fn new(x: Option<f64>, y: Option<f64>) -> Self {
        Self { x, y }
    }

    /// Same resolution on both axes.
    pub const fn uniform(mpp: f64) -> Self {
        Self {
            x: Some(mpp),
            y: Some(mpp),
        }
    }

    pub const fn unknown() -> Self {
        Self { x: None, y: None }
    }

    pub fn is_known(&self) -> bool {
        self.x.is_some() || self.y.is_some()
    }
}

// =============================================================================
// SlideReader Trait
// =============================================================================

/// Format-specific backend behind a [`Slide`](super::Slide).
///
/// Metadata accessors return `None` for levels out of range. `read_raw` only
/// ever receives in-bounds requests from [`Slide`](super::Slide), and must
/// return a region of exactly the requested size.
///
/// The trait is object safe; `Box<dyn SlideReader + Send>` is what
/// [`open_slide`](super::open_slide) hands out.
pub trait SlideReader {
    /// Number of pyramid levels. Level 0 is full resolution.
    fn level_count(&self) -> usize;

    /// `(width, height)` of a level in pixels.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// `(tile_width, tile_height)` of a level in pixels.
    fn tile_size(&self, level: usize) -> Option<(u32, u32)>;

    /// Natively recorded downsample of a level relative to level 0.
    ///
    /// Backends that do not store one return `None`; the slide then derives
    /// downsamples from the level widths.
    fn level_downsample(&self, _level: usize) -> Option<f64> {
        None
    }

    /// Microns per pixel at level 0.
    fn mpp(&self) -> Mpp {
        Mpp::unknown()
    }

    fn pixel_type(&self) -> PixelType;

    fn channel_count(&self) -> usize;

    /// Read `size` pixels at `origin` from `level`.
    ///
    /// Coordinates are in the frame of `level`. The request lies within the
    /// level bounds. The returned region has exactly `size` pixels; its mask
    /// marks which ones the backend actually had data for.
    fn read_raw(
        &self,
        origin: (u32, u32),
        level: usize,
        size: (u32, u32),
    ) -> Result<Region, BackendError>;

    /// Release the underlying file or native handle. Idempotent.
    fn close(&mut self);
}

impl<R: SlideReader + ?Sized> SlideReader for Box<R> {
    fn level_count(&self) -> usize {
        (**self).level_count()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        (**self).level_dimensions(level)
    }

    fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        (**self).tile_size(level)
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        (**self).level_downsample(level)
    }

    fn mpp(&self) -> Mpp {
        (**self).mpp()
    }

    fn pixel_type(&self) -> PixelType {
        (**self).pixel_type()
    }

    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn read_raw(
        &self,
        origin: (u32, u32),
        level: usize,
        size: (u32, u32),
    ) -> Result<Region, BackendError> {
        (**self).read_raw(origin, level, size)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

// =============================================================================
// Tests
// =============================================================================
