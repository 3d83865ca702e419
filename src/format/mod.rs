//! Format backends for Whole Slide Image files.
//!
//! Each backend implements [`SlideReader`](crate::slide::SlideReader):
//!
//! - [`TiffReader`]: tiled TIFF (Aperio SVS, OME-TIFF, generic pyramidal TIFF)
//! - `OpenSlideReader`: vendor formats through libopenslide (feature `openslide`)
//! - [`MemoryReader`]: pyramids already decoded into memory
//!
//! # Format Detection
//!
//! Use [`detect_format`] to pick the backend for a file on disk, or
//! [`open_slide`](crate::slide::open_slide) to detect and open in one step.

pub mod detect;
pub mod metadata;

mod memory;
#[cfg(feature = "openslide")]
mod openslide;
mod tiff;

pub use detect::{detect_format, is_tiff_header, SlideFormat};
pub use memory::MemoryReader;
#[cfg(feature = "openslide")]
pub use openslide::OpenSlideReader;
pub use tiff::TiffReader;
