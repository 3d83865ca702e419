//! Slide abstraction layer.
//!
//! This module provides a unified interface for reading Whole Slide Images
//! regardless of their underlying format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Caller                  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │                Slide<R>                 │
//! │  (level choice, clipping, resampling)   │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideReader Trait             │
//! │  (metadata + raw in-bounds reads)       │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┼───────────┐
//!          ▼           ▼           ▼
//! ┌─────────────┐ ┌──────────┐ ┌────────────────┐
//! │ TiffReader  │ │ Memory   │ │ OpenSlide      │
//! │             │ │ Reader   │ │ Reader         │
//! └─────────────┘ └──────────┘ └────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use wsi_reader::slide::{open_slide, ReadOptions};
//!
//! let slide = open_slide("slide.svs")?;
//!
//! // 512x512 pixels at level 1, starting above and left of the slide
//! let region = slide.read_region((-64, -64), 1, 512, ReadOptions::new())?;
//! assert_eq!(region.dimensions(), (512, 512));
//!
//! // The same area at 3x downsample, normalized to [0, 1]
//! let options = ReadOptions::new().with_normalize(true);
//! let region = slide.read_region_by_downsample((0, 0), 3.0, (256, 128), options)?;
//! # Ok::<(), wsi_reader::SlideError>(())
//! ```

mod handle;
mod open;
mod reader;

pub use handle::{ReadOptions, Slide, SlideInfo};
pub use open::{open_slide, open_slide_series, DynSlide};
pub use reader::{Mpp, SlideReader};
