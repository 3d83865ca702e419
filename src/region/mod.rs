//! Region addressing and resampling.
//!
//! Everything in this module is backend-independent: it works on the pixel
//! buffers a [`SlideReader`](crate::slide::SlideReader) hands back and on the
//! geometry of a request.
//!
//! ```text
//! request (origin, level | downsample, size)
//!        │
//!        ▼
//! ┌──────────────────────┐
//! │  level selection     │  best_level_for_downsample
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │  clip per axis       │  Span::clip / scale / shrink
//! └──────────┬───────────┘
//!            ▼
//!     backend read_raw
//!            ▼
//! ┌──────────────────────┐
//! │  resample, normalize │  resize_region / normalize_region
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐
//! │  pad to request      │  Span::padding / Region::pad
//! └──────────────────────┘
//! ```

mod buffer;
mod geometry;
mod level;
mod resample;

pub use buffer::{PixelBuffer, PixelData, PixelType, Region, RegionSize, ValidityMask};
pub use geometry::Span;
pub use level::best_level_for_downsample;
pub use resample::{
    normalize, normalize_region, resize_mask, resize_pixels, resize_region, NORMALIZE_DIVISOR,
    RESAMPLE_FILTER,
};
