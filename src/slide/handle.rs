//! The `Slide` façade.
//!
//! A [`Slide`] wraps one [`SlideReader`] and turns arbitrary caller requests
//! into at most one in-bounds `read_raw` call:
//!
//! 1. validate arguments (level, size, downsample)
//! 2. pick the fetch level, possibly level 0 when synthesizing a downsample
//! 3. clip the request per axis against the fetch level bounds
//! 4. fetch, shrink back when synthesizing, normalize if asked
//! 5. pad with zeros / invalid mask so the output has the requested size
//!
//! Level metadata is read from the reader on first use and memoized until the
//! slide is closed.

use std::cell::OnceCell;

use serde::Serialize;
use tracing::debug;

use crate::error::{BackendError, SlideError};
use crate::region::{
    best_level_for_downsample, normalize_region, resize_region, PixelType, Region, RegionSize,
    Span,
};

use super::reader::{Mpp, SlideReader};

// =============================================================================
// Read Options
// =============================================================================

/// Options shared by the region read operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Rescale integer pixels by 1/255 into `f32`.
    pub normalize: bool,

    /// Build lower resolutions from level 0 instead of reading the pyramid.
    pub force_level_0_downsample: bool,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_level_0_downsample(mut self, force: bool) -> Self {
        self.force_level_0_downsample = force;
        self
    }
}

// =============================================================================
// Slide Summary
// =============================================================================

/// Serializable snapshot of slide metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideInfo {
    pub level_count: usize,
    pub level_dimensions: Vec<(u32, u32)>,
    pub tile_dimensions: Vec<(u32, u32)>,
    pub level_downsamples: Vec<f64>,
    pub mpp: Mpp,
    pub pixel_type: PixelType,
    pub channels: usize,
}

// =============================================================================
// Slide
// =============================================================================

/// A whole-slide image opened through some [`SlideReader`].
///
/// Dropping the slide closes the reader. `Slide` is `Send` when its reader is,
/// but never `Sync`: use one handle per thread.
pub struct Slide<R: SlideReader> {
    reader: R,
    closed: bool,
    level_dimensions: OnceCell<Vec<(u32, u32)>>,
    tile_dimensions: OnceCell<Vec<(u32, u32)>>,
    level_downsamples: OnceCell<Vec<f64>>,
}

impl<R: SlideReader> Slide<R> {
    /// Wrap a reader, checking that its metadata describes a usable pyramid.
    pub fn new(reader: R) -> Result<Self, SlideError> {
        let level_count = reader.level_count();
        if level_count == 0 {
            return Err(BackendError::Metadata("slide has no pyramid levels".to_string()).into());
        }
        for level in 0..level_count {
            match reader.level_dimensions(level) {
                Some((w, h)) if w > 0 && h > 0 => {}
                Some((w, h)) => {
                    return Err(BackendError::Metadata(format!(
                        "level {} has empty dimensions {}x{}",
                        level, w, h
                    ))
                    .into())
                }
                None => {
                    return Err(BackendError::Metadata(format!(
                        "missing dimensions for level {}",
                        level
                    ))
                    .into())
                }
            }
            if reader.tile_size(level).is_none() {
                return Err(
                    BackendError::Metadata(format!("missing tile size for level {}", level)).into(),
                );
            }
        }
        if reader.channel_count() == 0 {
            return Err(BackendError::Metadata("slide has no channels".to_string()).into());
        }

        Ok(Self {
            reader,
            closed: false,
            level_dimensions: OnceCell::new(),
            tile_dimensions: OnceCell::new(),
            level_downsamples: OnceCell::new(),
        })
    }

    /// The underlying reader.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the reader and drop memoized metadata. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.reader.close();
        self.level_dimensions.take();
        self.tile_dimensions.take();
        self.level_downsamples.take();
        self.closed = true;
        debug!("slide closed");
    }

    fn ensure_open(&self) -> Result<(), SlideError> {
        if self.closed {
            Err(SlideError::Closed)
        } else {
            Ok(())
        }
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    pub fn level_count(&self) -> Result<usize, SlideError> {
        self.ensure_open()?;
        Ok(self.reader.level_count())
    }

    /// `(width, height)` of every level, full resolution first.
    pub fn level_dimensions(&self) -> Result<&[(u32, u32)], SlideError> {
        self.ensure_open()?;
        if let Some(dims) = self.level_dimensions.get() {
            return Ok(dims);
        }
        let dims = (0..self.reader.level_count())
            .map(|level| {
                self.reader.level_dimensions(level).ok_or_else(|| {
                    BackendError::Metadata(format!("missing dimensions for level {}", level))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.level_dimensions.get_or_init(|| dims))
    }

    /// `(width, height)` of level 0.
    pub fn dimensions(&self) -> Result<(u32, u32), SlideError> {
        let dims = self.level_dimensions()?;
        dims.first()
            .copied()
            .ok_or_else(|| BackendError::Metadata("slide has no pyramid levels".to_string()).into())
    }

    /// Tile `(width, height)` of every level.
    pub fn tile_dimensions(&self) -> Result<&[(u32, u32)], SlideError> {
        self.ensure_open()?;
        if let Some(tiles) = self.tile_dimensions.get() {
            return Ok(tiles);
        }
        let tiles = (0..self.reader.level_count())
            .map(|level| {
                self.reader.tile_size(level).ok_or_else(|| {
                    BackendError::Metadata(format!("missing tile size for level {}", level))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.tile_dimensions.get_or_init(|| tiles))
    }

    /// Downsample of every level relative to level 0.
    ///
    /// Uses the reader's native values when it has one for every level,
    /// otherwise `round(width_0 / width_level)`.
    pub fn level_downsamples(&self) -> Result<&[f64], SlideError> {
        self.ensure_open()?;
        if let Some(downsamples) = self.level_downsamples.get() {
            return Ok(downsamples);
        }
        let level_count = self.reader.level_count();
        let native: Option<Vec<f64>> = (0..level_count)
            .map(|level| self.reader.level_downsample(level))
            .collect();
        let downsamples = match native {
            Some(native) => native,
            None => {
                let dims = self.level_dimensions()?;
                let base_width = f64::from(dims[0].0);
                dims.iter()
                    .map(|&(width, _)| (base_width / f64::from(width)).round_ties_even())
                    .collect()
            }
        };
        Ok(self.level_downsamples.get_or_init(|| downsamples))
    }

    pub fn mpp(&self) -> Result<Mpp, SlideError> {
        self.ensure_open()?;
        Ok(self.reader.mpp())
    }

    pub fn pixel_type(&self) -> Result<PixelType, SlideError> {
        self.ensure_open()?;
        Ok(self.reader.pixel_type())
    }

    pub fn channel_count(&self) -> Result<usize, SlideError> {
        self.ensure_open()?;
        Ok(self.reader.channel_count())
    }

    /// Snapshot of all metadata.
    pub fn info(&self) -> Result<SlideInfo, SlideError> {
        Ok(SlideInfo {
            level_count: self.level_count()?,
            level_dimensions: self.level_dimensions()?.to_vec(),
            tile_dimensions: self.tile_dimensions()?.to_vec(),
            level_downsamples: self.level_downsamples()?.to_vec(),
            mpp: self.mpp()?,
            pixel_type: self.pixel_type()?,
            channels: self.channel_count()?,
        })
    }

    // -------------------------------------------------------------------------
    // Derived helpers
    // -------------------------------------------------------------------------

    /// Level to read for a target downsample factor.
    pub fn best_level_for_downsample(&self, downsample: f64) -> Result<usize, SlideError> {
        Ok(best_level_for_downsample(
            self.level_downsamples()?,
            downsample,
        ))
    }

    /// Slide dimensions at an arbitrary downsample factor.
    ///
    /// A factor that matches a pyramid level returns that level's stored
    /// dimensions; anything else is computed from level 0.
    pub fn dimensions_for_downsample(&self, downsample: f64) -> Result<(u32, u32), SlideError> {
        check_downsample(downsample)?;
        let downsamples = self.level_downsamples()?;
        let dims = self.level_dimensions()?;
        if let Some(level) = downsamples.iter().position(|&ds| ds == downsample) {
            return Ok(dims[level]);
        }
        let (width, height) = dims[0];
        Ok((
            (f64::from(width) / downsample).round_ties_even() as u32,
            (f64::from(height) / downsample).round_ties_even() as u32,
        ))
    }

    // -------------------------------------------------------------------------
    // Region reads
    // -------------------------------------------------------------------------

    /// Read a region at a pyramid level.
    ///
    /// `origin` and `size` are in the frame of `level`. The origin may be
    /// negative and the region may extend past the level; uncovered pixels
    /// are zero and marked invalid in the mask.
    pub fn read_region(
        &self,
        origin: (i64, i64),
        level: usize,
        size: impl Into<RegionSize>,
        options: ReadOptions,
    ) -> Result<Region, SlideError> {
        self.ensure_open()?;
        let size = check_size(size.into())?;
        let level_count = self.reader.level_count();
        if level >= level_count {
            return Err(SlideError::InvalidLevel { level, level_count });
        }

        let dims = self.level_dimensions()?;
        let synthesize = options.force_level_0_downsample && level > 0;
        let (fetch_level, factor) = if synthesize {
            let ratio = f64::from(dims[0].0) / f64::from(dims[level].0);
            (0, ratio.round_ties_even().max(1.0) as i64)
        } else {
            (level, 1)
        };

        let requested_x = Span::new(origin.0, i64::from(size.width));
        let requested_y = Span::new(origin.1, i64::from(size.height));
        let (bound_w, bound_h) = dims[fetch_level];
        let fetch_x = requested_x.scale(factor).clip(bound_w);
        let fetch_y = requested_y.scale(factor).clip(bound_h);

        if fetch_x.is_empty() || fetch_y.is_empty() {
            debug!(
                level,
                x = origin.0,
                y = origin.1,
                width = size.width,
                height = size.height,
                "region lies outside the slide"
            );
            return Ok(self.blank(size, options.normalize));
        }

        let fetch_size = (to_u32(fetch_x.len), to_u32(fetch_y.len));
        let raw = self.reader.read_raw(
            (to_u32(fetch_x.start), to_u32(fetch_y.start)),
            fetch_level,
            fetch_size,
        )?;
        if raw.dimensions() != fetch_size {
            return Err(BackendError::ShapeMismatch {
                expected: fetch_size,
                actual: raw.dimensions(),
            }
            .into());
        }

        let (valid_x, valid_y, block) = if factor > 1 {
            let valid_x = fetch_x.shrink(factor);
            let valid_y = fetch_y.shrink(factor);
            if valid_x.is_empty() || valid_y.is_empty() {
                return Ok(self.blank(size, options.normalize));
            }
            let block = resize_region(&raw, to_u32(valid_x.len), to_u32(valid_y.len));
            (valid_x, valid_y, block)
        } else {
            (fetch_x, fetch_y, raw)
        };

        let block = if options.normalize {
            normalize_region(block)
        } else {
            block
        };

        let (left, right) = valid_x.padding(requested_x);
        let (top, bottom) = valid_y.padding(requested_y);
        debug!(
            level,
            fetch_level,
            factor,
            fetch_x = fetch_x.start,
            fetch_y = fetch_y.start,
            fetch_width = fetch_x.len,
            fetch_height = fetch_y.len,
            left,
            top,
            right,
            bottom,
            "resolved region read"
        );

        Ok(block.pad(left, top, right, bottom))
    }

    /// Read a region at an arbitrary downsample factor.
    ///
    /// `origin` and `size` are in the frame of the downsampled slide. When no
    /// level matches the factor exactly, the nearest finer level is read and
    /// resampled to `size`.
    pub fn read_region_by_downsample(
        &self,
        origin: (i64, i64),
        downsample: f64,
        size: impl Into<RegionSize>,
        options: ReadOptions,
    ) -> Result<Region, SlideError> {
        self.ensure_open()?;
        check_downsample(downsample)?;
        let size = check_size(size.into())?;
        let force = options.force_level_0_downsample && downsample != 1.0;
        let raw_options = ReadOptions::new();
        let downsamples = self.level_downsamples()?;

        if !force {
            if let Some(level) = downsamples.iter().position(|&ds| ds == downsample) {
                let region = self.read_region(origin, level, size, raw_options)?;
                return Ok(finish(region, options.normalize));
            }
        }

        let level = if force {
            0
        } else {
            best_level_for_downsample(downsamples, downsample)
        };
        let ratio = downsample / downsamples[level];
        let level_origin = (scale_coord(origin.0, ratio), scale_coord(origin.1, ratio));
        let level_size = RegionSize::new(
            scale_extent(size.width, ratio),
            scale_extent(size.height, ratio),
        );
        debug!(
            downsample,
            level,
            ratio,
            width = level_size.width,
            height = level_size.height,
            "reading level for downsample"
        );

        let region = self.read_region(level_origin, level, level_size, raw_options)?;
        let region = resize_region(&region, size.width, size.height);
        Ok(finish(region, options.normalize))
    }

    /// The whole slide resampled to fit `dims`.
    ///
    /// The factor is `min(w0 / width, h0 / height)` and the output has
    /// [`dimensions_for_downsample`](Self::dimensions_for_downsample) at that
    /// factor.
    pub fn downsampled_slide(
        &self,
        dims: impl Into<RegionSize>,
        normalize: bool,
    ) -> Result<Region, SlideError> {
        self.ensure_open()?;
        let dims = check_size(dims.into())?;
        let (width, height) = self.dimensions()?;
        let downsample = (f64::from(width) / f64::from(dims.width))
            .min(f64::from(height) / f64::from(dims.height));
        let size = self.dimensions_for_downsample(downsample)?;
        self.read_region_by_downsample(
            (0, 0),
            downsample,
            size,
            ReadOptions::new().with_normalize(normalize),
        )
    }

    fn blank(&self, size: RegionSize, normalize: bool) -> Region {
        let region = Region::blank(size, self.reader.channel_count(), self.reader.pixel_type());
        finish(region, normalize)
    }
}

impl<R: SlideReader> Drop for Slide<R> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<R: SlideReader> std::fmt::Debug for Slide<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slide")
            .field("closed", &self.closed)
            .field("level_dimensions", &self.level_dimensions.get())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn check_size(size: RegionSize) -> Result<RegionSize, SlideError> {
    if size.is_empty() {
        return Err(SlideError::InvalidSize {
            width: size.width,
            height: size.height,
        });
    }
    Ok(size)
}

fn check_downsample(downsample: f64) -> Result<(), SlideError> {
    if downsample.is_finite() && downsample > 0.0 {
        Ok(())
    } else {
        Err(SlideError::InvalidDownsample { downsample })
    }
}

fn finish(region: Region, normalize: bool) -> Region {
    if normalize {
        normalize_region(region)
    } else {
        region
    }
}

fn scale_coord(value: i64, ratio: f64) -> i64 {
    (value as f64 * ratio).round_ties_even() as i64
}

/// `round(value * ratio)`, never below 1.
fn scale_extent(value: u32, ratio: f64) -> u32 {
    let scaled = (f64::from(value) * ratio).round_ties_even() as u32;
    scaled.max(1)
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

// =============================================================================
// Tests
// =============================================================================
