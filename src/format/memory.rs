//! In-memory slide reader.
//!
//! Holds every pyramid level as a decoded [`PixelBuffer`]. Useful when pixels
//! are already decoded (e.g. produced by another pipeline) and as a reference
//! backend in tests.

use crate::error::BackendError;
use crate::region::{resize_pixels, PixelBuffer, PixelType, Region};
use crate::slide::{Mpp, SlideReader};

/// Reader over decoded pyramid levels.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    levels: Vec<PixelBuffer>,
    tile_size: (u32, u32),
    mpp: Mpp,
    channels: usize,
    pixel_type: PixelType,
    closed: bool,
}

impl MemoryReader {
    /// Build a reader from explicit levels, full resolution first.
    ///
    /// All levels must share channel count and pixel type.
    pub fn new(levels: Vec<PixelBuffer>, tile_size: (u32, u32)) -> Result<Self, BackendError> {
        let first = levels
            .first()
            .ok_or_else(|| BackendError::Metadata("no pyramid levels given".to_string()))?;
        let channels = first.channels();
        let pixel_type = first.pixel_type();

        for (index, level) in levels.iter().enumerate() {
            if level.channels() != channels || level.pixel_type() != pixel_type {
                return Err(BackendError::Metadata(format!(
                    "level {} has {} {} channels, level 0 has {} {} channels",
                    index,
                    level.channels(),
                    level.pixel_type().name(),
                    channels,
                    pixel_type.name()
                )));
            }
        }
        if tile_size.0 == 0 || tile_size.1 == 0 {
            return Err(BackendError::Metadata(format!(
                "tile size must be positive, got {}x{}",
                tile_size.0, tile_size.1
            )));
        }

        Ok(Self {
            levels,
            tile_size,
            mpp: Mpp::unknown(),
            channels,
            pixel_type,
            closed: false,
        })
    }

    /// Build a pyramid by halving `base` until `level_count` levels exist.
    pub fn pyramid(
        base: PixelBuffer,
        level_count: usize,
        tile_size: (u32, u32),
    ) -> Result<Self, BackendError> {
        if level_count == 0 {
            return Err(BackendError::Metadata(
                "pyramid needs at least one level".to_string(),
            ));
        }
        let mut levels = Vec::with_capacity(level_count);
        levels.push(base);
        while levels.len() < level_count {
            let Some(previous) = levels.last() else {
                break;
            };
            let width = (previous.width() / 2).max(1);
            let height = (previous.height() / 2).max(1);
            let next = resize_pixels(previous, width, height);
            levels.push(next);
        }
        Self::new(levels, tile_size)
    }

    pub fn with_mpp(mut self, mpp: Mpp) -> Self {
        self.mpp = mpp;
        self
    }

    /// Decoded pixels of one level.
    pub fn level(&self, level: usize) -> Option<&PixelBuffer> {
        self.levels.get(level)
    }
}

impl SlideReader for MemoryReader {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(PixelBuffer::dimensions)
    }

    fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        (level < self.levels.len()).then_some(self.tile_size)
    }

    fn mpp(&self) -> Mpp {
        self.mpp
    }

    fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn read_raw(
        &self,
        origin: (u32, u32),
        level: usize,
        size: (u32, u32),
    ) -> Result<Region, BackendError> {
        if self.closed {
            return Err(BackendError::Closed);
        }
        let out_of_range = |bounds| BackendError::OutOfRange {
            level,
            origin,
            size,
            bounds,
        };
        let buffer = self.levels.get(level).ok_or(out_of_range((0, 0)))?;
        let (width, height) = buffer.dimensions();
        let fits_x = u64::from(origin.0) + u64::from(size.0) <= u64::from(width);
        let fits_y = u64::from(origin.1) + u64::from(size.1) <= u64::from(height);
        if !fits_x || !fits_y {
            return Err(out_of_range((width, height)));
        }

        Ok(Region::opaque(
            buffer.crop(origin.0, origin.1, size.0, size.1),
        ))
    }

    fn close(&mut self) {
        self.levels.clear();
        self.closed = true;
    }
}

// =============================================================================
// Tests
// =============================================================================
