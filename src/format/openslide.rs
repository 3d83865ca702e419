//! OpenSlide-backed reader.
//!
//! Used for vendor formats that are not TIFF based (MIRAX, Aperio SVSlide).
//! OpenSlide returns premultiplied RGBA; fully transparent pixels are where
//! the scanner recorded nothing, so alpha doubles as the validity mask.

use std::path::{Path, PathBuf};

use openslide_rs::{Address, OpenSlide, Region as OsRegion, Size};
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::region::{PixelBuffer, PixelData, PixelType, Region, ValidityMask};
use crate::slide::{Mpp, SlideReader};

/// Tile size reported when OpenSlide has no tile-size property for a level.
const DEFAULT_TILE_SIZE: u32 = 256;

#[derive(Debug, Clone, Copy)]
struct OsLevel {
    width: u32,
    height: u32,
    tile: (u32, u32),
    downsample: f64,
}

/// Reader over a native OpenSlide handle.
pub struct OpenSlideReader {
    path: PathBuf,
    slide: Option<OpenSlide>,
    levels: Vec<OsLevel>,
    mpp: Mpp,
}

impl OpenSlideReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref().to_path_buf();
        let slide = OpenSlide::new(&path)
            .map_err(|e| BackendError::Native(format!("{}: {}", path.display(), e)))?;

        let level_count = slide
            .get_level_count()
            .map_err(|e| BackendError::Native(e.to_string()))?;
        let mut levels = Vec::with_capacity(level_count as usize);
        for level in 0..level_count {
            let dims = slide
                .get_level_dimensions(level)
                .map_err(|e| BackendError::Native(e.to_string()))?;
            let downsample = slide
                .get_level_downsample(level)
                .map_err(|e| BackendError::Native(e.to_string()))?;
            levels.push(OsLevel {
                width: dims.w,
                height: dims.h,
                tile: tile_size(&slide, level),
                downsample,
            });
        }

        let mpp = Mpp::new(
            float_property(&slide, "openslide.mpp-x"),
            float_property(&slide, "openslide.mpp-y"),
        );
        debug!(path = %path.display(), levels = levels.len(), "opened OpenSlide slide");

        Ok(Self {
            path,
            slide: Some(slide),
            levels,
            mpp,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn float_property(slide: &OpenSlide, name: &str) -> Option<f64> {
    slide.get_property_value(name).ok()?.parse().ok()
}

fn tile_size(slide: &OpenSlide, level: u32) -> (u32, u32) {
    let width = float_property(slide, &format!("openslide.level[{}].tile-width", level));
    let height = float_property(slide, &format!("openslide.level[{}].tile-height", level));
    match (width, height) {
        (Some(w), Some(h)) if w >= 1.0 && h >= 1.0 => (w as u32, h as u32),
        _ => {
            warn!(level, "no tile size property, assuming {}", DEFAULT_TILE_SIZE);
            (DEFAULT_TILE_SIZE, DEFAULT_TILE_SIZE)
        }
    }
}

impl SlideReader for OpenSlideReader {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| (l.width, l.height))
    }

    fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| l.tile)
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(|l| l.downsample)
    }

    fn mpp(&self) -> Mpp {
        self.mpp
    }

    fn pixel_type(&self) -> PixelType {
        PixelType::U8
    }

    fn channel_count(&self) -> usize {
        3
    }

    fn read_raw(
        &self,
        origin: (u32, u32),
        level: usize,
        size: (u32, u32),
    ) -> Result<Region, BackendError> {
        let slide = self.slide.as_ref().ok_or(BackendError::Closed)?;
        let info = self.levels.get(level).ok_or(BackendError::OutOfRange {
            level,
            origin,
            size,
            bounds: (0, 0),
        })?;

        // OpenSlide addresses regions in level-0 coordinates
        let address = Address {
            x: (f64::from(origin.0) * info.downsample).round() as u32,
            y: (f64::from(origin.1) * info.downsample).round() as u32,
        };
        let request = OsRegion {
            address,
            level: level as u32,
            size: Size {
                w: size.0,
                h: size.1,
            },
        };
        let rgba = slide
            .read_image_rgba(&request)
            .map_err(|e| BackendError::Native(e.to_string()))?;
        let actual = (rgba.width(), rgba.height());
        if actual != size {
            return Err(BackendError::ShapeMismatch {
                expected: size,
                actual,
            });
        }

        let raw = rgba.into_raw();
        let mut pixels = Vec::with_capacity(raw.len() / 4 * 3);
        let mut mask = Vec::with_capacity(raw.len() / 4);
        for px in raw.chunks_exact(4) {
            pixels.extend_from_slice(&px[..3]);
            mask.push(px[3] > 0);
        }

        Region::new(
            PixelBuffer::new(size.0, size.1, 3, PixelData::U8(pixels))?,
            ValidityMask::new(size.0, size.1, mask)?,
        )
    }

    fn close(&mut self) {
        if self.slide.take().is_some() {
            debug!(path = %self.path.display(), "closed OpenSlide slide");
        }
    }
}
