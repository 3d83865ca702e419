//! Tiled TIFF reader.
//!
//! Covers the TIFF-based slide formats: Aperio SVS, OME-TIFF and generic
//! pyramidal TIFF. Decoding is delegated to the `tiff` crate; this module only
//! decides which IFDs form the pyramid and assembles requested blocks from the
//! tiles that overlap them.
//!
//! # Series and pyramid levels
//!
//! A slide TIFF mixes pyramid levels with associated images (label, macro,
//! thumbnail). IFDs are grouped into series, walking them in file order:
//!
//! 1. a tiled IFD joins the first tiled series with its sample layout, an
//!    aspect ratio within 10% and no level of the same area
//! 2. any other tiled IFD starts a new series
//! 3. each strip IFD is a single-level series of its own
//!
//! Levels within a series are sorted by area, largest first (level 0). Tiled
//! series come first, so series 0 of a slide is its main pyramid; strip
//! series (thumbnail, label, macro) follow in file order.

use std::cell::RefCell;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::{ColorType, TiffError};
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::region::{PixelBuffer, PixelData, PixelType, Region};
use crate::slide::{Mpp, SlideReader};

use super::metadata::slide_mpp;

/// Maximum relative aspect ratio difference between a level and level 0.
const ASPECT_RATIO_TOLERANCE: f64 = 0.1;

/// `SampleFormat` value for IEEE floating point samples.
const SAMPLE_FORMAT_FLOAT: u32 = 3;

type TiffDecoder = Decoder<BufReader<File>>;

// =============================================================================
// Level Layout
// =============================================================================

/// Channel count and component type shared by all levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SampleLayout {
    channels: usize,
    pixel_type: PixelType,
}

impl SampleLayout {
    fn from_color_type(color_type: ColorType, float: bool) -> Option<Self> {
        let (channels, bits) = match color_type {
            ColorType::Gray(bits) => (1, bits),
            ColorType::GrayA(bits) => (2, bits),
            ColorType::RGB(bits) => (3, bits),
            ColorType::RGBA(bits) => (4, bits),
            _ => return None,
        };
        let pixel_type = match (bits, float) {
            (8, false) => PixelType::U8,
            (16, false) => PixelType::U16,
            (32, true) => PixelType::F32,
            _ => return None,
        };
        Some(Self {
            channels,
            pixel_type,
        })
    }
}

/// `ResolutionUnit`, `XResolution` and `YResolution` of one IFD.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Resolution {
    unit: Option<u32>,
    x: Option<f64>,
    y: Option<f64>,
}

/// One image file directory as seen during the scan.
#[derive(Debug, Clone, Copy)]
struct IfdSummary {
    index: usize,
    width: u32,
    height: u32,
    layout: Option<SampleLayout>,
    tiled: bool,
    chunk: (u32, u32),
    resolution: Resolution,
}

impl IfdSummary {
    fn usable(&self) -> bool {
        self.layout.is_some() && self.width > 0 && self.height > 0
    }

    fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    fn aspect_ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height.max(1))
    }
}

/// A pyramid level backed by one IFD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TiffLevel {
    ifd: usize,
    width: u32,
    height: u32,
    chunk_width: u32,
    chunk_height: u32,
}

impl TiffLevel {
    fn from_summary(summary: &IfdSummary) -> Self {
        Self {
            ifd: summary.index,
            width: summary.width,
            height: summary.height,
            chunk_width: summary.chunk.0.max(1),
            chunk_height: summary.chunk.1.max(1),
        }
    }

    fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    fn chunks_across(&self) -> u32 {
        self.width.div_ceil(self.chunk_width)
    }
}

/// IFDs forming one image: a pyramid, or a single associated image.
#[derive(Debug, Clone, PartialEq)]
struct Series {
    levels: Vec<TiffLevel>,
    layout: SampleLayout,
    tiled: bool,
    aspect_ratio: f64,
}

impl Series {
    fn new(summary: &IfdSummary, layout: SampleLayout) -> Self {
        Self {
            levels: vec![TiffLevel::from_summary(summary)],
            layout,
            tiled: summary.tiled,
            aspect_ratio: summary.aspect_ratio(),
        }
    }

    /// Whether `summary` is another resolution of this series.
    fn accepts(&self, summary: &IfdSummary) -> bool {
        self.tiled
            && summary.tiled
            && summary.layout == Some(self.layout)
            && (summary.aspect_ratio() / self.aspect_ratio - 1.0).abs() <= ASPECT_RATIO_TOLERANCE
            && self.levels.iter().all(|l| l.area() != summary.area())
    }

    /// IFD backing level 0.
    fn base_ifd(&self) -> usize {
        self.levels[0].ifd
    }
}

/// Group the scanned IFDs into series, main pyramid first.
fn group_series(summaries: &[IfdSummary]) -> Result<Vec<Series>, BackendError> {
    let mut tiled: Vec<Series> = Vec::new();
    let mut strips: Vec<Series> = Vec::new();

    for summary in summaries.iter().filter(|s| s.usable()) {
        let Some(layout) = summary.layout else {
            continue;
        };
        if !summary.tiled {
            strips.push(Series::new(summary, layout));
            continue;
        }
        match tiled.iter_mut().find(|series| series.accepts(summary)) {
            Some(series) => series.levels.push(TiffLevel::from_summary(summary)),
            None => tiled.push(Series::new(summary, layout)),
        }
    }

    if tiled.is_empty() {
        let first = strips.first().ok_or_else(|| {
            BackendError::Unsupported("no image with a supported sample layout".to_string())
        })?;
        warn!(
            width = first.levels[0].width,
            height = first.levels[0].height,
            "TIFF has no tiled images, reading images by strips"
        );
    }

    for series in &mut tiled {
        series.levels.sort_by_key(|l| std::cmp::Reverse(l.area()));
    }
    tiled.extend(strips);
    Ok(tiled)
}

// =============================================================================
// TIFF Reader
// =============================================================================

/// Reader for tiled (pyramidal) TIFF files.
///
/// A reader exposes one series of the file; series 0 is the main pyramid.
pub struct TiffReader {
    path: PathBuf,
    decoder: RefCell<Option<TiffDecoder>>,
    series: usize,
    series_count: usize,
    levels: Vec<TiffLevel>,
    layout: SampleLayout,
    mpp: Mpp,
}

impl TiffReader {
    /// Open the main pyramid (series 0) of a TIFF file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        Self::open_series(path, 0)
    }

    /// Open one series of a TIFF file.
    ///
    /// Fails with [`BackendError::Metadata`] if the file has fewer series.
    pub fn open_series(path: impl AsRef<Path>, series: usize) -> Result<Self, BackendError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| BackendError::Io(format!("{}: {}", path.display(), e)))?;
        let mut decoder = Decoder::new(BufReader::new(file)).map_err(tiff_error)?;

        let mut summaries = Vec::new();
        let mut descriptions = Vec::new();
        loop {
            let index = summaries.len();
            summaries.push(summarize_ifd(&mut decoder, index)?);
            descriptions.push(decoder.get_tag_ascii_string(Tag::ImageDescription).ok());
            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(tiff_error)?;
        }

        let mut all_series = group_series(&summaries)?;
        let series_count = all_series.len();
        if series >= series_count {
            return Err(BackendError::Metadata(format!(
                "series {} not found, {} has {}",
                series,
                path.display(),
                series_count
            )));
        }
        let selected = all_series.swap_remove(series);

        // OME-XML lives in the first IFD only
        let base = selected.base_ifd();
        let description = descriptions[base]
            .as_deref()
            .or(descriptions[0].as_deref());
        let resolution = summaries[base].resolution;
        let mpp = slide_mpp(
            description,
            series,
            resolution.unit,
            resolution.x,
            resolution.y,
        );

        debug!(
            path = %path.display(),
            ifds = summaries.len(),
            series,
            series_count,
            levels = selected.levels.len(),
            channels = selected.layout.channels,
            pixel_type = selected.layout.pixel_type.name(),
            "opened TIFF slide"
        );

        Ok(Self {
            path,
            decoder: RefCell::new(Some(decoder)),
            series,
            series_count,
            levels: selected.levels,
            layout: selected.layout,
            mpp,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index of the series this reader exposes.
    pub fn series(&self) -> usize {
        self.series
    }

    /// Number of series found in the file.
    pub fn series_count(&self) -> usize {
        self.series_count
    }

    /// IFD index backing a level.
    pub fn level_ifd(&self, level: usize) -> Option<usize> {
        self.levels.get(level).map(|l| l.ifd)
    }
}

impl fmt::Debug for TiffReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiffReader")
            .field("path", &self.path)
            .field("series", &self.series)
            .field("levels", &self.levels)
            .field("layout", &self.layout)
            .field("mpp", &self.mpp)
            .finish()
    }
}

impl SlideReader for TiffReader {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| (l.width, l.height))
    }

    fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        self.levels
            .get(level)
            .map(|l| (l.chunk_width, l.chunk_height))
    }

    fn mpp(&self) -> Mpp {
        self.mpp
    }

    fn pixel_type(&self) -> PixelType {
        self.layout.pixel_type
    }

    fn channel_count(&self) -> usize {
        self.layout.channels
    }

    fn read_raw(
        &self,
        origin: (u32, u32),
        level: usize,
        size: (u32, u32),
    ) -> Result<Region, BackendError> {
        let mut guard = self.decoder.borrow_mut();
        let decoder = guard.as_mut().ok_or(BackendError::Closed)?;

        let out_of_range = |bounds| BackendError::OutOfRange {
            level,
            origin,
            size,
            bounds,
        };
        let info = *self.levels.get(level).ok_or(out_of_range((0, 0)))?;
        let fits_x = u64::from(origin.0) + u64::from(size.0) <= u64::from(info.width);
        let fits_y = u64::from(origin.1) + u64::from(size.1) <= u64::from(info.height);
        if !fits_x || !fits_y {
            return Err(out_of_range((info.width, info.height)));
        }

        let channels = self.layout.channels;
        let len = size.0 as usize * size.1 as usize * channels;
        let mut out = PixelData::zeros(self.layout.pixel_type, len);
        if len == 0 {
            return Ok(Region::opaque(PixelBuffer::new(size.0, size.1, channels, out)?));
        }

        decoder.seek_to_image(info.ifd).map_err(tiff_error)?;

        let first_cx = origin.0 / info.chunk_width;
        let last_cx = (origin.0 + size.0 - 1) / info.chunk_width;
        let first_cy = origin.1 / info.chunk_height;
        let last_cy = (origin.1 + size.1 - 1) / info.chunk_height;

        for cy in first_cy..=last_cy {
            for cx in first_cx..=last_cx {
                let index = cy * info.chunks_across() + cx;
                let chunk = decoder.read_chunk(index).map_err(tiff_error)?;
                let (data_width, data_height) = decoder.chunk_data_dimensions(index);
                let blit = Blit {
                    chunk_origin: (cx * info.chunk_width, cy * info.chunk_height),
                    chunk_size: (info.chunk_width, info.chunk_height),
                    data_size: (data_width, data_height),
                    origin,
                    size,
                    channels,
                };
                match (&mut out, chunk) {
                    (PixelData::U8(dst), DecodingResult::U8(src)) => blit.copy(dst, &src)?,
                    (PixelData::U16(dst), DecodingResult::U16(src)) => blit.copy(dst, &src)?,
                    (PixelData::F32(dst), DecodingResult::F32(src)) => blit.copy(dst, &src)?,
                    (dst, _) => {
                        return Err(BackendError::Decode(format!(
                            "chunk {} of IFD {} does not decode to {} samples",
                            index,
                            info.ifd,
                            dst.pixel_type().name()
                        )))
                    }
                }
            }
        }

        Ok(Region::opaque(PixelBuffer::new(
            size.0, size.1, channels, out,
        )?))
    }

    fn close(&mut self) {
        if self.decoder.get_mut().take().is_some() {
            debug!(path = %self.path.display(), "closed TIFF slide");
        }
        self.levels.clear();
    }
}

// =============================================================================
// Chunk Assembly
// =============================================================================

/// Placement of one decoded chunk relative to the requested block.
#[derive(Debug, Clone, Copy)]
struct Blit {
    chunk_origin: (u32, u32),
    chunk_size: (u32, u32),
    data_size: (u32, u32),
    origin: (u32, u32),
    size: (u32, u32),
    channels: usize,
}

impl Blit {
    /// Copy the overlap of the chunk and the requested block into `dst`.
    fn copy<T: Copy>(&self, dst: &mut [T], src: &[T]) -> Result<(), BackendError> {
        let c = self.channels;
        let x0 = self.origin.0.max(self.chunk_origin.0);
        let x1 = (self.origin.0 + self.size.0).min(self.chunk_origin.0 + self.data_size.0);
        let y0 = self.origin.1.max(self.chunk_origin.1);
        let y1 = (self.origin.1 + self.size.1).min(self.chunk_origin.1 + self.data_size.1);
        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }

        // Edge chunks come back either padded to the full chunk or clipped
        let padded_len = self.chunk_size.0 as usize * self.chunk_size.1 as usize * c;
        let stride = if src.len() >= padded_len {
            self.chunk_size.0 as usize
        } else {
            self.data_size.0 as usize
        };

        let row_len = (x1 - x0) as usize * c;
        for y in y0..y1 {
            let src_row = (y - self.chunk_origin.1) as usize * stride;
            let src_start = (src_row + (x0 - self.chunk_origin.0) as usize) * c;
            let dst_row = (y - self.origin.1) as usize * self.size.0 as usize;
            let dst_start = (dst_row + (x0 - self.origin.0) as usize) * c;

            let src_slice = src.get(src_start..src_start + row_len).ok_or_else(|| {
                BackendError::Decode(format!(
                    "chunk holds {} samples, row {} needs {}",
                    src.len(),
                    y,
                    src_start + row_len
                ))
            })?;
            let dst_slice = dst.get_mut(dst_start..dst_start + row_len).ok_or_else(|| {
                BackendError::Decode("output block smaller than requested".to_string())
            })?;
            dst_slice.copy_from_slice(src_slice);
        }
        Ok(())
    }
}

// =============================================================================
// IFD Scanning
// =============================================================================

fn summarize_ifd(decoder: &mut TiffDecoder, index: usize) -> Result<IfdSummary, BackendError> {
    let (width, height) = decoder.dimensions().map_err(tiff_error)?;
    let tiled = decoder
        .find_tag(Tag::TileWidth)
        .map_err(tiff_error)?
        .is_some();
    let float = first_u32(decoder, Tag::SampleFormat) == Some(SAMPLE_FORMAT_FLOAT);
    let layout = match decoder.colortype() {
        Ok(color_type) => {
            let layout = SampleLayout::from_color_type(color_type, float);
            if layout.is_none() {
                debug!(index, ?color_type, "skipping IFD with unsupported layout");
            }
            layout
        }
        Err(e) => {
            debug!(index, error = %e, "skipping IFD without a color type");
            None
        }
    };

    Ok(IfdSummary {
        index,
        width,
        height,
        layout,
        tiled,
        chunk: decoder.chunk_dimensions(),
        resolution: Resolution {
            unit: first_u32(decoder, Tag::ResolutionUnit),
            x: rational(decoder, Tag::XResolution),
            y: rational(decoder, Tag::YResolution),
        },
    })
}

fn first_u32(decoder: &mut TiffDecoder, tag: Tag) -> Option<u32> {
    let value = decoder.find_tag(tag).ok().flatten()?;
    value.into_u32_vec().ok()?.first().copied()
}

fn rational(decoder: &mut TiffDecoder, tag: Tag) -> Option<f64> {
    match decoder.find_tag(tag).ok().flatten()? {
        Value::Rational(_, 0) => None,
        Value::Rational(n, d) => Some(f64::from(n) / f64::from(d)),
        other => other.into_f64().ok(),
    }
}

fn tiff_error(err: TiffError) -> BackendError {
    match err {
        TiffError::IoError(e) => BackendError::Io(e.to_string()),
        TiffError::UnsupportedError(e) => BackendError::Unsupported(e.to_string()),
        other => BackendError::Decode(other.to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================
