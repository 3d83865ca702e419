//! Pixel and validity buffers returned by region reads.
//!
//! Pixels are stored row-major with interleaved channels, i.e. a buffer of
//! shape `(height, width, channels)`. The validity mask is a `(height, width)`
//! boolean plane: `true` where the pixel is backed by slide data, `false`
//! where it is padding.

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};
use serde::Serialize;

use crate::error::BackendError;

// =============================================================================
// Pixel Type
// =============================================================================

/// Component type of slide pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    U8,
    U16,
    F32,
}

impl PixelType {
    /// Whether normalization rescales this type.
    pub const fn is_integer(&self) -> bool {
        matches!(self, PixelType::U8 | PixelType::U16)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            PixelType::U8 => "u8",
            PixelType::U16 => "u16",
            PixelType::F32 => "f32",
        }
    }
}

// =============================================================================
// Pixel Data
// =============================================================================

/// Typed sample storage.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl PixelData {
    /// All-zero storage of the given type and sample count.
    pub fn zeros(pixel_type: PixelType, len: usize) -> Self {
        match pixel_type {
            PixelType::U8 => PixelData::U8(vec![0; len]),
            PixelType::U16 => PixelData::U16(vec![0; len]),
            PixelType::F32 => PixelData::F32(vec![0.0; len]),
        }
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            PixelData::U8(_) => PixelType::U8,
            PixelData::U16(_) => PixelType::U16,
            PixelData::F32(_) => PixelType::F32,
        }
    }

    /// Number of samples (pixels times channels).
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::U16(v) => v.len(),
            PixelData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at a flat index, widened to `f64`.
    pub fn sample(&self, index: usize) -> Option<f64> {
        match self {
            PixelData::U8(v) => v.get(index).map(|&s| s as f64),
            PixelData::U16(v) => v.get(index).map(|&s| s as f64),
            PixelData::F32(v) => v.get(index).map(|&s| s as f64),
        }
    }
}

// =============================================================================
// Pixel Buffer
// =============================================================================

/// A `(height, width, channels)` block of pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: usize,
    data: PixelData,
}

impl PixelBuffer {
    /// Wrap interleaved sample data.
    ///
    /// Fails if `data` does not hold exactly `width * height * channels` samples
    /// or if `channels` is zero.
    pub fn new(
        width: u32,
        height: u32,
        channels: usize,
        data: PixelData,
    ) -> Result<Self, BackendError> {
        if channels == 0 {
            return Err(BackendError::Unsupported(
                "pixel buffer must have at least one channel".to_string(),
            ));
        }
        let expected = width as usize * height as usize * channels;
        if data.len() != expected {
            return Err(BackendError::Decode(format!(
                "pixel buffer holds {} samples, expected {} for {}x{}x{}",
                data.len(),
                expected,
                width,
                height,
                channels
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// A zero-filled buffer.
    pub fn zeros(width: u32, height: u32, channels: usize, pixel_type: PixelType) -> Self {
        let len = width as usize * height as usize * channels;
        Self {
            width,
            height,
            channels,
            data: PixelData::zeros(pixel_type, len),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Buffer shape in `(height, width, channels)` order.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, self.channels)
    }

    pub fn pixel_type(&self) -> PixelType {
        self.data.pixel_type()
    }

    pub fn data(&self) -> &PixelData {
        &self.data
    }

    pub fn into_data(self) -> PixelData {
        self.data
    }

    /// Sample at `(x, y, channel)`, widened to `f64`.
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> Option<f64> {
        if x >= self.width || y >= self.height || channel >= self.channels {
            return None;
        }
        let index = (y as usize * self.width as usize + x as usize) * self.channels + channel;
        self.data.sample(index)
    }

    /// Copy out the `width x height` block at `(x, y)`.
    ///
    /// The block must lie within the buffer.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let frame = Frame::new(self.width, self.height, self.channels);
        let data = match &self.data {
            PixelData::U8(v) => PixelData::U8(frame.crop(v, x, y, width, height)),
            PixelData::U16(v) => PixelData::U16(frame.crop(v, x, y, width, height)),
            PixelData::F32(v) => PixelData::F32(frame.crop(v, x, y, width, height)),
        };
        Self {
            width,
            height,
            channels: self.channels,
            data,
        }
    }

    /// Surround the buffer with zero pixels.
    pub fn pad(&self, left: u32, top: u32, right: u32, bottom: u32) -> Self {
        let frame = Frame::new(self.width, self.height, self.channels);
        let edges = Edges {
            left,
            top,
            right,
            bottom,
        };
        let data = match &self.data {
            PixelData::U8(v) => PixelData::U8(frame.pad(v, edges, 0)),
            PixelData::U16(v) => PixelData::U16(frame.pad(v, edges, 0)),
            PixelData::F32(v) => PixelData::F32(frame.pad(v, edges, 0.0)),
        };
        Self {
            width: self.width + left + right,
            height: self.height + top + bottom,
            channels: self.channels,
            data,
        }
    }

    /// Convert to an `image` crate buffer for encoding.
    ///
    /// Returns `None` for channel counts `image` has no pixel type for.
    /// Float buffers are clamped to `[0, 1]` and stored as 8-bit.
    pub fn to_dynamic_image(&self) -> Option<DynamicImage> {
        let (w, h) = (self.width, self.height);
        match (&self.data, self.channels) {
            (PixelData::U8(v), 1) => {
                ImageBuffer::<Luma<u8>, _>::from_raw(w, h, v.clone()).map(DynamicImage::ImageLuma8)
            }
            (PixelData::U8(v), 2) => ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, v.clone())
                .map(DynamicImage::ImageLumaA8),
            (PixelData::U8(v), 3) => {
                ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgb8)
            }
            (PixelData::U8(v), 4) => {
                ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgba8)
            }
            (PixelData::U16(v), 1) => ImageBuffer::<Luma<u16>, _>::from_raw(w, h, v.clone())
                .map(DynamicImage::ImageLuma16),
            (PixelData::U16(v), 2) => ImageBuffer::<LumaA<u16>, _>::from_raw(w, h, v.clone())
                .map(DynamicImage::ImageLumaA16),
            (PixelData::U16(v), 3) => ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, v.clone())
                .map(DynamicImage::ImageRgb16),
            (PixelData::U16(v), 4) => ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, v.clone())
                .map(DynamicImage::ImageRgba16),
            (PixelData::F32(v), 1 | 2 | 3 | 4) => {
                let bytes: Vec<u8> = v
                    .iter()
                    .map(|&s| (s.clamp(0.0, 1.0) * 255.0).round() as u8)
                    .collect();
                PixelBuffer::new(w, h, self.channels, PixelData::U8(bytes))
                    .ok()?
                    .to_dynamic_image()
            }
            _ => None,
        }
    }
}

// =============================================================================
// Validity Mask
// =============================================================================

/// Per-pixel flag marking which pixels hold slide data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl ValidityMask {
    pub fn new(width: u32, height: u32, data: Vec<bool>) -> Result<Self, BackendError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(BackendError::Decode(format!(
                "validity mask holds {} values, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A mask with every pixel set to `valid`.
    pub fn filled(width: u32, height: u32, valid: bool) -> Self {
        Self {
            width,
            height,
            data: vec![valid; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Mask shape in `(height, width)` order.
    pub fn shape(&self) -> (usize, usize) {
        (self.height as usize, self.width as usize)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> Option<bool> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn all_valid(&self) -> bool {
        self.data.iter().all(|&v| v)
    }

    pub fn none_valid(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    pub fn count_valid(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let frame = Frame::new(self.width, self.height, 1);
        Self {
            width,
            height,
            data: frame.crop(&self.data, x, y, width, height),
        }
    }

    /// Surround the mask with invalid pixels.
    pub fn pad(&self, left: u32, top: u32, right: u32, bottom: u32) -> Self {
        let frame = Frame::new(self.width, self.height, 1);
        let edges = Edges {
            left,
            top,
            right,
            bottom,
        };
        Self {
            width: self.width + left + right,
            height: self.height + top + bottom,
            data: frame.pad(&self.data, edges, false),
        }
    }

    /// Render as an 8-bit image, 255 for valid pixels.
    pub fn to_gray_image(&self) -> GrayImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let valid = self.data[y as usize * self.width as usize + x as usize];
            Luma([if valid { 255 } else { 0 }])
        })
    }
}

// =============================================================================
// Region
// =============================================================================

/// Requested region size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSize {
    pub width: u32,
    pub height: u32,
}

impl RegionSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A single scalar requests a square region.
impl From<u32> for RegionSize {
    fn from(side: u32) -> Self {
        Self::new(side, side)
    }
}

impl From<(u32, u32)> for RegionSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// Pixels plus validity mask for one region read.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub pixels: PixelBuffer,
    pub mask: ValidityMask,
}

impl Region {
    /// Pair pixels with a mask of the same dimensions.
    pub fn new(pixels: PixelBuffer, mask: ValidityMask) -> Result<Self, BackendError> {
        if pixels.dimensions() != mask.dimensions() {
            return Err(BackendError::ShapeMismatch {
                expected: pixels.dimensions(),
                actual: mask.dimensions(),
            });
        }
        Ok(Self { pixels, mask })
    }

    /// Fully valid region around `pixels`.
    pub fn opaque(pixels: PixelBuffer) -> Self {
        let mask = ValidityMask::filled(pixels.width(), pixels.height(), true);
        Self { pixels, mask }
    }

    /// Zero pixels, nothing valid.
    pub fn blank(size: RegionSize, channels: usize, pixel_type: PixelType) -> Self {
        Self {
            pixels: PixelBuffer::zeros(size.width, size.height, channels, pixel_type),
            mask: ValidityMask::filled(size.width, size.height, false),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pad(&self, left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            pixels: self.pixels.pad(left, top, right, bottom),
            mask: self.mask.pad(left, top, right, bottom),
        }
    }

    pub fn into_parts(self) -> (PixelBuffer, ValidityMask) {
        (self.pixels, self.mask)
    }
}

// =============================================================================
// Plane Helpers
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Edges {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

/// Geometry of an interleaved plane.
#[derive(Debug, Clone, Copy)]
struct Frame {
    width: usize,
    height: usize,
    channels: usize,
}

impl Frame {
    fn new(width: u32, height: u32, channels: usize) -> Self {
        Self {
            width: width as usize,
            height: height as usize,
            channels,
        }
    }

    fn row_len(&self) -> usize {
        self.width * self.channels
    }

    fn crop<T: Copy>(&self, src: &[T], x: u32, y: u32, width: u32, height: u32) -> Vec<T> {
        let (x, y) = (x as usize, y as usize);
        let out_row = width as usize * self.channels;
        let mut out = Vec::with_capacity(out_row * height as usize);
        for row in y..y + height as usize {
            let start = row * self.row_len() + x * self.channels;
            out.extend_from_slice(&src[start..start + out_row]);
        }
        out
    }

    fn pad<T: Copy>(&self, src: &[T], edges: Edges, fill: T) -> Vec<T> {
        let out_width = self.width + edges.left as usize + edges.right as usize;
        let out_height = self.height + edges.top as usize + edges.bottom as usize;
        let out_row = out_width * self.channels;
        let mut out = vec![fill; out_row * out_height];
        let row_len = self.row_len();
        if row_len == 0 {
            return out;
        }
        for (row, chunk) in src.chunks_exact(row_len).enumerate() {
            let start = (row + edges.top as usize) * out_row + edges.left as usize * self.channels;
            out[start..start + row_len].copy_from_slice(chunk);
        }
        out
    }
}

// =============================================================================
// Tests
// =============================================================================
