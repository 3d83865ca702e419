//! Resampling and normalization of fetched regions.
//!
//! Pixels are resized with a Catmull-Rom (bicubic) kernel, one channel plane
//! at a time so any channel count works. The validity mask goes through the
//! same kernel as a 0/1 plane and is thresholded back: any nonzero result is
//! valid. This keeps mask edges smooth while the mask stays boolean.
//!
//! `image` clamps `f32` samples to `[0, 1]` while resizing, so float planes
//! are mapped into that interval from their own min/max first and mapped back
//! afterwards.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Primitive};
use tracing::trace;

use super::buffer::{PixelBuffer, PixelData, Region, ValidityMask};

/// Kernel used for every resize.
pub const RESAMPLE_FILTER: FilterType = FilterType::CatmullRom;

/// Divisor applied to integer samples by [`normalize`].
pub const NORMALIZE_DIVISOR: f32 = 255.0;

// =============================================================================
// Resizing
// =============================================================================

/// Resize a whole region (pixels and mask) to `width x height`.
pub fn resize_region(region: &Region, width: u32, height: u32) -> Region {
    if region.dimensions() == (width, height) {
        return region.clone();
    }
    trace!(
        from_width = region.width(),
        from_height = region.height(),
        width,
        height,
        "resampling region"
    );
    Region {
        pixels: resize_pixels(&region.pixels, width, height),
        mask: resize_mask(&region.mask, width, height),
    }
}

/// Resize pixels to `width x height`.
pub fn resize_pixels(buffer: &PixelBuffer, width: u32, height: u32) -> PixelBuffer {
    if buffer.dimensions() == (width, height) {
        return buffer.clone();
    }
    let channels = buffer.channels();
    if is_degenerate(buffer.dimensions(), (width, height)) {
        return PixelBuffer::zeros(width, height, channels, buffer.pixel_type());
    }

    let from = buffer.dimensions();
    let to = (width, height);
    let data = match buffer.data() {
        PixelData::U8(v) => PixelData::U8(resize_interleaved(v, channels, from, to)),
        PixelData::U16(v) => PixelData::U16(resize_interleaved(v, channels, from, to)),
        PixelData::F32(v) => PixelData::F32(resize_float_interleaved(v, channels, from, to)),
    };

    match PixelBuffer::new(width, height, channels, data) {
        Ok(resized) => resized,
        // resize_interleaved always yields width * height * channels samples
        Err(_) => PixelBuffer::zeros(width, height, channels, buffer.pixel_type()),
    }
}

/// Resize a validity mask to `width x height`.
pub fn resize_mask(mask: &ValidityMask, width: u32, height: u32) -> ValidityMask {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    if is_degenerate(mask.dimensions(), (width, height)) {
        return ValidityMask::filled(width, height, false);
    }

    let plane: Vec<u8> = mask.as_slice().iter().map(|&v| v as u8).collect();
    let resized = resize_interleaved(&plane, 1, mask.dimensions(), (width, height));
    let data = resized.into_iter().map(|v| v > 0).collect();

    ValidityMask::new(width, height, data)
        .unwrap_or_else(|_| ValidityMask::filled(width, height, false))
}

fn is_degenerate(from: (u32, u32), to: (u32, u32)) -> bool {
    from.0 == 0 || from.1 == 0 || to.0 == 0 || to.1 == 0
}

/// Affine map of one float channel onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct UnitRange {
    offset: f32,
    scale: f32,
}

impl UnitRange {
    const IDENTITY: UnitRange = UnitRange {
        offset: 0.0,
        scale: 1.0,
    };

    fn of(samples: impl Iterator<Item = f32>) -> Self {
        let (low, high) = samples.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if !(low.is_finite() && high.is_finite()) || (low >= 0.0 && high <= 1.0) {
            return Self::IDENTITY;
        }
        let span = high - low;
        Self {
            offset: low,
            scale: if span > 0.0 && span.is_finite() { span } else { 1.0 },
        }
    }

    fn forward(&self, value: f32) -> f32 {
        (value - self.offset) / self.scale
    }

    fn inverse(&self, value: f32) -> f32 {
        value * self.scale + self.offset
    }
}

/// Resize float samples without losing values outside `[0, 1]`.
fn resize_float_interleaved(
    data: &[f32],
    channels: usize,
    from: (u32, u32),
    to: (u32, u32),
) -> Vec<f32> {
    let ranges: Vec<UnitRange> = (0..channels)
        .map(|channel| UnitRange::of(data.iter().skip(channel).step_by(channels).copied()))
        .collect();
    if ranges.iter().all(|range| *range == UnitRange::IDENTITY) {
        return resize_interleaved(data, channels, from, to);
    }

    let mapped: Vec<f32> = data
        .iter()
        .enumerate()
        .map(|(i, &v)| ranges[i % channels].forward(v))
        .collect();
    let mut resized = resize_interleaved(&mapped, channels, from, to);
    for (i, sample) in resized.iter_mut().enumerate() {
        *sample = ranges[i % channels].inverse(*sample);
    }
    resized
}

/// Resize interleaved samples, one channel plane at a time.
fn resize_interleaved<T>(data: &[T], channels: usize, from: (u32, u32), to: (u32, u32)) -> Vec<T>
where
    T: Primitive + 'static,
    Luma<T>: Pixel<Subpixel = T>,
{
    let (src_w, src_h) = from;
    let (dst_w, dst_h) = to;
    let mut out = vec![T::DEFAULT_MIN_VALUE; dst_w as usize * dst_h as usize * channels];

    for channel in 0..channels {
        let plane: ImageBuffer<Luma<T>, Vec<T>> = ImageBuffer::from_fn(src_w, src_h, |x, y| {
            let index = (y as usize * src_w as usize + x as usize) * channels + channel;
            Luma([data[index]])
        });
        let resized = imageops::resize(&plane, dst_w, dst_h, RESAMPLE_FILTER);
        for (i, sample) in resized.into_raw().into_iter().enumerate() {
            out[i * channels + channel] = sample;
        }
    }

    out
}

// =============================================================================
// Normalization
// =============================================================================

/// Rescale integer samples by 1/255 into `f32`; float data passes through.
pub fn normalize(buffer: PixelBuffer) -> PixelBuffer {
    if !buffer.pixel_type().is_integer() {
        return buffer;
    }
    let (width, height, channels) = (buffer.width(), buffer.height(), buffer.channels());
    let data = match buffer.into_data() {
        PixelData::U8(v) => v.into_iter().map(|s| s as f32 / NORMALIZE_DIVISOR).collect(),
        PixelData::U16(v) => v.into_iter().map(|s| s as f32 / NORMALIZE_DIVISOR).collect(),
        PixelData::F32(v) => v,
    };
    PixelBuffer::new(width, height, channels, PixelData::F32(data))
        .unwrap_or_else(|_| PixelBuffer::zeros(width, height, channels, super::PixelType::F32))
}

/// Normalize the pixels of a region, leaving the mask untouched.
pub fn normalize_region(region: Region) -> Region {
    let (pixels, mask) = region.into_parts();
    Region {
        pixels: normalize(pixels),
        mask,
    }
}

// =============================================================================
// Tests
// =============================================================================
