//! Downsample-addressed reads against an in-memory pyramid.
//!
//! The ramp pyramid has levels of 1000, 500 and 250 pixels, so the level
//! downsamples are 1, 2 and 4.

use wsi_reader::{PixelType, ReadOptions, Slide, SlideError};

use super::test_utils::{
    assert_normalized_matches, constant_float_reader, ramp_reader, RawRead, RecordingReader,
    RAMP_BLUE,
};

fn slide() -> Slide<RecordingReader> {
    Slide::new(ramp_reader()).unwrap()
}

// =============================================================================
// Level Selection
// =============================================================================

#[test]
fn test_level_downsamples() {
    let slide = slide();
    assert_eq!(slide.level_downsamples().unwrap(), &[1.0, 2.0, 4.0]);
    assert_eq!(slide.best_level_for_downsample(1.0).unwrap(), 0);
    assert_eq!(slide.best_level_for_downsample(1.9).unwrap(), 0);
    assert_eq!(slide.best_level_for_downsample(3.0).unwrap(), 1);
    assert_eq!(slide.best_level_for_downsample(4.0).unwrap(), 2);
    assert_eq!(slide.best_level_for_downsample(32.0).unwrap(), 2);
    assert_eq!(slide.best_level_for_downsample(0.25).unwrap(), 0);
}

#[test]
fn test_dimensions_for_downsample() {
    let slide = slide();
    assert_eq!(slide.dimensions_for_downsample(1.0).unwrap(), (1000, 1000));
    assert_eq!(slide.dimensions_for_downsample(2.0).unwrap(), (500, 500));
    assert_eq!(slide.dimensions_for_downsample(3.0).unwrap(), (333, 333));
    assert_eq!(slide.dimensions_for_downsample(8.0).unwrap(), (125, 125));
    assert!(matches!(
        slide.dimensions_for_downsample(0.0),
        Err(SlideError::InvalidDownsample { .. })
    ));
}

// =============================================================================
// Reads Between Levels
// =============================================================================

#[test]
fn test_downsample_between_levels_reads_finer_level() {
    let slide = slide();
    let region = slide
        .read_region_by_downsample((0, 0), 3.0, 100, ReadOptions::new())
        .unwrap();

    assert_eq!(region.dimensions(), (100, 100));
    assert!(region.mask.all_valid());
    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((0, 0), 1, (150, 150))]
    );
    assert_eq!(region.pixels.sample(50, 50, 2), Some(RAMP_BLUE as f64));
}

#[test]
fn test_downsample_origin_is_scaled() {
    let slide = slide();
    slide
        .read_region_by_downsample((100, 50), 3.0, (40, 20), ReadOptions::new())
        .unwrap();
    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((150, 75), 1, (60, 30))]
    );
}

#[test]
fn test_exact_level_downsample_is_not_resampled() {
    let slide = slide();
    let region = slide
        .read_region_by_downsample((10, 10), 2.0, 20, ReadOptions::new())
        .unwrap();

    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((10, 10), 1, (20, 20))]
    );
    let level = slide.reader().inner().level(1).unwrap();
    assert_eq!(region.pixels.sample(3, 4, 0), level.sample(13, 14, 0));
    assert_eq!(region.pixels.sample(3, 4, 1), level.sample(13, 14, 1));
}

#[test]
fn test_downsample_beyond_coarsest_level() {
    let slide = slide();
    let region = slide
        .read_region_by_downsample((5, 5), 8.0, 10, ReadOptions::new())
        .unwrap();

    assert_eq!(region.dimensions(), (10, 10));
    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((10, 10), 2, (20, 20))]
    );
}

#[test]
fn test_upsampling_below_level_0() {
    let slide = slide();
    let region = slide
        .read_region_by_downsample((0, 0), 0.5, 40, ReadOptions::new())
        .unwrap();

    assert_eq!(region.dimensions(), (40, 40));
    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((0, 0), 0, (20, 20))]
    );
}

#[test]
fn test_downsample_overhang_is_masked() {
    let slide = slide();
    let region = slide
        .read_region_by_downsample((300, 300), 3.0, 50, ReadOptions::new())
        .unwrap();

    assert_eq!(region.dimensions(), (50, 50));
    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((450, 450), 1, (50, 50))]
    );
    assert_eq!(region.mask.get(0, 0), Some(true));
    assert_eq!(region.mask.get(49, 49), Some(false));
    assert!(!region.mask.all_valid());
}

#[test]
fn test_normalized_downsample() {
    let slide = slide();
    let options = ReadOptions::new().with_normalize(true);
    let region = slide
        .read_region_by_downsample((0, 0), 3.0, 16, options)
        .unwrap();

    assert_eq!(region.pixels.pixel_type(), PixelType::F32);
    let blue = region.pixels.sample(8, 8, 2).unwrap();
    assert!((blue - RAMP_BLUE as f64 / 255.0).abs() < 1e-3);
}

#[test]
fn test_normalized_downsample_equals_raw_over_255() {
    let slide = slide();
    // Exact level, between levels, past the coarsest level, overhanging
    let cases = [((10, 10), 2.0), ((5, 9), 3.0), ((0, 0), 6.0), ((320, 300), 3.0)];
    for (origin, downsample) in cases {
        let raw = slide
            .read_region_by_downsample(origin, downsample, (20, 12), ReadOptions::new())
            .unwrap();
        let normalized = slide
            .read_region_by_downsample(
                origin,
                downsample,
                (20, 12),
                ReadOptions::new().with_normalize(true),
            )
            .unwrap();
        assert_normalized_matches(&raw, &normalized);
    }
}

#[test]
fn test_repeated_downsample_reads_are_identical() {
    let slide = slide();
    for downsample in [2.0, 3.0, 0.5] {
        let first = slide
            .read_region_by_downsample((7, 11), downsample, (25, 15), ReadOptions::new())
            .unwrap();
        let second = slide
            .read_region_by_downsample((7, 11), downsample, (25, 15), ReadOptions::new())
            .unwrap();
        assert_eq!(first, second, "downsample {}", downsample);
    }
}

#[test]
fn test_float_values_survive_resampling() {
    for value in [1000.0f32, -3.0] {
        let slide = Slide::new(constant_float_reader(value)).unwrap();
        let region = slide
            .read_region_by_downsample((0, 0), 1.5, 10, ReadOptions::new())
            .unwrap();
        assert_eq!(region.pixels.pixel_type(), PixelType::F32);
        let sample = region.pixels.sample(5, 5, 0).unwrap();
        assert!((sample - value as f64).abs() < 1e-3, "{} became {}", value, sample);
    }
}

// =============================================================================
// Forced Level 0
// =============================================================================

#[test]
fn test_forced_level_0_downsample() {
    let slide = slide();
    let options = ReadOptions::new().with_level_0_downsample(true);
    let region = slide
        .read_region_by_downsample((10, 10), 3.0, 10, options)
        .unwrap();

    assert_eq!(region.dimensions(), (10, 10));
    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((30, 30), 0, (30, 30))]
    );
}

#[test]
fn test_forced_level_0_skips_exact_level() {
    let slide = slide();
    let options = ReadOptions::new().with_level_0_downsample(true);
    slide
        .read_region_by_downsample((0, 0), 2.0, 10, options)
        .unwrap();
    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((0, 0), 0, (20, 20))]
    );
}

#[test]
fn test_forced_level_0_at_full_resolution() {
    let slide = slide();
    let options = ReadOptions::new().with_level_0_downsample(true);
    slide
        .read_region_by_downsample((4, 4), 1.0, 10, options)
        .unwrap();
    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((4, 4), 0, (10, 10))]
    );
}

#[test]
fn test_invalid_downsample() {
    let slide = slide();
    for downsample in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let err = slide
            .read_region_by_downsample((0, 0), downsample, 10, ReadOptions::new())
            .unwrap_err();
        assert!(
            matches!(err, SlideError::InvalidDownsample { .. }),
            "downsample {}",
            downsample
        );
    }
    let err = slide
        .read_region_by_downsample((0, 0), 2.0, (10, 0), ReadOptions::new())
        .unwrap_err();
    assert!(matches!(err, SlideError::InvalidSize { .. }));
    assert!(slide.reader().reads().is_empty());
}

// =============================================================================
// Downsampled Slide
// =============================================================================

#[test]
fn test_downsampled_slide_square() {
    let slide = slide();
    let region = slide.downsampled_slide((100, 100), false).unwrap();

    assert_eq!(region.dimensions(), (100, 100));
    assert!(region.mask.all_valid());
    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((0, 0), 2, (250, 250))]
    );
}

#[test]
fn test_downsampled_slide_uses_smaller_factor() {
    let slide = slide();
    let region = slide.downsampled_slide((200, 100), false).unwrap();

    // min(1000 / 200, 1000 / 100) = 5
    assert_eq!(region.dimensions(), (200, 200));
    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((0, 0), 2, (250, 250))]
    );
}

#[test]
fn test_downsampled_slide_at_level() {
    let slide = slide();
    let region = slide.downsampled_slide(500, true).unwrap();

    assert_eq!(region.dimensions(), (500, 500));
    assert_eq!(region.pixels.pixel_type(), PixelType::F32);
    assert_eq!(
        slide.reader().reads(),
        vec![RawRead::new((0, 0), 1, (500, 500))]
    );
}
