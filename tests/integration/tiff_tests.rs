//! Tiled TIFF backend tests.
//!
//! Tests verify:
//! - Pyramid levels are found and associated images form their own series
//! - Aperio, OME-XML and Philips resolution metadata
//! - Reads crossing tile boundaries and clipped edge tiles
//! - Strip-based TIFFs fall back to a single level

use wsi_reader::error::BackendError;
use wsi_reader::slide::{open_slide, open_slide_series};
use wsi_reader::{Mpp, PixelType, ReadOptions, SlideError, SlideReader, TiffReader};

use super::test_utils::{
    fixture_pyramid, fixture_svs, is_little_endian_tiff, label_pixel, level0_pixel,
    level1_pixel, strip_gray_tiff, temp_file, tiled_gray_tiff, GrayImageSpec, TILE_PADDING,
};

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_fixture_is_tiff() {
    let bytes = tiled_gray_tiff(&fixture_pyramid(), None);
    assert!(is_little_endian_tiff(&bytes));
}

#[test]
fn test_svs_metadata() {
    let file = fixture_svs();
    let slide = open_slide(file.path()).unwrap();

    assert_eq!(slide.level_count().unwrap(), 2);
    assert_eq!(slide.level_dimensions().unwrap(), &[(64, 48), (32, 24)]);
    assert_eq!(slide.tile_dimensions().unwrap(), &[(16, 16), (16, 16)]);
    assert_eq!(slide.level_downsamples().unwrap(), &[1.0, 2.0]);
    assert_eq!(slide.mpp().unwrap(), Mpp::uniform(0.499));
    assert_eq!(slide.pixel_type().unwrap(), PixelType::U8);
    assert_eq!(slide.channel_count().unwrap(), 1);
}

#[test]
fn test_label_image_is_not_a_level() {
    let file = fixture_svs();
    let reader = TiffReader::open(file.path()).unwrap();

    assert_eq!(reader.level_count(), 2);
    assert_eq!(reader.level_ifd(0), Some(0));
    assert_eq!(reader.level_ifd(1), Some(1));
    assert_eq!(reader.level_ifd(2), None);
}

#[test]
fn test_levels_sorted_by_area() {
    let images = vec![
        GrayImageSpec::new(32, 24, level1_pixel),
        GrayImageSpec::new(64, 48, level0_pixel),
    ];
    let file = temp_file(&tiled_gray_tiff(&images, None), ".tif");
    let reader = TiffReader::open(file.path()).unwrap();

    assert_eq!(reader.level_ifd(0), Some(1));
    assert_eq!(reader.level_dimensions(0), Some((64, 48)));
    assert_eq!(reader.level_dimensions(1), Some((32, 24)));
    assert_eq!(reader.mpp(), Mpp::unknown());
}

#[test]
fn test_ome_physical_size() {
    let description = concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
        "<OME xmlns=\"http://www.openmicroscopy.org/Schemas/OME/2016-06\">",
        "<Image ID=\"Image:0\"><Pixels ID=\"Pixels:0\" DimensionOrder=\"XYCZT\" ",
        "PhysicalSizeX=\"0.25\" PhysicalSizeY=\"0.5\" SizeX=\"64\" SizeY=\"48\" ",
        "SizeC=\"1\" SizeZ=\"1\" SizeT=\"1\" Type=\"uint8\"/></Image></OME>"
    );
    let bytes = tiled_gray_tiff(&fixture_pyramid(), Some(description));
    let file = temp_file(&bytes, ".ome.tif");
    let slide = open_slide(file.path()).unwrap();

    assert_eq!(slide.mpp().unwrap(), Mpp::new(Some(0.25), Some(0.5)));
}

#[test]
fn test_ome_physical_size_per_series() {
    // Single-quoted attributes, and a size outside Image/Pixels that is not
    // the slide's
    let description = concat!(
        "<?xml version='1.0' encoding='UTF-8'?>",
        "<OME xmlns='http://www.openmicroscopy.org/Schemas/OME/2016-06'>",
        "<Instrument><Objective ID='Objective:0' PhysicalSizeX='9.9'/></Instrument>",
        "<Image ID='Image:0'><Pixels PhysicalSizeX='0.25' PhysicalSizeY='0.25'/></Image>",
        "<Image ID='Image:1'><Pixels PhysicalSizeX='8.0' PhysicalSizeY='4.0'/></Image>",
        "</OME>"
    );
    let bytes = tiled_gray_tiff(&fixture_pyramid(), Some(description));
    let file = temp_file(&bytes, ".ome.tif");

    let slide = open_slide_series(file.path(), 0).unwrap();
    assert_eq!(slide.mpp().unwrap(), Mpp::uniform(0.25));

    let label = open_slide_series(file.path(), 1).unwrap();
    assert_eq!(label.mpp().unwrap(), Mpp::new(Some(8.0), Some(4.0)));
}

#[test]
fn test_philips_pixel_spacing() {
    let description = concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>",
        "<DataObject ObjectType=\"DPUfsImport\">",
        "<Attribute Name=\"PIM_DP_SCANNED_IMAGES\" PMSVR=\"IDataObjectArray\"><Array>",
        "<DataObject ObjectType=\"DPScannedImage\">",
        "<Attribute Name=\"PIM_DP_IMAGE_TYPE\" PMSVR=\"IString\">WSI</Attribute>",
        "<Attribute Name=\"PIIM_PIXEL_DATA_REPRESENTATION_SEQUENCE\" PMSVR=\"IDataObjectArray\"><Array>",
        "<DataObject ObjectType=\"PixelDataRepresentation\">",
        "<Attribute Name=\"DICOM_PIXEL_SPACING\" PMSVR=\"IDoubleArray\">&quot;0.0005&quot; &quot;0.00025&quot;</Attribute>",
        "</DataObject></Array></Attribute>",
        "</DataObject></Array></Attribute>",
        "</DataObject>"
    );
    let bytes = tiled_gray_tiff(&fixture_pyramid(), Some(description));
    let file = temp_file(&bytes, ".tiff");
    let slide = open_slide(file.path()).unwrap();

    let mpp = slide.mpp().unwrap();
    assert!((mpp.x.unwrap() - 0.25).abs() < 1e-9);
    assert!((mpp.y.unwrap() - 0.5).abs() < 1e-9);
}

// =============================================================================
// Series
// =============================================================================

#[test]
fn test_label_is_its_own_series() {
    let file = fixture_svs();
    let reader = TiffReader::open_series(file.path(), 1).unwrap();

    assert_eq!(reader.series(), 1);
    assert_eq!(reader.series_count(), 2);
    assert_eq!(reader.level_count(), 1);
    assert_eq!(reader.level_ifd(0), Some(2));
    assert_eq!(reader.level_dimensions(0), Some((32, 8)));

    let region = reader.read_raw((0, 0), 0, (32, 8)).unwrap();
    assert!(region.mask.all_valid());
    assert_eq!(
        region.pixels.sample(31, 7, 0),
        Some(f64::from(label_pixel(31, 7)))
    );
}

#[test]
fn test_main_pyramid_is_series_0() {
    let file = fixture_svs();
    let reader = TiffReader::open(file.path()).unwrap();
    assert_eq!(reader.series(), 0);
    assert_eq!(reader.series_count(), 2);
    assert_eq!(reader.level_count(), 2);
}

#[test]
fn test_missing_series() {
    let file = fixture_svs();
    let err = TiffReader::open_series(file.path(), 2).unwrap_err();
    assert!(matches!(err, BackendError::Metadata(_)));

    let err = open_slide_series(file.path(), 2).unwrap_err();
    assert!(matches!(err, SlideError::Backend(_)));
}

// =============================================================================
// Reads
// =============================================================================

#[test]
fn test_read_across_tiles() {
    let file = fixture_svs();
    let slide = open_slide(file.path()).unwrap();
    let region = slide
        .read_region((10, 10), 0, (30, 20), ReadOptions::new())
        .unwrap();

    assert!(region.mask.all_valid());
    for y in 0..20 {
        for x in 0..30 {
            assert_eq!(
                region.pixels.sample(x, y, 0),
                Some(f64::from(level0_pixel(x + 10, y + 10))),
                "pixel ({}, {})",
                x,
                y
            );
        }
    }
}

#[test]
fn test_read_edge_tiles_skips_tile_padding() {
    let file = fixture_svs();
    let slide = open_slide(file.path()).unwrap();
    let region = slide
        .read_region((20, 16), 1, (12, 8), ReadOptions::new())
        .unwrap();

    assert!(region.mask.all_valid());
    for y in 0..8 {
        for x in 0..12 {
            let value = region.pixels.sample(x, y, 0).unwrap();
            assert_eq!(value, f64::from(level1_pixel(x + 20, y + 16)));
            assert_ne!(value, f64::from(TILE_PADDING));
        }
    }
}

#[test]
fn test_overhanging_read() {
    let file = fixture_svs();
    let slide = open_slide(file.path()).unwrap();
    let region = slide
        .read_region((28, 20), 1, 10, ReadOptions::new())
        .unwrap();

    assert_eq!(region.dimensions(), (10, 10));
    assert_eq!(region.mask.count_valid(), 4 * 4);
    assert_eq!(
        region.pixels.sample(0, 0, 0),
        Some(f64::from(level1_pixel(28, 20)))
    );
    assert_eq!(region.pixels.sample(5, 5, 0), Some(0.0));
    assert_eq!(region.mask.get(5, 5), Some(false));
}

#[test]
fn test_read_by_exact_downsample() {
    let file = fixture_svs();
    let slide = open_slide(file.path()).unwrap();
    let region = slide
        .read_region_by_downsample((4, 4), 2.0, 8, ReadOptions::new())
        .unwrap();

    assert!(region.mask.all_valid());
    assert_eq!(
        region.pixels.sample(3, 2, 0),
        Some(f64::from(level1_pixel(7, 6)))
    );
}

#[test]
fn test_thumbnail() {
    let file = fixture_svs();
    let slide = open_slide(file.path()).unwrap();
    let region = slide.downsampled_slide((16, 12), true).unwrap();

    assert_eq!(region.dimensions(), (16, 12));
    assert_eq!(region.pixels.pixel_type(), PixelType::F32);
    assert!(region.mask.all_valid());
}

#[test]
fn test_strip_tiff_is_single_level() {
    let file = temp_file(
        &strip_gray_tiff(GrayImageSpec::new(20, 10, level0_pixel)),
        ".tif",
    );
    let slide = open_slide(file.path()).unwrap();

    assert_eq!(slide.level_count().unwrap(), 1);
    assert_eq!(slide.dimensions().unwrap(), (20, 10));

    let region = slide
        .read_region((5, 2), 0, (4, 4), ReadOptions::new())
        .unwrap();
    assert_eq!(
        region.pixels.sample(1, 1, 0),
        Some(f64::from(level0_pixel(6, 3)))
    );
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_close_releases_reader() {
    let file = fixture_svs();
    let mut slide = open_slide(file.path()).unwrap();
    slide.read_region((0, 0), 0, 4, ReadOptions::new()).unwrap();

    slide.close();
    let err = slide
        .read_region((0, 0), 0, 4, ReadOptions::new())
        .unwrap_err();
    assert!(matches!(err, SlideError::Closed));
}

#[test]
fn test_closed_reader_rejects_raw_reads() {
    let file = fixture_svs();
    let mut reader = TiffReader::open(file.path()).unwrap();
    reader.close();
    assert!(reader.read_raw((0, 0), 0, (4, 4)).is_err());
}

#[test]
fn test_truncated_tiff_fails_to_open() {
    let mut bytes = tiled_gray_tiff(&fixture_pyramid(), None);
    bytes.truncate(16);
    let file = temp_file(&bytes, ".tif");

    let err = open_slide(file.path()).unwrap_err();
    assert!(matches!(err, SlideError::Backend(_)));
}
