//! Format detection and backend dispatch tests.

use wsi_reader::error::FormatError;
use wsi_reader::slide::open_slide;
use wsi_reader::{detect_format, SlideError, SlideFormat};

use super::test_utils::{fixture_pyramid, temp_file, tiled_gray_tiff};

#[test]
fn test_tiff_detected_by_header() {
    let bytes = tiled_gray_tiff(&fixture_pyramid(), None);
    for suffix in [".svs", ".tif", ".ndpi", ".bin"] {
        let file = temp_file(&bytes, suffix);
        assert_eq!(
            detect_format(file.path()).unwrap(),
            SlideFormat::Tiff,
            "suffix {}",
            suffix
        );
    }
}

#[test]
fn test_big_endian_header_detected() {
    let file = temp_file(b"MM\x00\x2a\x00\x00\x00\x08", ".tif");
    assert_eq!(detect_format(file.path()).unwrap(), SlideFormat::Tiff);
}

#[test]
fn test_openslide_extensions() {
    for suffix in [".mrxs", ".MRXS", ".svslide"] {
        let file = temp_file(b"[GENERAL]\n", suffix);
        assert_eq!(
            detect_format(file.path()).unwrap(),
            SlideFormat::OpenSlide,
            "suffix {}",
            suffix
        );
    }
}

#[test]
fn test_isyntax_detected_by_extension() {
    // iSyntax is decided before the file is opened
    let format = detect_format("/nonexistent/slide.isyntax").unwrap();
    assert_eq!(format, SlideFormat::PhilipsIsyntax);
    assert_eq!(format.name(), "Philips iSyntax");
}

#[test]
fn test_unknown_content_is_unsupported() {
    let file = temp_file(b"\x89PNG\r\n\x1a\n", ".png");
    let err = detect_format(file.path()).unwrap_err();
    assert!(matches!(err, FormatError::UnsupportedFormat { .. }));
}

#[test]
fn test_empty_file_is_unsupported() {
    let file = temp_file(b"", ".tif");
    assert!(matches!(
        detect_format(file.path()),
        Err(FormatError::UnsupportedFormat { .. })
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = detect_format("/nonexistent/slide.svs").unwrap_err();
    assert!(matches!(err, FormatError::Io(_)));
}

#[test]
fn test_open_isyntax_has_no_backend() {
    let err = open_slide("/nonexistent/slide.isyntax").unwrap_err();
    match err {
        SlideError::Format(FormatError::UnsupportedFormat { reason }) => {
            assert!(reason.contains("no suitable backend"), "{}", reason);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[cfg(not(feature = "openslide"))]
#[test]
fn test_open_mrxs_without_openslide_feature() {
    let file = temp_file(b"[GENERAL]\n", ".mrxs");
    let err = open_slide(file.path()).unwrap_err();
    assert!(matches!(
        err,
        SlideError::Format(FormatError::UnsupportedFormat { .. })
    ));
}
