//! Format detection for Whole Slide Image files.
//!
//! Detection looks at the file extension and the first bytes of the file, in
//! this order:
//!
//! 1. `.isyntax` extension: Philips iSyntax
//! 2. Leading `II`, `MM` or `EP` bytes: tiled TIFF
//! 3. `.mrxs` / `.svslide` extension: OpenSlide-only vendor formats
//!
//! Anything else is rejected as unsupported.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::FormatError;

// =============================================================================
// SlideFormat
// =============================================================================

/// Detected slide format, which determines the reader used to open it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideFormat {
    /// TIFF-based formats (SVS, OME-TIFF, NDPI, generic pyramidal TIFF)
    Tiff,

    /// Formats only the OpenSlide library understands (MIRAX, Aperio SVSlide)
    OpenSlide,

    /// Philips iSyntax
    PhilipsIsyntax,
}

impl SlideFormat {
    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::Tiff => "Tiled TIFF",
            SlideFormat::OpenSlide => "OpenSlide",
            SlideFormat::PhilipsIsyntax => "Philips iSyntax",
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Bytes read from the start of the file for sniffing.
const MAGIC_BYTES: usize = 2;

/// Extensions handled by OpenSlide rather than by TIFF decoding.
const OPENSLIDE_EXTENSIONS: [&str; 2] = ["mrxs", "svslide"];

const ISYNTAX_EXTENSION: &str = "isyntax";

/// Detect the format of a slide file.
pub fn detect_format(path: impl AsRef<Path>) -> Result<SlideFormat, FormatError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    if extension.as_deref() == Some(ISYNTAX_EXTENSION) {
        return Ok(SlideFormat::PhilipsIsyntax);
    }

    let mut file = File::open(path)
        .map_err(|e| FormatError::Io(format!("{}: {}", path.display(), e)))?;
    let mut magic = Vec::with_capacity(MAGIC_BYTES);
    file.by_ref()
        .take(MAGIC_BYTES as u64)
        .read_to_end(&mut magic)
        .map_err(|e| FormatError::Io(format!("{}: {}", path.display(), e)))?;

    if is_tiff_header(&magic) {
        return Ok(SlideFormat::Tiff);
    }

    if let Some(ext) = extension.as_deref() {
        if OPENSLIDE_EXTENSIONS.contains(&ext) {
            return Ok(SlideFormat::OpenSlide);
        }
    }

    Err(FormatError::UnsupportedFormat {
        reason: format!("no suitable backend for {}", path.display()),
    })
}

/// Check whether bytes start with one of the accepted TIFF markers.
///
/// `II` (little endian) and `MM` (big endian) are the TIFF byte-order marks.
/// `EP` is accepted as a third marker and the file is then handed to the
/// TIFF decoder like any other.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    matches!(bytes, [b'I', b'I', ..] | [b'M', b'M', ..] | [b'E', b'P', ..])
}

// =============================================================================
// Tests
// =============================================================================
