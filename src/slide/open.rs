//! Open a slide file with the backend matching its format.

use std::path::Path;

use tracing::info;

use crate::error::{FormatError, SlideError};
use crate::format::{detect_format, SlideFormat, TiffReader};

use super::handle::Slide;
use super::reader::SlideReader;

/// A slide behind a type-erased reader, as returned by [`open_slide`].
pub type DynSlide = Slide<Box<dyn SlideReader + Send>>;

/// Detect the format of `path` and open it.
///
/// Fails with [`FormatError::UnsupportedFormat`] when no backend compiled
/// into this build can read the file.
pub fn open_slide(path: impl AsRef<Path>) -> Result<DynSlide, SlideError> {
    open_slide_series(path, 0)
}

/// Like [`open_slide`], opening image series `series` of a multi-series
/// file. Only TIFF files have series beyond 0.
pub fn open_slide_series(path: impl AsRef<Path>, series: usize) -> Result<DynSlide, SlideError> {
    let path = path.as_ref();
    let format = detect_format(path)?;

    let reader: Box<dyn SlideReader + Send> = match format {
        SlideFormat::Tiff => Box::new(TiffReader::open_series(path, series)?),
        _ if series != 0 => {
            return Err(unsupported(format, "only series 0 is available"));
        }
        SlideFormat::OpenSlide => open_openslide(path)?,
        SlideFormat::PhilipsIsyntax => {
            return Err(unsupported(format, "no iSyntax backend is available"));
        }
    };

    let slide = Slide::new(reader)?;
    info!(
        path = %path.display(),
        format = format.name(),
        series,
        levels = slide.level_count()?,
        "opened slide"
    );
    Ok(slide)
}

#[cfg(feature = "openslide")]
fn open_openslide(path: &Path) -> Result<Box<dyn SlideReader + Send>, SlideError> {
    let reader = crate::format::OpenSlideReader::open(path)?;
    Ok(Box::new(reader))
}

#[cfg(not(feature = "openslide"))]
fn open_openslide(_path: &Path) -> Result<Box<dyn SlideReader + Send>, SlideError> {
    Err(unsupported(
        SlideFormat::OpenSlide,
        "built without the `openslide` feature",
    ))
}

fn unsupported(format: SlideFormat, detail: &str) -> SlideError {
    FormatError::UnsupportedFormat {
        reason: format!("no suitable backend for {} ({})", format.name(), detail),
    }
    .into()
}
