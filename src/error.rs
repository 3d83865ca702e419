use thiserror::Error;

/// Errors raised by a [`SlideReader`](crate::slide::SlideReader) implementation.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// File or handle I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Pixel data could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Fault reported by a native slide library
    #[error("Native library error: {0}")]
    Native(String),

    /// Slide metadata is missing or inconsistent
    #[error("Invalid slide metadata: {0}")]
    Metadata(String),

    /// The slide uses a pixel layout the reader cannot represent
    #[error("Unsupported pixel layout: {0}")]
    Unsupported(String),

    /// A raw read fell outside the level bounds
    #[error(
        "Raw read out of range at level {level}: origin {origin:?}, size {size:?}, level is {bounds:?}"
    )]
    OutOfRange {
        level: usize,
        origin: (u32, u32),
        size: (u32, u32),
        bounds: (u32, u32),
    },

    /// A raw read returned a block of the wrong size
    #[error("Reader returned {actual:?} pixels, expected {expected:?}")]
    ShapeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The reader was already closed
    #[error("Reader is closed")]
    Closed,
}

/// Errors related to format detection
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while sniffing the file
    #[error("I/O error: {0}")]
    Io(String),

    /// No backend understands this file
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors surfaced by [`Slide`](crate::slide::Slide) operations.
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// Downsample factor was zero, negative or not finite
    #[error("Downsample factor must be positive, got {downsample}")]
    InvalidDownsample { downsample: f64 },

    /// Requested level does not exist
    #[error("Invalid level {level}: slide has {level_count} levels")]
    InvalidLevel { level: usize, level_count: usize },

    /// Requested region or thumbnail size has a zero dimension
    #[error("Size must be positive, got {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    /// The backend reader failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// No suitable backend for the file
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// The slide handle was closed
    #[error("Slide is closed")]
    Closed,
}

impl SlideError {
    /// Whether this error is caused by a bad argument rather than the slide.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            SlideError::InvalidDownsample { .. }
                | SlideError::InvalidLevel { .. }
                | SlideError::InvalidSize { .. }
        )
    }
}
