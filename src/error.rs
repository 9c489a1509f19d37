//! Error types for the watermark-probe crate.

use std::path::PathBuf;

/// Errors that can occur while embedding or detecting watermarks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An image file is missing, unreadable, or not a supported raster format.
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        /// Path of the image that failed to decode.
        path: PathBuf,
        /// Underlying decoder error.
        source: image::ImageError,
    },

    /// In-memory image bytes could not be decoded.
    #[error("failed to decode image bytes: {0}")]
    DecodeBytes(image::ImageError),

    /// Encoding or writing an output image failed.
    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        /// Destination path.
        path: PathBuf,
        /// Underlying encoder error.
        source: image::ImageError,
    },

    /// The output format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The watermark source has zero dimensions or renders to nothing.
    #[error("invalid watermark: {0}")]
    InvalidWatermark(String),

    /// An unknown anchor or operation keyword was supplied.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A numeric parameter is outside its valid range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A TrueType font could not be parsed.
    #[error("failed to load font: {0}")]
    Font(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let unsupported = Error::UnsupportedFormat("tiff".to_string());
        assert!(unsupported.to_string().contains("tiff"));

        let anchor = Error::UnsupportedOperation("unknown anchor `middle`".to_string());
        assert!(anchor.to_string().contains("middle"));

        let decode = Error::Decode {
            path: PathBuf::from("/tmp/missing.png"),
            source: image::ImageError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            )),
        };
        let msg = decode.to_string();
        assert!(msg.contains("/tmp/missing.png"));
        assert!(msg.contains("no such file"));
    }
}
