//! Image decoding, encoding and channel conversions.
//!
//! Every decoded image is normalized to 8-bit RGBA so compositing never has to
//! care about the source format. Formats without an alpha channel (JPEG, BMP)
//! are flattened by dropping alpha right before encoding.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{
    DynamicImage, ExtendedColorType, ImageBuffer, ImageEncoder, ImageFormat, ImageReader, Luma,
    RgbImage, RgbaImage,
};

use crate::error::{Error, Result};

/// Default JPEG quality used when writing lossy output.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Single-channel luminance image with values in `[0, 1]`.
pub type LumaImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Output container, inferred from the destination path's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Lossless PNG, keeps alpha.
    Png,
    /// Lossy JPEG, alpha is dropped.
    Jpeg,
    /// Lossless WebP, keeps alpha.
    WebP,
    /// Uncompressed BMP, alpha is dropped.
    Bmp,
}

impl OutputFormat {
    /// Infer the output format from a file extension (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for a missing or unknown extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                Error::UnsupportedFormat(format!("no file extension on {}", path.display()))
            })?;
        match ext.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            "bmp" => Ok(Self::Bmp),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }

    /// Whether the container stores an alpha channel.
    #[must_use]
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Png | Self::WebP)
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::WebP => ImageFormat::WebP,
            Self::Bmp => ImageFormat::Bmp,
        }
    }
}

/// Check if a file has an extension this crate can write.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    OutputFormat::from_path(path).is_ok()
}

/// Decode an image file into RGBA.
///
/// The format is sniffed from the file contents, falling back to the extension.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the file is missing, unreadable, or not a
/// supported raster format.
pub fn decode(path: &Path) -> Result<RgbaImage> {
    let decode_err = |source| Error::Decode {
        path: path.to_path_buf(),
        source,
    };
    let reader = ImageReader::open(path)
        .and_then(ImageReader::with_guessed_format)
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?;
    let img = reader.decode().map_err(decode_err)?;
    Ok(img.to_rgba8())
}

/// Decode in-memory image bytes into RGBA.
///
/// # Errors
///
/// Returns [`Error::DecodeBytes`] if the bytes are not a supported image.
pub fn decode_bytes(bytes: &[u8]) -> Result<RgbaImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(Error::DecodeBytes)
}

/// Drop the alpha channel, producing an opaque 3-channel buffer.
#[must_use]
pub fn flatten(img: &RgbaImage) -> RgbImage {
    img.convert()
}

/// Convert to luminance using `0.299*R + 0.587*G + 0.114*B`, scaled to `[0, 1]`.
///
/// Alpha is ignored, matching how the template is read for matching. The
/// normalized range keeps `f32` samples intact through `imageops::resize`,
/// which clamps floating-point pixels to `[0, 1]`.
#[must_use]
pub fn luminance(img: &RgbaImage) -> LumaImage {
    LumaImage::from_fn(img.width(), img.height(), |x, y| {
        let px = img.get_pixel(x, y);
        let lum = 0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]);
        Luma([lum / 255.0])
    })
}

fn encode_into(
    img: &RgbaImage,
    format: OutputFormat,
    jpeg_quality: u8,
    out: &mut Cursor<Vec<u8>>,
) -> image::ImageResult<()> {
    match format {
        OutputFormat::Jpeg => {
            let rgb = flatten(img);
            JpegEncoder::new_with_quality(out, jpeg_quality).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
        }
        OutputFormat::Bmp => {
            DynamicImage::ImageRgb8(flatten(img)).write_to(out, format.image_format())
        }
        OutputFormat::Png | OutputFormat::WebP => {
            DynamicImage::ImageRgba8(img.clone()).write_to(out, format.image_format())
        }
    }
}

/// Encode an RGBA image into an in-memory buffer.
///
/// # Errors
///
/// Returns [`Error::Encode`] (with an empty path) if the encoder fails.
pub fn encode_to_vec(img: &RgbaImage, format: OutputFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    encode_into(img, format, jpeg_quality, &mut out).map_err(|source| Error::Encode {
        path: PathBuf::new(),
        source,
    })?;
    Ok(out.into_inner())
}

/// Encode an RGBA image to `path`, choosing the format from its extension.
///
/// JPEG and BMP targets have their alpha channel dropped before encoding.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for an unknown extension and
/// [`Error::Encode`] if encoding or writing the file fails.
pub fn encode(img: &RgbaImage, path: &Path, jpeg_quality: u8) -> Result<()> {
    let format = OutputFormat::from_path(path)?;
    let encode_err = |source| Error::Encode {
        path: path.to_path_buf(),
        source,
    };

    let mut out = Cursor::new(Vec::new());
    encode_into(img, format, jpeg_quality, &mut out).map_err(encode_err)?;
    std::fs::write(path, out.into_inner())
        .map_err(|e| encode_err(image::ImageError::IoError(e)))?;
    Ok(())
}
