//! Text rasterization into single-channel alpha masks.
//!
//! Two font sources are available. The built-in 8x8 bitmap font needs no
//! external files and produces hard-edged glyphs (every covered pixel is fully
//! opaque). A TrueType font loaded at runtime is rasterized with anti-aliased
//! coverage.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ab_glyph::{Font, FontVec, GlyphId, PxScale, ScaleFont};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{GrayImage, Luma};

use crate::error::{Error, Result};

/// Single-channel opacity mask, 0 = transparent, 255 = fully covered.
pub type AlphaMask = GrayImage;

/// Smallest font size chosen by [`FontSize::Auto`].
pub const MIN_AUTO_FONT_SIZE: u32 = 12;

/// Fraction of the canvas' shorter side used by [`FontSize::Auto`].
pub const AUTO_FONT_RATIO: f64 = 0.05;

/// Glyph cell size of the built-in bitmap font.
const BITMAP_CELL: u32 = 8;

/// Requested text size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontSize {
    /// `max(12, floor(0.05 * min(canvas width, canvas height)))`.
    #[default]
    Auto,
    /// An explicit pixel size.
    Px(u32),
}

impl FontSize {
    /// Resolve to a concrete pixel size for a canvas of the given dimensions.
    #[must_use]
    pub fn resolve(self, canvas: (u32, u32)) -> u32 {
        match self {
            Self::Px(px) => px,
            Self::Auto => {
                let short = f64::from(canvas.0.min(canvas.1));
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let scaled = (short * AUTO_FONT_RATIO).floor() as u32;
                scaled.max(MIN_AUTO_FONT_SIZE)
            }
        }
    }
}

impl From<Option<u32>> for FontSize {
    fn from(px: Option<u32>) -> Self {
        px.map_or(Self::Auto, Self::Px)
    }
}

/// Where glyph shapes come from.
#[derive(Clone, Default)]
pub enum FontSource {
    /// Built-in 8x8 bitmap font, scaled by whole multiples.
    #[default]
    Builtin,
    /// A TrueType/OpenType font loaded at runtime.
    TrueType(Arc<FontVec>),
}

impl fmt::Debug for FontSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str("Builtin"),
            Self::TrueType(font) => f
                .debug_struct("TrueType")
                .field("glyphs", &font.glyph_count())
                .finish(),
        }
    }
}

impl FontSource {
    /// Load a TrueType font from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Font`] if the bytes are not a parseable font.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let font = FontVec::try_from_vec(bytes).map_err(|e| Error::Font(e.to_string()))?;
        Ok(Self::TrueType(Arc::new(font)))
    }

    /// Load a TrueType font from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Font`] if
    /// it is not a parseable font.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Rasterize `text` at `font_size` pixels into a tightly sized mask.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWatermark`] if `text` is empty or `font_size` is 0.
    pub fn rasterize(&self, text: &str, font_size: u32) -> Result<AlphaMask> {
        if text.is_empty() {
            return Err(Error::InvalidWatermark("cannot render empty text".to_string()));
        }
        if font_size == 0 {
            return Err(Error::InvalidWatermark("font size must be positive".to_string()));
        }
        match self {
            Self::Builtin => Ok(rasterize_bitmap(text, font_size)),
            Self::TrueType(font) => Ok(rasterize_outline(font, text, font_size)),
        }
    }
}

fn bitmap_glyph(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

fn rasterize_bitmap(text: &str, font_size: u32) -> AlphaMask {
    let scale = (font_size / BITMAP_CELL).max(1);
    let cell = BITMAP_CELL * scale;
    #[allow(clippy::cast_possible_truncation)]
    let chars = text.chars().count() as u32;
    let mut mask = AlphaMask::new(chars * cell, cell);

    for (i, c) in (0u32..).zip(text.chars()) {
        let origin_x = i * cell;
        for (row, bits) in (0u32..).zip(bitmap_glyph(c)) {
            for col in 0..BITMAP_CELL {
                // bit 0 is the leftmost column
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        mask.put_pixel(origin_x + col * scale + dx, row * scale + dy, Luma([255]));
                    }
                }
            }
        }
    }
    mask
}

/// Advance width of `text` including kerning.
fn advance_width<F: Font>(font: &F, scale: PxScale, text: &str) -> f32 {
    let scaled = font.as_scaled(scale);
    let mut width = 0.0f32;
    let mut prev: Option<GlyphId> = None;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        prev = Some(id);
    }
    width
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
fn rasterize_outline(font: &FontVec, text: &str, font_size: u32) -> AlphaMask {
    let scale = PxScale::from(font_size as f32);
    let scaled = font.as_scaled(scale);

    let width = (advance_width(font, scale, text).ceil() as u32).max(1);
    let height = (scaled.height().ceil() as u32).max(1);
    let mut mask = AlphaMask::new(width, height);

    let baseline = scaled.ascent();
    let mut cursor_x = 0.0f32;
    let mut prev: Option<GlyphId> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            cursor_x += scaled.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(scale, ab_glyph::point(cursor_x, baseline));

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = bounds.min.x as i32 + gx as i32;
                let y = bounds.min.y as i32 + gy as i32;
                if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                    return;
                }
                let value = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
                // overlapping glyph edges keep the stronger coverage
                let px = mask.get_pixel_mut(x as u32, y as u32);
                px[0] = px[0].max(value);
            });
        }

        cursor_x += scaled.h_advance(id);
        prev = Some(id);
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_font_size_scales_with_canvas() {
        assert_eq!(FontSize::Auto.resolve((100, 100)), 12);
        assert_eq!(FontSize::Auto.resolve((1000, 800)), 40);
        assert_eq!(FontSize::Auto.resolve((4000, 259)), 12);
        assert_eq!(FontSize::Auto.resolve((4000, 260)), 13);
        assert_eq!(FontSize::Px(48).resolve((10, 10)), 48);
    }

    #[test]
    fn font_size_from_option() {
        assert_eq!(FontSize::from(None), FontSize::Auto);
        assert_eq!(FontSize::from(Some(30)), FontSize::Px(30));
    }

    #[test]
    fn bitmap_mask_dimensions_follow_scale() {
        let font = FontSource::Builtin;
        let mask = font.rasterize("AB", 16).unwrap();
        assert_eq!(mask.dimensions(), (32, 16));
        let small = font.rasterize("AB", 5).unwrap();
        assert_eq!(small.dimensions(), (16, 8));
    }

    #[test]
    fn bitmap_mask_is_binary_and_nonempty() {
        let mask = FontSource::Builtin.rasterize("Hi", 24).unwrap();
        assert!(mask.pixels().any(|p| p[0] == 255));
        assert!(mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn space_renders_transparent() {
        let mask = FontSource::Builtin.rasterize("  ", 8).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn unknown_glyph_falls_back_to_question_mark() {
        let font = FontSource::Builtin;
        let unknown = font.rasterize("\u{4e2d}", 8).unwrap();
        let question = font.rasterize("?", 8).unwrap();
        assert_eq!(unknown, question);
    }

    #[test]
    fn empty_text_is_invalid() {
        assert!(matches!(
            FontSource::Builtin.rasterize("", 12),
            Err(Error::InvalidWatermark(_))
        ));
        assert!(matches!(
            FontSource::Builtin.rasterize("x", 0),
            Err(Error::InvalidWatermark(_))
        ));
    }

    #[test]
    fn garbage_font_bytes_are_rejected() {
        assert!(matches!(
            FontSource::from_bytes(vec![0, 1, 2, 3]),
            Err(Error::Font(_))
        ));
    }

    #[test]
    fn missing_font_file_is_io_error() {
        assert!(matches!(
            FontSource::from_file(Path::new("/no/such/font.ttf")),
            Err(Error::Io(_))
        ));
    }
}
