//! Layer rendering and alpha compositing.
//!
//! Layers are straight (non-premultiplied) RGBA images. They are composited
//! onto the background with the Porter-Duff "over" operator:
//!
//! ```text
//! out_a   = fg_a + bg_a * (1 - fg_a)
//! out_rgb = (fg_rgb * fg_a + bg_rgb * bg_a * (1 - fg_a)) / out_a
//! ```
//!
//! For an opaque background this reduces to
//! `out_rgb = fg_rgb * fg_a + bg_rgb * (1 - fg_a)`.

use image::imageops::{self, FilterType};
use image::{Rgb, Rgba, RgbaImage};

use crate::error::{Error, Result};
use crate::layout::Placement;
use crate::text::{AlphaMask, FontSize, FontSource};

/// Color used for text watermarks.
pub const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Convert an opacity in `[0, 1]` to an 8-bit alpha, `round(255 * opacity)`.
#[must_use]
pub fn opacity_to_alpha(opacity: f32) -> u8 {
    scale_channel(255, opacity)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_channel(value: u8, factor: f32) -> u8 {
    (f32::from(value) * factor.clamp(0.0, 1.0)).round() as u8
}

/// Build a solid-color layer whose alpha is the mask scaled by `opacity`.
///
/// A fully covered mask pixel ends up with alpha `round(255 * opacity)`.
#[must_use]
pub fn layer_from_mask(mask: &AlphaMask, color: Rgb<u8>, opacity: f32) -> RgbaImage {
    RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
        let coverage = mask.get_pixel(x, y)[0];
        Rgba([
            color[0],
            color[1],
            color[2],
            scale_channel(coverage, opacity),
        ])
    })
}

/// Render `text` as a white layer on a transparent background.
///
/// The font size is resolved against `canvas` so [`FontSize::Auto`] scales
/// with the image being watermarked. The layer is sized to the text's bounding
/// box; use [`crate::layout`] to position it.
///
/// # Errors
///
/// Returns [`Error::InvalidWatermark`] for empty text or a zero font size.
pub fn render_text_layer(
    canvas: (u32, u32),
    text: &str,
    font_size: FontSize,
    opacity: f32,
    font: &FontSource,
) -> Result<RgbaImage> {
    let px = font_size.resolve(canvas);
    let mask = font.rasterize(text, px)?;
    Ok(layer_from_mask(&mask, TEXT_COLOR, opacity))
}

/// Multiply every pixel's alpha by `opacity`, keeping relative transparency.
pub fn scale_alpha(layer: &mut RgbaImage, opacity: f32) {
    for px in layer.pixels_mut() {
        px[3] = scale_channel(px[3], opacity);
    }
}

/// Resize a watermark image to `target_width`, preserving aspect ratio, and
/// scale its alpha channel by `opacity`.
///
/// The target height is `round(source_height * target_width / source_width)`.
/// Resampling uses a Lanczos3 filter.
///
/// # Errors
///
/// Returns [`Error::InvalidWatermark`] if the source has a zero dimension or the
/// resized watermark would collapse to zero pixels.
pub fn render_image_layer(
    watermark: &RgbaImage,
    target_width: u32,
    opacity: f32,
) -> Result<RgbaImage> {
    let (src_w, src_h) = watermark.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(Error::InvalidWatermark(format!(
            "watermark image has zero dimension ({src_w}x{src_h})"
        )));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let target_height =
        (f64::from(src_h) * f64::from(target_width) / f64::from(src_w)).round() as u32;
    if target_width == 0 || target_height == 0 {
        return Err(Error::InvalidWatermark(format!(
            "watermark {src_w}x{src_h} collapses to {target_width}x{target_height}"
        )));
    }

    let mut layer = if (target_width, target_height) == (src_w, src_h) {
        watermark.clone()
    } else {
        imageops::resize(watermark, target_width, target_height, FilterType::Lanczos3)
    };
    scale_alpha(&mut layer, opacity);
    Ok(layer)
}

/// Composite one pixel over another.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend_pixel(background: Rgba<u8>, foreground: Rgba<u8>) -> Rgba<u8> {
    match foreground[3] {
        0 => return background,
        255 => return foreground,
        _ => {}
    }

    let fg_a = f32::from(foreground[3]) / 255.0;
    let bg_a = f32::from(background[3]) / 255.0;
    let out_a = fg_a + bg_a * (1.0 - fg_a);

    let channel = |fg: u8, bg: u8| -> u8 {
        let fg = f32::from(fg) / 255.0;
        let bg = f32::from(bg) / 255.0;
        let out = (fg * fg_a + bg * bg_a * (1.0 - fg_a)) / out_a;
        (out * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(foreground[0], background[0]),
        channel(foreground[1], background[1]),
        channel(foreground[2], background[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Composite `foreground` over `background` with its top-left at `placement`.
///
/// Parts of the foreground outside the background are clipped.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn blend(background: &mut RgbaImage, foreground: &RgbaImage, placement: Placement) {
    let (bg_w, bg_h) = (i64::from(background.width()), i64::from(background.height()));
    let (fg_w, fg_h) = (i64::from(foreground.width()), i64::from(foreground.height()));

    let x_start = placement.x.max(0);
    let y_start = placement.y.max(0);
    let x_end = (placement.x + fg_w).min(bg_w);
    let y_end = (placement.y + fg_h).min(bg_h);
    if x_start >= x_end || y_start >= y_end {
        return;
    }

    // coordinates below lie inside both images
    for ty in y_start..y_end {
        for tx in x_start..x_end {
            let fg = *foreground.get_pixel((tx - placement.x) as u32, (ty - placement.y) as u32);
            let bg = background.get_pixel_mut(tx as u32, ty as u32);
            *bg = blend_pixel(*bg, fg);
        }
    }
}

/// Composite `foreground` at every placement, in order.
///
/// Later placements composite over the result of earlier ones.
pub fn blend_all(background: &mut RgbaImage, foreground: &RgbaImage, placements: &[Placement]) {
    for &placement in placements {
        blend(background, foreground, placement);
    }
}
