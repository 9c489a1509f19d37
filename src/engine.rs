//! Request-level watermark embedding and detection.

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::RgbaImage;
use tracing::{debug, info};

use crate::codec::{self, DEFAULT_JPEG_QUALITY};
use crate::compositor;
use crate::error::{Error, Result};
use crate::layout::{Layout, Placement};
use crate::matcher::{MatchOptions, MatchResult, ScalePyramidMatcher};
use crate::text::{FontSize, FontSource};

/// Engine-wide settings injected at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Font used for text watermarks.
    pub font: FontSource,
    /// Quality (1-100) for JPEG output.
    pub jpeg_quality: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            font: FontSource::Builtin,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Options for a text watermark.
#[derive(Debug, Clone, PartialEq)]
pub struct TextWatermark {
    /// Text to draw.
    pub text: String,
    /// Opacity in `[0, 1]`.
    pub opacity: f32,
    /// Font size, or [`FontSize::Auto`] to derive it from the image size.
    pub font_size: FontSize,
    /// Single anchor or tiled.
    pub layout: Layout,
    /// Distance from the canvas edges and between tiles, in pixels.
    pub margin: u32,
}

impl Default for TextWatermark {
    fn default() -> Self {
        Self {
            text: "SAMPLE".to_string(),
            opacity: 0.25,
            font_size: FontSize::Auto,
            layout: Layout::default(),
            margin: 20,
        }
    }
}

/// Options for an image watermark.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageWatermark {
    /// Watermark width relative to the image's shorter side, in `(0, 1]`.
    pub scale: f32,
    /// Opacity in `[0, 1]`, multiplied into the watermark's own alpha.
    pub opacity: f32,
    /// Single anchor or tiled.
    pub layout: Layout,
    /// Distance from the canvas edges and between tiles, in pixels.
    pub margin: u32,
}

impl Default for ImageWatermark {
    fn default() -> Self {
        Self {
            scale: 0.18,
            opacity: 0.25,
            layout: Layout::default(),
            margin: 20,
        }
    }
}

fn check_opacity(opacity: f32) -> Result<()> {
    if (0.0..=1.0).contains(&opacity) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "opacity must be within [0, 1], got {opacity}"
        )))
    }
}

impl TextWatermark {
    /// Check parameters before any image is touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an out-of-range opacity or a zero
    /// font size and [`Error::InvalidWatermark`] for empty text.
    pub fn validate(&self) -> Result<()> {
        check_opacity(self.opacity)?;
        if self.text.is_empty() {
            return Err(Error::InvalidWatermark("watermark text is empty".to_string()));
        }
        if self.font_size == FontSize::Px(0) {
            return Err(Error::InvalidArgument("font size must be positive".to_string()));
        }
        Ok(())
    }
}

impl ImageWatermark {
    /// Check parameters before any image is touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an out-of-range scale or opacity.
    pub fn validate(&self) -> Result<()> {
        check_opacity(self.opacity)?;
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(Error::InvalidArgument(format!(
                "scale must be within (0, 1], got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// Watermark width for a canvas, `floor(min(width, height) * scale)`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn target_width(&self, canvas: (u32, u32)) -> u32 {
        let short = f64::from(canvas.0.min(canvas.1));
        (short * f64::from(self.scale)).floor() as u32
    }
}

/// Embeds watermarks and locates them again.
///
/// Holds no per-request state; one engine can serve any number of requests,
/// including concurrently.
#[derive(Debug, Clone, Default)]
pub struct WatermarkEngine {
    config: EngineConfig,
}

impl WatermarkEngine {
    /// Create an engine with the given configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Draw a text watermark onto `image` in place.
    ///
    /// Returns the placements the text was composited at, in draw order.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid (see [`TextWatermark::validate`]).
    pub fn apply_text(&self, image: &mut RgbaImage, wm: &TextWatermark) -> Result<Vec<Placement>> {
        wm.validate()?;
        let canvas = image.dimensions();
        let layer = compositor::render_text_layer(
            canvas,
            &wm.text,
            wm.font_size,
            wm.opacity,
            &self.config.font,
        )?;
        let placements = wm.layout.placements(canvas, layer.dimensions(), wm.margin);
        debug!(
            layer_w = layer.width(),
            layer_h = layer.height(),
            count = placements.len(),
            "compositing text layer"
        );
        compositor::blend_all(image, &layer, &placements);
        Ok(placements)
    }

    /// Draw an image watermark onto `image` in place.
    ///
    /// The watermark is resized to [`ImageWatermark::target_width`] with its
    /// aspect ratio preserved. Returns the placements used, in draw order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for invalid options and
    /// [`Error::InvalidWatermark`] if the watermark has (or resizes to) a zero
    /// dimension.
    pub fn apply_image(
        &self,
        image: &mut RgbaImage,
        watermark: &RgbaImage,
        wm: &ImageWatermark,
    ) -> Result<Vec<Placement>> {
        wm.validate()?;
        let canvas = image.dimensions();
        let layer =
            compositor::render_image_layer(watermark, wm.target_width(canvas), wm.opacity)?;
        let placements = wm.layout.placements(canvas, layer.dimensions(), wm.margin);
        debug!(
            layer_w = layer.width(),
            layer_h = layer.height(),
            count = placements.len(),
            "compositing image layer"
        );
        compositor::blend_all(image, &layer, &placements);
        Ok(placements)
    }

    /// Load `input`, draw a text watermark, and write the result to `output`.
    ///
    /// The output format follows the extension of `output`.
    ///
    /// # Errors
    ///
    /// Fails on invalid options, an undecodable input, or an encode failure.
    pub fn embed_text_watermark(
        &self,
        input: &Path,
        output: &Path,
        wm: &TextWatermark,
    ) -> Result<PathBuf> {
        wm.validate()?;
        let started = Instant::now();
        let mut image = codec::decode(input)?;
        let placements = self.apply_text(&mut image, wm)?;
        self.save(&image, output)?;
        info!(
            input = %input.display(),
            output = %output.display(),
            placements = placements.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "text watermark embedded"
        );
        Ok(output.to_path_buf())
    }

    /// Load `input` and `watermark`, draw the image watermark, and write the
    /// result to `output`.
    ///
    /// # Errors
    ///
    /// Fails on invalid options, an undecodable input or watermark, a
    /// degenerate watermark, or an encode failure.
    pub fn embed_image_watermark(
        &self,
        input: &Path,
        watermark: &Path,
        output: &Path,
        wm: &ImageWatermark,
    ) -> Result<PathBuf> {
        wm.validate()?;
        let started = Instant::now();
        let mut image = codec::decode(input)?;
        let mark = codec::decode(watermark)?;
        let placements = self.apply_image(&mut image, &mark, wm)?;
        self.save(&image, output)?;
        info!(
            input = %input.display(),
            watermark = %watermark.display(),
            output = %output.display(),
            placements = placements.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "image watermark embedded"
        );
        Ok(output.to_path_buf())
    }

    /// Search for the image at `template` inside the image at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the threshold lies outside
    /// `[-1, 1]` and [`Error::Decode`] if either file cannot be decoded.
    /// Finding no match is not an error: check [`MatchResult::best`].
    #[allow(clippy::unused_self)]
    pub fn detect(&self, target: &Path, template: &Path, opts: &MatchOptions) -> Result<MatchResult> {
        if !(-1.0..=1.0).contains(&opts.threshold) {
            return Err(Error::InvalidArgument(format!(
                "threshold must be within [-1, 1], got {}",
                opts.threshold
            )));
        }
        let target_img = codec::decode(target)?;
        let template_img = codec::decode(template)?;
        let result = self.detect_images(&target_img, &template_img, opts);
        info!(
            target = %target.display(),
            template = %template.display(),
            detected = result.is_detected(),
            "detection finished"
        );
        Ok(result)
    }

    /// Search for `template` inside `target`.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn detect_images(
        &self,
        target: &RgbaImage,
        template: &RgbaImage,
        opts: &MatchOptions,
    ) -> MatchResult {
        ScalePyramidMatcher::new(target, template).run(opts)
    }

    /// Encode `image` to `path`, creating the parent directory if needed.
    fn save(&self, image: &RgbaImage, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        codec::encode(image, path, self.config.jpeg_quality)
    }
}

/// Generate a default output path from an input path.
///
/// Example: `"photos/cat.jpg"` becomes `"photos/wm_cat.jpg"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let name = input.file_name().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("wm_{name}"))
}
