//! Multi-scale template matching.
//!
//! The template is converted to luminance and resized once per scale factor.
//! Each resized copy is slid over every valid top-left position in the target
//! and scored with a normalized correlation metric; the best position per scale
//! becomes a [`ScaleCandidate`]. Window statistics come from integral images so
//! only the cross term costs `O(template pixels)` per position.
//!
//! All metrics report scores where higher is better:
//!
//! | Metric | Range |
//! |---|---|
//! | [`Metric::CcoeffNormed`] | `[-1, 1]`, 1 = identical up to brightness/contrast |
//! | [`Metric::CcorrNormed`] | `[0, 1]` for non-negative luminance |
//! | [`Metric::SqdiffNormed`] | `1 - normalized SSD`, clamped to `[-1, 1]` |
//!
//! Windows or templates without variance score 0 under `CcoeffNormed`.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::{luminance, LumaImage};
use crate::error::Error;

/// Scale factors tried when none are given.
pub const DEFAULT_SCALES: [f64; 5] = [0.6, 0.8, 1.0, 1.2, 1.4];

/// Default score threshold for [`MatchResult::good_matches`].
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Resized templates narrower or shorter than this are skipped.
pub const MIN_TEMPLATE_SIDE: u32 = 8;

/// Relative variance below which a window counts as flat.
const FLAT_EPSILON: f64 = 1e-9;

/// Similarity metric used to score a template window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// Zero-mean normalized cross-correlation.
    #[default]
    CcoeffNormed,
    /// Normalized cross-correlation without mean removal.
    CcorrNormed,
    /// Normalized sum of squared differences, reported as `1 - value`.
    SqdiffNormed,
}

impl Metric {
    /// Keyword accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CcoeffNormed => "ccoeff_normed",
            Self::CcorrNormed => "ccorr_normed",
            Self::SqdiffNormed => "sqdiff_normed",
        }
    }

    /// Turn window statistics into a higher-is-better score.
    ///
    /// `cross` is the correlation of the window with the template weights
    /// (mean-removed for `CcoeffNormed`, raw otherwise).
    fn score(self, cross: f64, window: WindowStats, tpl: &TemplateStats) -> f64 {
        let score = match self {
            Self::CcoeffNormed => {
                let var_i = window.sum_sq - window.sum * window.sum / tpl.n;
                if var_i <= FLAT_EPSILON * window.sum_sq.max(1.0) || tpl.var <= f64::EPSILON {
                    return 0.0;
                }
                cross / (tpl.var * var_i).sqrt()
            }
            Self::CcorrNormed => {
                let denom = (tpl.sum_sq * window.sum_sq).sqrt();
                if denom <= f64::EPSILON {
                    return 0.0;
                }
                cross / denom
            }
            Self::SqdiffNormed => {
                let ssd = (tpl.sum_sq - 2.0 * cross + window.sum_sq).max(0.0);
                let denom = (tpl.sum_sq * window.sum_sq).sqrt();
                let normalized = if denom <= f64::EPSILON {
                    if ssd <= f64::EPSILON {
                        0.0
                    } else {
                        1.0
                    }
                } else {
                    ssd / denom
                };
                1.0 - normalized
            }
        };
        score.clamp(-1.0, 1.0)
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ccoeff_normed" => Ok(Self::CcoeffNormed),
            "ccorr_normed" => Ok(Self::CcorrNormed),
            "sqdiff_normed" => Ok(Self::SqdiffNormed),
            other => Err(Error::UnsupportedOperation(format!(
                "unknown metric `{other}` (expected ccoeff_normed, ccorr_normed or sqdiff_normed)"
            ))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options controlling a multi-scale search.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOptions {
    /// Scale factors applied to the template, evaluated in this order.
    pub scales: Vec<f64>,
    /// Minimum score for a candidate to appear in `good_matches`.
    pub threshold: f64,
    /// Similarity metric.
    pub metric: Metric,
    /// Evaluate scales concurrently when the `parallel` feature is enabled.
    pub parallel: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            scales: DEFAULT_SCALES.to_vec(),
            threshold: DEFAULT_THRESHOLD,
            metric: Metric::default(),
            parallel: true,
        }
    }
}

/// Best location of the template at one scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleCandidate {
    /// Scale factor applied to the template.
    pub scale: f64,
    /// Peak score at this scale (higher is better).
    pub score: f64,
    /// Top-left corner of the matched window.
    pub top_left: (u32, u32),
    /// Exclusive bottom-right corner of the matched window.
    pub bottom_right: (u32, u32),
    /// Template size `(width, height)` at this scale.
    pub template_size: (u32, u32),
}

/// Ranked outcome of a multi-scale search.
///
/// An empty `matches` list with `best == None` means no scale could be
/// evaluated; that is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Highest-scoring candidate, if any scale produced one.
    pub best: Option<ScaleCandidate>,
    /// All candidates, sorted by descending score (ties keep scale order).
    pub matches: Vec<ScaleCandidate>,
    /// The candidates of `matches` scoring at least the threshold.
    pub good_matches: Vec<ScaleCandidate>,
    /// Template size `(width, height)` before scaling.
    pub template_size_original: (u32, u32),
    /// Target image size `(width, height)`.
    pub image_size: (u32, u32),
}

impl MatchResult {
    /// Whether any candidate reached the threshold.
    #[must_use]
    pub fn is_detected(&self) -> bool {
        !self.good_matches.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowStats {
    sum: f64,
    sum_sq: f64,
}

struct TemplateStats {
    n: f64,
    sum_sq: f64,
    /// Sum of squared deviations from the mean.
    var: f64,
}

/// Summed-area tables of the target and its square, `(w + 1) x (h + 1)`.
struct IntegralImage {
    stride: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl IntegralImage {
    fn new(img: &LumaImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sum_sq = vec![0.0; stride * (h + 1)];
        let raw = img.as_raw();

        for y in 0..h {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = f64::from(raw[y * w + x]);
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row;
                sum_sq[idx] = sum_sq[idx - stride] + row_sq;
            }
        }
        Self {
            stride,
            sum,
            sum_sq,
        }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> WindowStats {
        let s = self.stride;
        let rect = |t: &[f64]| {
            t[(y + h) * s + x + w] - t[y * s + x + w] - t[(y + h) * s + x] + t[y * s + x]
        };
        WindowStats {
            sum: rect(&self.sum),
            sum_sq: rect(&self.sum_sq),
        }
    }
}

/// Template matcher holding a prepared target and template.
///
/// The target's integral images are built once and shared by every scale.
pub struct ScalePyramidMatcher {
    target: LumaImage,
    integral: IntegralImage,
    template: LumaImage,
}

impl fmt::Debug for ScalePyramidMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalePyramidMatcher")
            .field("target", &self.target.dimensions())
            .field("template", &self.template.dimensions())
            .finish_non_exhaustive()
    }
}

impl ScalePyramidMatcher {
    /// Prepare a matcher from RGBA images. Alpha is ignored.
    #[must_use]
    pub fn new(target: &RgbaImage, template: &RgbaImage) -> Self {
        Self::from_luma(luminance(target), luminance(template))
    }

    /// Prepare a matcher from luminance images.
    #[must_use]
    pub fn from_luma(target: LumaImage, template: LumaImage) -> Self {
        let integral = IntegralImage::new(&target);
        Self {
            target,
            integral,
            template,
        }
    }

    /// Score the template at one scale, or `None` if the scale is unusable.
    #[must_use]
    pub fn evaluate_scale(&self, scale: f64, metric: Metric) -> Option<ScaleCandidate> {
        let (tw, th) = self.template.dimensions();
        let (iw, ih) = self.target.dimensions();
        let new_w = scaled_side(tw, scale);
        let new_h = scaled_side(th, scale);

        if new_w < MIN_TEMPLATE_SIDE || new_h < MIN_TEMPLATE_SIDE {
            debug!(scale, new_w, new_h, "skipping scale: template too small");
            return None;
        }
        if new_w > iw || new_h > ih {
            debug!(scale, new_w, new_h, iw, ih, "skipping scale: template larger than image");
            return None;
        }

        let resized = if (new_w, new_h) == (tw, th) {
            self.template.clone()
        } else {
            imageops::resize(&self.template, new_w, new_h, FilterType::Triangle)
        };
        let (score, (x, y)) = self.search(&resized, metric);
        debug!(scale, score, x, y, "scored scale");

        Some(ScaleCandidate {
            scale,
            score,
            top_left: (x, y),
            bottom_right: (x + new_w, y + new_h),
            template_size: (new_w, new_h),
        })
    }

    /// Exhaustive search returning the first position with the highest score
    /// in row-major order.
    #[allow(clippy::cast_possible_truncation)]
    fn search(&self, tpl: &LumaImage, metric: Metric) -> (f64, (u32, u32)) {
        let (tw, th) = (tpl.width() as usize, tpl.height() as usize);
        let (iw, ih) = (self.target.width() as usize, self.target.height() as usize);
        let target = self.target.as_raw();

        #[allow(clippy::cast_precision_loss)]
        let n = (tw * th) as f64;
        let values: Vec<f64> = tpl.as_raw().iter().map(|&v| f64::from(v)).collect();
        let sum: f64 = values.iter().sum();
        let mean = sum / n;
        let sum_sq: f64 = values.iter().map(|v| v * v).sum();
        let var: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        let stats = TemplateStats { n, sum_sq, var };

        let weights: Vec<f64> = match metric {
            Metric::CcoeffNormed => values.iter().map(|v| v - mean).collect(),
            Metric::CcorrNormed | Metric::SqdiffNormed => values,
        };

        let mut best_score = f64::NEG_INFINITY;
        let mut best_loc = (0usize, 0usize);
        for y in 0..=(ih - th) {
            for x in 0..=(iw - tw) {
                let mut cross = 0.0;
                for ty in 0..th {
                    let row = &target[(y + ty) * iw + x..][..tw];
                    let w_row = &weights[ty * tw..][..tw];
                    cross += row
                        .iter()
                        .zip(w_row)
                        .map(|(&a, &b)| f64::from(a) * b)
                        .sum::<f64>();
                }
                let score = metric.score(cross, self.integral.window(x, y, tw, th), &stats);
                if score > best_score {
                    best_score = score;
                    best_loc = (x, y);
                }
            }
        }
        (best_score, (best_loc.0 as u32, best_loc.1 as u32))
    }

    fn evaluate_all(&self, opts: &MatchOptions) -> Vec<ScaleCandidate> {
        #[cfg(feature = "parallel")]
        {
            if opts.parallel {
                use rayon::prelude::*;
                let per_scale: Vec<Option<ScaleCandidate>> = opts
                    .scales
                    .par_iter()
                    .map(|&scale| self.evaluate_scale(scale, opts.metric))
                    .collect();
                return per_scale.into_iter().flatten().collect();
            }
        }

        opts.scales
            .iter()
            .filter_map(|&scale| self.evaluate_scale(scale, opts.metric))
            .collect()
    }

    /// Run the search over every scale and rank the candidates.
    ///
    /// Ranking depends only on score and the order of `opts.scales`, never on
    /// which worker finished first.
    #[must_use]
    pub fn run(&self, opts: &MatchOptions) -> MatchResult {
        let started = Instant::now();
        let mut matches = self.evaluate_all(opts);
        // stable: equal scores keep scale order
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));

        let best = matches.first().cloned();
        let good_matches: Vec<ScaleCandidate> = matches
            .iter()
            .filter(|m| m.score >= opts.threshold)
            .cloned()
            .collect();

        info!(
            scales = opts.scales.len(),
            candidates = matches.len(),
            good = good_matches.len(),
            best_score = best.as_ref().map(|b| b.score),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "template search finished"
        );

        MatchResult {
            best,
            matches,
            good_matches,
            template_size_original: self.template.dimensions(),
            image_size: self.target.dimensions(),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_side(side: u32, scale: f64) -> u32 {
    // NaN and negative scales saturate to 0 and are skipped as too small
    (f64::from(side) * scale).round() as u32
}

/// Locate `template` inside `target` across `opts.scales`.
#[must_use]
pub fn match_template(target: &RgbaImage, template: &RgbaImage, opts: &MatchOptions) -> MatchResult {
    ScalePyramidMatcher::new(target, template).run(opts)
}
