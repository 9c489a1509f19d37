//! Embed visible watermarks into raster images and locate them again.
//!
//! Two embedding modes are supported: rendered text, and a second image
//! (typically a logo with transparency) resized relative to the target. Either
//! can be pinned to one of five anchors or tiled across the whole canvas, and
//! is alpha-composited with a configurable opacity.
//!
//! Detection runs normalized cross-correlation of a grayscale template against
//! a grayscale target at several template scales, and reports every scale's
//! best location ranked by score.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use watermark_probe::{TextWatermark, WatermarkEngine};
//!
//! let engine = WatermarkEngine::default();
//! engine
//!     .embed_text_watermark(
//!         Path::new("photo.jpg"),
//!         Path::new("wm_photo.jpg"),
//!         &TextWatermark::default(),
//!     )
//!     .expect("embedding failed");
//! ```
//!
//! # Detection
//!
//! ```no_run
//! use std::path::Path;
//! use watermark_probe::{MatchOptions, WatermarkEngine};
//!
//! let engine = WatermarkEngine::default();
//! let result = engine
//!     .detect(Path::new("wm_photo.jpg"), Path::new("logo.png"), &MatchOptions::default())
//!     .expect("detection failed");
//! if let Some(best) = &result.best {
//!     println!("best scale {} at {:?}, score {:.3}", best.scale, best.top_left, best.score);
//! }
//! ```

#![deny(missing_docs)]

pub mod codec;
pub mod compositor;
mod engine;
pub mod error;
pub mod layout;
pub mod matcher;
pub mod text;

pub use codec::{is_supported_image, OutputFormat};
pub use engine::{
    default_output_path, EngineConfig, ImageWatermark, TextWatermark, WatermarkEngine,
};
pub use error::{Error, Result};
pub use layout::{Anchor, Layout, Placement};
pub use matcher::{match_template, MatchOptions, MatchResult, Metric, ScaleCandidate};
pub use text::{FontSize, FontSource};
