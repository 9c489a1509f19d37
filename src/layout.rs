//! Placement of watermark layers on a canvas.
//!
//! A layer is either pinned to one of five named anchors or repeated as a
//! row-major tile grid. Coordinates are top-left corners in canvas pixels and
//! are never clamped: a layer larger than the canvas yields negative or
//! partially off-canvas placements, which the compositor clips.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A named canvas position used to place a single layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    /// `(W - w - m, H - h - m)`
    #[default]
    BottomRight,
    /// `(m, H - h - m)`
    BottomLeft,
    /// `(m, m)`
    TopLeft,
    /// `(W - w - m, m)`
    TopRight,
    /// `((W - w) / 2, (H - h) / 2)`, margin ignored.
    Center,
}

impl Anchor {
    /// Keyword accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BottomRight => "bottom_right",
            Self::BottomLeft => "bottom_left",
            Self::TopLeft => "top_left",
            Self::TopRight => "top_right",
            Self::Center => "center",
        }
    }
}

impl FromStr for Anchor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bottom_right" => Ok(Self::BottomRight),
            "bottom_left" => Ok(Self::BottomLeft),
            "top_left" => Ok(Self::TopLeft),
            "top_right" => Ok(Self::TopRight),
            "center" => Ok(Self::Center),
            other => Err(Error::UnsupportedOperation(format!(
                "unknown anchor `{other}` (expected bottom_right, bottom_left, top_left, top_right or center)"
            ))),
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-left corner where a layer is pasted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Horizontal offset; may be negative.
    pub x: i64,
    /// Vertical offset; may be negative.
    pub y: i64,
}

impl Placement {
    /// Create a placement at `(x, y)`.
    #[must_use]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// How a layer is distributed over the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// A single copy at the given anchor.
    Anchored(Anchor),
    /// Repeated across the canvas, spaced by the margin.
    Tiled,
}

impl Default for Layout {
    fn default() -> Self {
        Self::Anchored(Anchor::default())
    }
}

impl Layout {
    /// Resolve the placement set for a layer of `layer` size on a `canvas`.
    #[must_use]
    pub fn placements(self, canvas: (u32, u32), layer: (u32, u32), margin: u32) -> Vec<Placement> {
        match self {
            Self::Anchored(anchor) => vec![place_single(canvas, layer, anchor, margin)],
            Self::Tiled => place_tiled(canvas, layer, margin),
        }
    }
}

/// Compute the placement of a single layer at `anchor`.
///
/// `Center` uses floor division so odd differences round toward the top-left,
/// including when the layer is larger than the canvas.
#[must_use]
pub fn place_single(canvas: (u32, u32), layer: (u32, u32), anchor: Anchor, margin: u32) -> Placement {
    let (cw, ch) = (i64::from(canvas.0), i64::from(canvas.1));
    let (lw, lh) = (i64::from(layer.0), i64::from(layer.1));
    let m = i64::from(margin);

    match anchor {
        Anchor::BottomRight => Placement::new(cw - lw - m, ch - lh - m),
        Anchor::BottomLeft => Placement::new(m, ch - lh - m),
        Anchor::TopLeft => Placement::new(m, m),
        Anchor::TopRight => Placement::new(cw - lw - m, m),
        Anchor::Center => Placement::new((cw - lw).div_euclid(2), (ch - lh).div_euclid(2)),
    }
}

/// Compute a row-major tile grid starting at `(margin, margin)`.
///
/// Steps are `layer + margin` on each axis; a row ends once `x >= canvas width`
/// and the grid ends once `y >= canvas height`. Tiles at the right and bottom
/// edges may extend past the canvas. A layer with zero width or height covers
/// nothing and yields no tiles.
#[must_use]
pub fn place_tiled(canvas: (u32, u32), layer: (u32, u32), margin: u32) -> Vec<Placement> {
    if layer.0 == 0 || layer.1 == 0 {
        return Vec::new();
    }
    let (cw, ch) = (i64::from(canvas.0), i64::from(canvas.1));
    let m = i64::from(margin);
    let step_x = i64::from(layer.0) + m;
    let step_y = i64::from(layer.1) + m;

    let mut positions = Vec::new();
    let mut y = m;
    while y < ch {
        let mut x = m;
        while x < cw {
            positions.push(Placement::new(x, y));
            x += step_x;
        }
        y += step_y;
    }
    positions
}
