//! Boundary positions: the reveal line between the base and overlay images.

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Horizontal location of the reveal line as a percentage of canvas width.
///
/// Always within `[0, 100]` and never NaN. Every constructor clamps.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct BoundaryPosition(f64);

impl BoundaryPosition {
    pub const MIN: BoundaryPosition = BoundaryPosition(0.0);
    pub const CENTER: BoundaryPosition = BoundaryPosition(50.0);
    pub const MAX: BoundaryPosition = BoundaryPosition(100.0);

    /// Create a position from a percentage, clamping into `[0, 100]`.
    /// NaN maps to 0.
    pub fn new(percent: f64) -> Self {
        if percent.is_nan() {
            return Self::MIN;
        }
        Self(percent.clamp(0.0, 100.0))
    }

    /// Create a position from a fraction of the width (`0.0..=1.0`).
    pub fn from_fraction(fraction: f64) -> Self {
        Self::new(fraction * 100.0)
    }

    pub fn percent(self) -> f64 {
        self.0
    }

    pub fn fraction(self) -> f64 {
        self.0 / 100.0
    }

    /// Linearly interpolate towards `other`; `t` is clamped to `[0, 1]`.
    pub fn lerp(self, other: BoundaryPosition, t: f64) -> Self {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        Self::new(self.0 + (other.0 - self.0) * t)
    }

    /// Pixel column of the reveal edge on a canvas `width` pixels wide.
    pub fn edge_column(self, width: u32) -> u32 {
        let edge = (self.fraction() * width as f64).round() as u32;
        edge.min(width)
    }
}

impl Default for BoundaryPosition {
    fn default() -> Self {
        Self::CENTER
    }
}

impl From<f64> for BoundaryPosition {
    fn from(percent: f64) -> Self {
        Self::new(percent)
    }
}

impl From<BoundaryPosition> for f64 {
    fn from(position: BoundaryPosition) -> f64 {
        position.0
    }
}

impl fmt::Display for BoundaryPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

/// Which side of the boundary reveals the overlay image.
///
/// Shared by the compositor and the comparator view so both agree on which
/// image sits on which side of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealSide {
    /// Overlay visible left of the boundary (`x < edge`).
    #[default]
    Left,
    /// Overlay visible right of the boundary (`x >= edge`).
    Right,
}

impl RevealSide {
    /// Pixel columns in which the overlay is drawn.
    pub fn overlay_columns(self, edge: u32, width: u32) -> Range<u32> {
        let edge = edge.min(width);
        match self {
            RevealSide::Left => 0..edge,
            RevealSide::Right => edge..width,
        }
    }
}

/// Shared, atomically-read boundary position.
///
/// The comparator view writes it from input events; the recording controller
/// reads it once per tick. The value is stored as `f64` bits so a read never
/// observes a partial update.
#[derive(Debug, Clone)]
pub struct BoundaryHandle {
    bits: Arc<AtomicU64>,
}

impl BoundaryHandle {
    pub fn new(position: BoundaryPosition) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(position.percent().to_bits())),
        }
    }

    pub fn get(&self) -> BoundaryPosition {
        BoundaryPosition::new(f64::from_bits(self.bits.load(Ordering::Acquire)))
    }

    pub fn set(&self, position: BoundaryPosition) {
        self.bits
            .store(position.percent().to_bits(), Ordering::Release);
    }
}

impl Default for BoundaryHandle {
    fn default() -> Self {
        Self::new(BoundaryPosition::default())
    }
}
