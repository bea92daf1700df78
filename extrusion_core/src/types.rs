//! Small value types shared by the detector, the scorer and equipment data.

use serde::{Deserialize, Serialize};

/// Closed interval `[min, max]` describing normal operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalRange {
    pub min: f64,
    pub max: f64,
}

impl NormalRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Symmetric range around `center`.
    pub fn around(center: f64, half_width: f64) -> Self {
        Self::new(center - half_width, center + half_width)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    #[inline]
    pub fn midpoint(&self) -> f64 {
        (self.max + self.min) / 2.0
    }

    #[inline]
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    /// Distance of `v` outside the range; 0 when inside.
    pub fn excess(&self, v: f64) -> f64 {
        if v < self.min {
            self.min - v
        } else if v > self.max {
            v - self.max
        } else {
            0.0
        }
    }
}

/// Allowed deviation from a target, expressed as offsets (`min` is usually negative).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub min: f64,
    pub max: f64,
}

impl Tolerance {
    pub const fn symmetric(half_width: f64) -> Self {
        Self {
            min: -half_width,
            max: half_width,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Specification limits `(LSL, USL)` around `target`.
    pub fn limits_around(&self, target: f64) -> (f64, f64) {
        (target + self.min, target + self.max)
    }
}
