//! # Height Curves
//!
//! Cubic Hermite splines over sorted keyframes, used by every biome to remap
//! raw noise height. Keyframes are flattened into four parallel arrays once,
//! then evaluated read-only from any number of workers.
//!
//! ## Boundary Behavior
//!
//! - `point <= x[0]` returns `y[0]`
//! - `point >= x[last]` returns `y[last - 1]`, the second-to-last value
//!
//! The right clamp is kept as-is because existing biome curves are authored
//! against it. Curves that need a flat right edge repeat their last value.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{GenError, GenResult};

/// One editable curve point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Keyframe {
    /// Position along the curve.
    pub time: f32,
    /// Value at `time`.
    pub value: f32,
    /// Slope arriving at this key.
    pub in_tangent: f32,
    /// Slope leaving this key.
    pub out_tangent: f32,
}

impl Keyframe {
    /// Creates a keyframe.
    #[inline]
    #[must_use]
    pub const fn new(time: f32, value: f32, in_tangent: f32, out_tangent: f32) -> Self {
        Self {
            time,
            value,
            in_tangent,
            out_tangent,
        }
    }

    /// Keyframe with zero tangents.
    #[inline]
    #[must_use]
    pub const fn flat(time: f32, value: f32) -> Self {
        Self::new(time, value, 0.0, 0.0)
    }
}

/// Flattened, validated Hermite curve.
#[derive(Clone, Debug, PartialEq)]
pub struct Curve {
    x: Vec<f32>,
    y: Vec<f32>,
    tangent_in: Vec<f32>,
    tangent_out: Vec<f32>,
}

impl Curve {
    /// Flattens keyframes into a curve.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::CurveTooShort`] for fewer than two keys and
    /// [`GenError::CurveNotIncreasing`] if times are not strictly increasing.
    pub fn new(keys: &[Keyframe]) -> GenResult<Self> {
        if keys.len() < 2 {
            return Err(GenError::CurveTooShort(keys.len()));
        }
        for (index, pair) in keys.windows(2).enumerate() {
            // NaN compares as None and is rejected too
            if pair[1].time.partial_cmp(&pair[0].time) != Some(Ordering::Greater) {
                return Err(GenError::CurveNotIncreasing {
                    index: index + 1,
                    x: pair[1].time,
                });
            }
        }

        Ok(Self {
            x: keys.iter().map(|k| k.time).collect(),
            y: keys.iter().map(|k| k.value).collect(),
            tangent_in: keys.iter().map(|k| k.in_tangent).collect(),
            tangent_out: keys.iter().map(|k| k.out_tangent).collect(),
        })
    }

    /// Maps `[-1, 1]` onto itself and holds 1 above it.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            x: vec![-1.0, 1.0, 2.0],
            y: vec![-1.0, 1.0, 1.0],
            tangent_in: vec![1.0, 1.0, 0.0],
            tangent_out: vec![1.0, 0.0, 0.0],
        }
    }

    /// Number of keyframes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Always false: a curve has at least two keyframes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Keyframes this curve was built from.
    #[must_use]
    pub fn keyframes(&self) -> Vec<Keyframe> {
        (0..self.len())
            .map(|i| Keyframe::new(self.x[i], self.y[i], self.tangent_in[i], self.tangent_out[i]))
            .collect()
    }

    /// Evaluates the curve at `point`.
    #[must_use]
    pub fn evaluate(&self, point: f32) -> f32 {
        if point <= self.x[0] {
            return self.y[0];
        }

        let last = self.x.len() - 1;
        if point >= self.x[last] {
            return self.y[last - 1];
        }

        // Rightmost key at or before the point
        let mut left = 0;
        for i in 0..last {
            if self.x[i] <= point {
                left = i;
            }
        }
        let right = left + 1;

        hermite(
            [self.x[left], self.x[right]],
            point,
            [self.y[left], self.y[right]],
            [self.tangent_out[left], self.tangent_in[right]],
        )
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::identity()
    }
}

/// Cubic Hermite interpolation on one interval.
#[inline]
fn hermite(x: [f32; 2], point: f32, y: [f32; 2], tangents: [f32; 2]) -> f32 {
    let dx = x[1] - x[0];
    let t = (point - x[0]) / dx;
    let t2 = t * t;
    let t3 = t2 * t;

    // [t^3, t^2, t, 1] * [[2,-2,1,1], [-3,3,-2,-1], [0,0,1,0], [1,0,0,0]]
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h10 = t3 - 2.0 * t2 + t;
    let h11 = t3 - t2;

    h00 * y[0] + h01 * y[1] + h10 * tangents[0] * dx + h11 * tangents[1] * dx
}
