//! # Scalar Interpolation Helpers
//!
//! The handful of shader-style helpers every generator stage needs,
//! generic over `f32` and `f64` so the precision boundary between
//! noise (f64) and curve/mesh code (f32) stays explicit at call sites.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// Floating point scalar usable by the interpolation helpers.
pub trait Real:
    Copy
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Additive identity.
    const ZERO: Self;
    /// Multiplicative identity.
    const ONE: Self;
    /// Two.
    const TWO: Self;
    /// Three.
    const THREE: Self;

    /// Largest integer value less than or equal to `self`.
    #[must_use]
    fn floor(self) -> Self;
}

impl Real for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const TWO: Self = 2.0;
    const THREE: Self = 3.0;

    #[inline]
    fn floor(self) -> Self {
        f32::floor(self)
    }
}

impl Real for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const TWO: Self = 2.0;
    const THREE: Self = 3.0;

    #[inline]
    fn floor(self) -> Self {
        f64::floor(self)
    }
}

/// Fractional part, always in `[0, 1)` (`x - floor(x)`).
#[inline]
#[must_use]
pub fn frac<T: Real>(x: T) -> T {
    x - x.floor()
}

/// Linear interpolation from `a` to `b` by `t`.
#[inline]
#[must_use]
pub fn lerp<T: Real>(a: T, b: T, t: T) -> T {
    a + (b - a) * t
}

/// Inverse of [`lerp`]: where `x` lies between `a` and `b`.
///
/// Not clamped. Returns a non-finite value when `a == b`.
#[inline]
#[must_use]
pub fn unlerp<T: Real>(a: T, b: T, x: T) -> T {
    (x - a) / (b - a)
}

/// Clamps `x` into `[lo, hi]`.
#[inline]
#[must_use]
pub fn clamp<T: Real>(x: T, lo: T, hi: T) -> T {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

/// Clamps `x` into `[0, 1]`.
#[inline]
#[must_use]
pub fn clamp01<T: Real>(x: T) -> T {
    clamp(x, T::ZERO, T::ONE)
}

/// Hermite smoothstep between two edges.
#[inline]
#[must_use]
pub fn smoothstep<T: Real>(edge0: T, edge1: T, x: T) -> T {
    let t = clamp01(unlerp(edge0, edge1, x));
    t * t * (T::THREE - T::TWO * t)
}
