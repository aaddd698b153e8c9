//! # Noise Primitives
//!
//! Stateless, deterministic coherent noise. Every function here is a pure
//! function of its input position: no permutation tables, no seeds, no
//! global state. Seeding happens one level up, by offsetting the sample
//! position per octave (see [`crate::fractal`]).
//!
//! ## Functions
//!
//! | Function      | Precision | Range (approx.) |
//! |---------------|-----------|-----------------|
//! | [`value1d`]   | f32       | `[0, 1)`        |
//! | [`sample1d`]  | f32       | `[0, 1)`        |
//! | [`fractal1d`] | f32       | `[0, 1)`        |
//! | [`value2d`]   | f64       | `[0, 1)`        |
//! | [`simplex2d`] | f64       | `[-1, 1]`       |
//! | [`simplex3d`] | f64       | `[-1, 1]`       |
//!
//! The 1D family runs in `f32` because it only feeds the island mask radius.
//! The 2D/3D family runs in `f64` so positions far from the origin keep
//! their precision.
//!
//! ## Determinism Guarantee
//!
//! Same input, same output, bit for bit, on any thread.

use tessera_core::math::{frac, lerp, smoothstep};

// =============================================================================
// 1D VALUE NOISE
// =============================================================================

/// Scrambled pseudo-random value for a 1D lattice point.
#[inline]
#[must_use]
pub fn value1d(x: f32) -> f32 {
    frac(x.sin() * 100_000.0)
}

/// Smooth 1D value noise: lattice values blended with smoothstep.
#[inline]
#[must_use]
pub fn sample1d(x: f32) -> f32 {
    let integer = x.floor();
    let fraction = frac(x);
    lerp(
        value1d(integer),
        value1d(integer + 1.0),
        smoothstep(0.0, 1.0, fraction),
    )
}

/// Octave sum of [`sample1d`].
///
/// Amplitude starts at 0.5 and frequency at 1.0. The sum is not normalized;
/// callers that need a bounded range reduce it with min/max.
#[must_use]
pub fn fractal1d(x: f32, octaves: u32, lacunarity: f32, gain: f32) -> f32 {
    let mut value = 0.0;
    let mut amplitude = 0.5;
    let mut frequency = 1.0;

    for _ in 0..octaves {
        value += amplitude * sample1d(frequency * x);
        frequency *= lacunarity;
        amplitude *= gain;
    }
    value
}

// =============================================================================
// 2D VALUE NOISE
// =============================================================================

/// Hash of a 2D lattice point into `[0, 1)`.
#[inline]
fn hash2(x: f64, y: f64) -> f64 {
    let mut a = frac(x * 0.13);
    let mut b = frac(y * 0.13);
    let mut c = a;
    let d = a * (b + 3.333) + b * (c + 3.333) + c * (a + 3.333);
    a += d;
    b += d;
    c += d;
    frac((a + b) * c)
}

/// Smooth 2D value noise over a unit lattice.
///
/// Lightweight stand-in for simplex noise, used as the default fractal base.
#[must_use]
pub fn value2d(x: f64, y: f64) -> f64 {
    let ix = x.floor();
    let iy = y.floor();
    let fx = x - ix;
    let fy = y - iy;

    let a = hash2(ix, iy);
    let b = hash2(ix + 1.0, iy);
    let c = hash2(ix, iy + 1.0);
    let d = hash2(ix + 1.0, iy + 1.0);

    let ux = fx * fx * (3.0 - 2.0 * fx);
    let uy = fy * fy * (3.0 - 2.0 * fy);
    lerp(a, b, ux) + (c - a) * uy * (1.0 - ux) + (d - b) * ux * uy
}

// =============================================================================
// SIMPLEX NOISE
// =============================================================================

#[inline]
fn mod289(x: f64) -> f64 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

#[inline]
fn permute(x: f64) -> f64 {
    mod289(((x * 34.0) + 10.0) * x)
}

#[inline]
fn step(edge: f64, x: f64) -> f64 {
    if x >= edge {
        1.0
    } else {
        0.0
    }
}

#[inline]
fn dot2(a: [f64; 2], b: [f64; 2]) -> f64 {
    a[0] * b[0] + a[1] * b[1]
}

#[inline]
fn dot3(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// 2D simplex noise.
///
/// Skewed triangular lattice, `((x * 34 + 10) * x) mod 289` permutation and
/// 41-point gradients on a line mapped onto a diamond.
#[must_use]
pub fn simplex2d(x: f64, y: f64) -> f64 {
    // (3 - sqrt(3)) / 6
    const G2: f64 = 0.211_324_865_405_187;
    // (sqrt(3) - 1) / 2
    const F2: f64 = 0.366_025_403_784_439;
    // -1 + 2 * G2
    const CORNER: f64 = -0.577_350_269_189_626;
    // 1 / 41
    const GRADIENTS: f64 = 0.024_390_243_902_439;

    // First corner
    let skew = (x + y) * F2;
    let mut i = [(x + skew).floor(), (y + skew).floor()];
    let unskew = (i[0] + i[1]) * G2;
    let x0 = [x - i[0] + unskew, y - i[1] + unskew];

    // Other corners
    let i1 = if x0[0] > x0[1] { [1.0, 0.0] } else { [0.0, 1.0] };
    let x1 = [x0[0] + G2 - i1[0], x0[1] + G2 - i1[1]];
    let x2 = [x0[0] + CORNER, x0[1] + CORNER];

    // Permutations
    i = [mod289(i[0]), mod289(i[1])];
    let column = [i[1], i[1] + i1[1], i[1] + 1.0];
    let row = [i[0], i[0] + i1[0], i[0] + 1.0];
    let p: [f64; 3] = std::array::from_fn(|k| permute(permute(column[k]) + row[k]));

    let corners = [x0, x1, x2];
    let mut m: [f64; 3] = std::array::from_fn(|k| (0.5 - dot2(corners[k], corners[k])).max(0.0));
    for value in &mut m {
        *value *= *value;
        *value *= *value;
    }

    // Gradients: 41 points uniformly over a line, mapped onto a diamond
    let mut total = 0.0;
    for k in 0..3 {
        let gx = 2.0 * frac(p[k] * GRADIENTS) - 1.0;
        let h = gx.abs() - 0.5;
        let ox = (gx + 0.5).floor();
        let a0 = gx - ox;

        // Approximate gradient normalisation
        let norm = 1.792_842_914_001_59 - 0.853_734_720_953_14 * (a0 * a0 + h * h);
        total += m[k] * norm * (a0 * corners[k][0] + h * corners[k][1]);
    }
    130.0 * total
}

/// 3D simplex noise.
///
/// Tetrahedral lattice with gradients from a 7x7 grid mapped onto an
/// octahedron, `max(0, 0.5 - |d|^2)^4` falloff.
#[must_use]
pub fn simplex3d(x: f64, y: f64, z: f64) -> f64 {
    const ONE_SIXTH: f64 = 1.0 / 6.0;
    const ONE_THIRD: f64 = 1.0 / 3.0;
    const N: f64 = 1.0 / 7.0;
    // n * (2, 0.5, 1) - (0, 1, 0)
    const NS: [f64; 3] = [2.0 * N, 0.5 * N - 1.0, N];

    let v = [x, y, z];

    // First corner
    let skew = (x + y + z) * ONE_THIRD;
    let i: [f64; 3] = std::array::from_fn(|k| (v[k] + skew).floor());
    let unskew = (i[0] + i[1] + i[2]) * ONE_SIXTH;
    let x0: [f64; 3] = std::array::from_fn(|k| v[k] - i[k] + unskew);

    // Other corners
    let g = [step(x0[1], x0[0]), step(x0[2], x0[1]), step(x0[0], x0[2])];
    let l = [1.0 - g[0], 1.0 - g[1], 1.0 - g[2]];
    let l_zxy = [l[2], l[0], l[1]];
    let i1: [f64; 3] = std::array::from_fn(|k| g[k].min(l_zxy[k]));
    let i2: [f64; 3] = std::array::from_fn(|k| g[k].max(l_zxy[k]));

    let x1: [f64; 3] = std::array::from_fn(|k| x0[k] - i1[k] + ONE_SIXTH);
    let x2: [f64; 3] = std::array::from_fn(|k| x0[k] - i2[k] + ONE_THIRD);
    let x3: [f64; 3] = std::array::from_fn(|k| x0[k] - 0.5);

    // Permutations
    let i = [mod289(i[0]), mod289(i[1]), mod289(i[2])];
    let mut p = [0.0f64; 4];
    for axis in (0..3).rev() {
        let offsets = [0.0, i1[axis], i2[axis], 1.0];
        for k in 0..4 {
            p[k] = permute(p[k] + i[axis] + offsets[k]);
        }
    }

    // Gradients: 7x7 points over a square, mapped onto an octahedron.
    // The ring size 17 * 17 = 289 is close to a multiple of 49 (49 * 6 = 294)
    let mut gx = [0.0f64; 4];
    let mut gy = [0.0f64; 4];
    let mut h = [0.0f64; 4];
    for k in 0..4 {
        let j = p[k] - 49.0 * (p[k] * NS[2] * NS[2]).floor();
        let x_ = (j * NS[2]).floor();
        let y_ = (j - 7.0 * x_).floor();
        gx[k] = x_ * NS[0] + NS[1];
        gy[k] = y_ * NS[0] + NS[1];
        h[k] = 1.0 - gx[k].abs() - gy[k].abs();
    }

    let corners = [x0, x1, x2, x3];
    let mut total = 0.0;
    for k in 0..4 {
        let flip = -step(h[k], 0.0);
        let sx = gx[k].floor() * 2.0 + 1.0;
        let sy = gy[k].floor() * 2.0 + 1.0;
        let gradient = [gx[k] + sx * flip, gy[k] + sy * flip, h[k]];
        let inv_len = 1.0 / dot3(gradient, gradient).sqrt();
        let gradient = [gradient[0] * inv_len, gradient[1] * inv_len, gradient[2] * inv_len];

        let m = (0.5 - dot3(corners[k], corners[k])).max(0.0);
        let m = m * m;
        total += m * m * dot3(gradient, corners[k]);
    }
    105.0 * total
}
