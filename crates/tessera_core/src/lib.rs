//! # Tessera Core
//!
//! Low-level building blocks shared by the terrain generator:
//! - Runtime-dispatched SIMD min/max reduction (AVX / SSE4.1 / SSE2 / scalar)
//! - A dependency-aware job graph on scoped threads
//! - Shader-style interpolation helpers over `f32` and `f64`
//!
//! ## Architecture Rules
//!
//! 1. **No global mutable state** - the only cached value is the detected SIMD tier
//! 2. **Scoped parallelism** - jobs borrow their inputs, nothing outlives a run
//! 3. **Unsafe only in SIMD kernels** - every other module denies it
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::simd::min_max;
//!
//! let range = min_max(&[3.0, -1.0, 7.0, 2.0, 0.0, -5.0, 9.0, 1.0]);
//! assert_eq!((range.min, range.max), (-5.0, 9.0));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod jobs;
pub mod math;
pub mod simd;

pub use jobs::{JobGraph, JobHandle, JobOutput, JobSystem};
pub use math::{clamp, clamp01, frac, lerp, smoothstep, unlerp, Real};
pub use simd::{min_max, min_max_with, MinMax, SimdTier, MAX_BATCH_SIZE};
