//! # SIMD Min/Max Reduction
//!
//! Batched minimum/maximum over an `f32` buffer, used to normalise
//! island-mask extents and noise ranges.
//!
//! ## Tiers
//!
//! | Tier     | Register | Batch |
//! |----------|----------|-------|
//! | `Avx`    | 256-bit  | 8     |
//! | `Sse41`  | 128-bit  | 4     |
//! | `Sse2`   | 128-bit  | 4     |
//! | `Scalar` | -        | 1     |
//!
//! The widest supported tier is detected once at runtime and cached.
//! Each tier consumes `len - len % batch` elements with vector compares and
//! folds the leftovers with the scalar loop, so every tier returns exactly
//! the same pair as a linear scan. Only the comparison order differs.
//!
//! Inputs are expected to be finite. NaN propagation differs between the
//! vector and scalar instructions.

#![allow(unsafe_code)]

use std::sync::OnceLock;

use crate::math::unlerp;

/// Largest batch size of any tier.
///
/// Buffers whose length must be a whole number of batches on every tier
/// (the island mask vertex count) are sized in multiples of this.
pub const MAX_BATCH_SIZE: usize = 8;

/// Result of a min/max reduction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinMax {
    /// Smallest value seen.
    pub min: f32,
    /// Largest value seen.
    pub max: f32,
}

impl MinMax {
    /// Identity of the reduction, and the result for an empty buffer.
    pub const EMPTY: Self = Self {
        min: f32::MAX,
        max: f32::MIN,
    };

    /// Returns true if no value has been folded in.
    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.min > self.max
    }

    /// Folds values into the pair with the scalar loop.
    #[inline]
    #[must_use]
    pub fn fold(mut self, values: &[f32]) -> Self {
        for &value in values {
            if value < self.min {
                self.min = value;
            }
            if value > self.max {
                self.max = value;
            }
        }
        self
    }

    /// Maps `value` into `[0, 1]` relative to this range.
    ///
    /// A degenerate range (`min == max`) maps everything to `1.0`.
    #[inline]
    #[must_use]
    pub fn normalize(self, value: f32) -> f32 {
        if self.max > self.min {
            unlerp(self.min, self.max, value)
        } else {
            1.0
        }
    }
}

/// Implementation tier of the reduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimdTier {
    /// 256-bit AVX registers.
    Avx,
    /// 128-bit registers with the SSE3 horizontal reduction.
    Sse41,
    /// 128-bit registers with the SSE shuffle reduction.
    Sse2,
    /// Portable loop.
    Scalar,
}

impl SimdTier {
    /// Every tier, widest first.
    pub const ALL: [Self; 4] = [Self::Avx, Self::Sse41, Self::Sse2, Self::Scalar];

    /// Number of floats consumed per vector compare.
    #[inline]
    #[must_use]
    pub const fn batch_size(self) -> usize {
        match self {
            Self::Avx => 8,
            Self::Sse41 | Self::Sse2 => 4,
            Self::Scalar => 1,
        }
    }

    /// Returns true if the running CPU can execute this tier.
    #[must_use]
    pub fn is_supported(self) -> bool {
        tier_supported(self)
    }

    /// Widest tier the running CPU supports.
    #[must_use]
    pub fn detect() -> Self {
        Self::ALL
            .into_iter()
            .find(|tier| tier.is_supported())
            .unwrap_or(Self::Scalar)
    }

    /// Tiers the running CPU supports, widest first.
    #[must_use]
    pub fn supported() -> Vec<Self> {
        Self::ALL.into_iter().filter(|tier| tier.is_supported()).collect()
    }
}

#[cfg(target_arch = "x86_64")]
fn tier_supported(tier: SimdTier) -> bool {
    match tier {
        SimdTier::Avx => is_x86_feature_detected!("avx"),
        SimdTier::Sse41 => is_x86_feature_detected!("sse4.1") && is_x86_feature_detected!("sse3"),
        SimdTier::Sse2 => is_x86_feature_detected!("sse2"),
        SimdTier::Scalar => true,
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn tier_supported(tier: SimdTier) -> bool {
    tier == SimdTier::Scalar
}

/// Tier picked for [`min_max`], detected on first use.
#[must_use]
pub fn detected_tier() -> SimdTier {
    static TIER: OnceLock<SimdTier> = OnceLock::new();
    *TIER.get_or_init(|| {
        let tier = SimdTier::detect();
        tracing::debug!("min/max reduction tier: {:?} (batch {})", tier, tier.batch_size());
        tier
    })
}

/// Minimum and maximum of `values` on the widest supported tier.
///
/// Returns [`MinMax::EMPTY`] for an empty buffer.
#[must_use]
pub fn min_max(values: &[f32]) -> MinMax {
    min_max_with(detected_tier(), values)
}

/// Minimum and maximum of `values` on a specific tier.
///
/// An unsupported tier falls back to the scalar loop.
#[must_use]
pub fn min_max_with(tier: SimdTier, values: &[f32]) -> MinMax {
    if !tier.is_supported() {
        return min_max_scalar(values);
    }

    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: the tier's CPU features were checked just above.
        match tier {
            SimdTier::Avx => return unsafe { x86::min_max_avx(values) },
            SimdTier::Sse41 => return unsafe { x86::min_max_sse41(values) },
            SimdTier::Sse2 => return unsafe { x86::min_max_sse2(values) },
            SimdTier::Scalar => {}
        }
    }

    min_max_scalar(values)
}

/// Portable reduction, the reference every other tier must match.
#[inline]
#[must_use]
pub fn min_max_scalar(values: &[f32]) -> MinMax {
    MinMax::EMPTY.fold(values)
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::{
        __m128, _mm256_castps256_ps128, _mm256_extractf128_ps, _mm256_loadu_ps, _mm256_max_ps,
        _mm256_min_ps, _mm256_set1_ps, _mm_cvtss_f32, _mm_loadu_ps, _mm_max_ps, _mm_max_ss,
        _mm_min_ps, _mm_min_ss, _mm_movehdup_ps, _mm_movehl_ps, _mm_set1_ps, _mm_shuffle_ps,
    };

    use super::MinMax;

    /// (v1, v0, v3, v2)
    const SWAP_PAIRS: i32 = 0b10_11_00_01;

    /// AVX pathway: 8 lanes per compare, split into halves for the reduction.
    ///
    /// # Safety
    ///
    /// The CPU must support AVX.
    #[target_feature(enable = "avx")]
    pub(super) unsafe fn min_max_avx(values: &[f32]) -> MinMax {
        let chunks = values.chunks_exact(8);
        let rest = chunks.remainder();

        let mut lo = _mm256_set1_ps(f32::MAX);
        let mut hi = _mm256_set1_ps(f32::MIN);
        for chunk in chunks {
            // Unaligned load - works with ANY alignment
            let v = _mm256_loadu_ps(chunk.as_ptr());
            lo = _mm256_min_ps(lo, v);
            hi = _mm256_max_ps(hi, v);
        }

        let lo = _mm_min_ps(_mm256_castps256_ps128(lo), _mm256_extractf128_ps::<1>(lo));
        let hi = _mm_max_ps(_mm256_castps256_ps128(hi), _mm256_extractf128_ps::<1>(hi));

        MinMax {
            min: reduce_min_sse3(lo),
            max: reduce_max_sse3(hi),
        }
        .fold(rest)
    }

    /// SSE4.1 pathway: 4 lanes per compare, SSE3 horizontal reduction.
    ///
    /// # Safety
    ///
    /// The CPU must support SSE4.1 and SSE3.
    #[target_feature(enable = "sse4.1,sse3")]
    pub(super) unsafe fn min_max_sse41(values: &[f32]) -> MinMax {
        let (lo, hi, rest) = accumulate_128(values);
        MinMax {
            min: reduce_min_sse3(lo),
            max: reduce_max_sse3(hi),
        }
        .fold(rest)
    }

    /// SSE2 pathway: 4 lanes per compare, shuffle-based reduction.
    ///
    /// # Safety
    ///
    /// The CPU must support SSE2.
    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn min_max_sse2(values: &[f32]) -> MinMax {
        let (lo, hi, rest) = accumulate_128(values);
        MinMax {
            min: reduce_min_sse2(lo),
            max: reduce_max_sse2(hi),
        }
        .fold(rest)
    }

    /// Lane-wise min/max over whole 4-float batches.
    ///
    /// Returns the two registers and the unconsumed tail.
    #[inline]
    #[target_feature(enable = "sse2")]
    unsafe fn accumulate_128(values: &[f32]) -> (__m128, __m128, &[f32]) {
        let chunks = values.chunks_exact(4);
        let rest = chunks.remainder();

        let mut lo = _mm_set1_ps(f32::MAX);
        let mut hi = _mm_set1_ps(f32::MIN);
        for chunk in chunks {
            let v = _mm_loadu_ps(chunk.as_ptr());
            lo = _mm_min_ps(lo, v);
            hi = _mm_max_ps(hi, v);
        }
        (lo, hi, rest)
    }

    #[inline]
    #[target_feature(enable = "sse3")]
    unsafe fn reduce_min_sse3(v: __m128) -> f32 {
        let shuffled = _mm_movehdup_ps(v);
        let min = _mm_min_ps(v, shuffled);
        let shuffled = _mm_movehl_ps(shuffled, min);
        _mm_cvtss_f32(_mm_min_ss(min, shuffled))
    }

    #[inline]
    #[target_feature(enable = "sse3")]
    unsafe fn reduce_max_sse3(v: __m128) -> f32 {
        let shuffled = _mm_movehdup_ps(v);
        let max = _mm_max_ps(v, shuffled);
        let shuffled = _mm_movehl_ps(shuffled, max);
        _mm_cvtss_f32(_mm_max_ss(max, shuffled))
    }

    #[inline]
    #[target_feature(enable = "sse2")]
    unsafe fn reduce_min_sse2(v: __m128) -> f32 {
        let shuffled = _mm_shuffle_ps::<SWAP_PAIRS>(v, v);
        let min = _mm_min_ps(v, shuffled);
        let shuffled = _mm_movehl_ps(shuffled, min);
        _mm_cvtss_f32(_mm_min_ss(min, shuffled))
    }

    #[inline]
    #[target_feature(enable = "sse2")]
    unsafe fn reduce_max_sse2(v: __m128) -> f32 {
        let shuffled = _mm_shuffle_ps::<SWAP_PAIRS>(v, v);
        let max = _mm_max_ps(v, shuffled);
        let shuffled = _mm_movehl_ps(shuffled, max);
        _mm_cvtss_f32(_mm_max_ss(max, shuffled))
    }
}
