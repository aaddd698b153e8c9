//! # Biome Rules
//!
//! A biome turns a grid of world cells into a grid of weights, and owns the
//! curve that remaps raw height wherever it wins.
//!
//! ## Variants
//!
//! - [`GlobalBiome`]: same weight everywhere. Use this for oceans.
//! - [`NoiseBiome`]: fractal noise compared against a threshold. The weight
//!   is how far past the threshold the noise lies, clamped to `[0, 1]`.
//!
//! Cells where a noise biome's comparison fails get weight 0. They can still
//! fill an empty lane but lose to any positive weight.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tessera_core::jobs::JobSystem;
use tessera_core::math::{clamp01, unlerp};

use crate::curve::Curve;
use crate::error::{GenError, GenResult};
use crate::fractal::{FractalNoise, FractalSettings, GridBounds};

/// Cells per work item when computing weights.
const WEIGHT_BATCH: usize = 256;

/// Comparison between a noise value and a biome threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOperation {
    /// `value > threshold`
    #[default]
    Greater,
    /// `value < threshold`
    Less,
    /// `value >= threshold`
    GreaterEqual,
    /// `value <= threshold`
    LessEqual,
}

impl ThresholdOperation {
    /// Returns true if `value` passes the comparison.
    #[inline]
    #[must_use]
    pub fn passes(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Greater => value > threshold,
            Self::Less => value < threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
        }
    }

    /// Distance past the threshold, clamped to `[0, 1]`.
    ///
    /// With `normalize`, the distance is rescaled by the largest distance a
    /// value in `[-1, 1]` can reach. Returns 0 if the comparison fails.
    #[must_use]
    pub fn weight(self, value: f64, threshold: f64, normalize: bool) -> f64 {
        if !self.passes(value, threshold) {
            return 0.0;
        }

        let (distance, range) = match self {
            Self::Greater | Self::GreaterEqual => (value - threshold, 1.0 - threshold),
            Self::Less | Self::LessEqual => (threshold - value, 1.0 + threshold),
        };
        let distance = clamp01(distance);

        if !normalize {
            distance
        } else if range > 0.0 {
            clamp01(unlerp(0.0, range, distance))
        } else {
            1.0
        }
    }
}

/// Biome with a constant weight.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalBiome {
    /// Display name.
    pub name: String,
    /// Weight for every cell.
    pub threshold: f64,
    /// Height remap.
    pub curve: Curve,
}

impl GlobalBiome {
    /// Default constant weight: low enough that any other biome evicts it.
    pub const DEFAULT_THRESHOLD: f64 = 0.01;

    /// Creates a global biome.
    ///
    /// # Errors
    ///
    /// Returns an error if `threshold` is not finite.
    pub fn new(name: impl Into<String>, threshold: f64, curve: Curve) -> GenResult<Self> {
        if !threshold.is_finite() {
            return Err(GenError::InvalidNoiseParameter {
                name: "threshold",
                value: threshold,
            });
        }
        Ok(Self {
            name: name.into(),
            threshold,
            curve,
        })
    }
}

/// Biome placed where fractal noise crosses a threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseBiome {
    /// Display name.
    pub name: String,
    /// Seeded selection noise.
    pub noise: FractalNoise,
    /// Comparison threshold.
    pub threshold: f64,
    /// Comparison applied to each sample.
    pub operation: ThresholdOperation,
    /// Rescale weights to use the full `[0, 1]` range.
    pub normalize: bool,
    /// Height remap.
    pub curve: Curve,
}

impl NoiseBiome {
    /// Creates a noise biome, drawing its octave offsets from `rng`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid noise settings or a non-finite threshold.
    pub fn new<R: Rng + ?Sized>(
        name: impl Into<String>,
        settings: FractalSettings,
        threshold: f64,
        operation: ThresholdOperation,
        normalize: bool,
        curve: Curve,
        rng: &mut R,
    ) -> GenResult<Self> {
        if !threshold.is_finite() {
            return Err(GenError::InvalidNoiseParameter {
                name: "threshold",
                value: threshold,
            });
        }
        Ok(Self {
            name: name.into(),
            noise: FractalNoise::new(settings, rng)?,
            threshold,
            operation,
            normalize,
            curve,
        })
    }

    /// Weight at a single world position.
    #[must_use]
    pub fn weight_at(&self, x: f64, z: f64) -> f64 {
        self.operation
            .weight(self.noise.sample(x, z), self.threshold, self.normalize)
    }
}

/// A biome rule.
#[derive(Clone, Debug, PartialEq)]
pub enum Biome {
    /// Constant weight everywhere.
    Global(GlobalBiome),
    /// Noise threshold.
    Noise(NoiseBiome),
}

impl Biome {
    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Global(biome) => &biome.name,
            Self::Noise(biome) => &biome.name,
        }
    }

    /// Height remap curve.
    #[must_use]
    pub fn curve(&self) -> &Curve {
        match self {
            Self::Global(biome) => &biome.curve,
            Self::Noise(biome) => &biome.curve,
        }
    }

    /// Writes one weight per cell of `bounds` into `out`.
    #[allow(clippy::cast_precision_loss)]
    pub fn compute_weight(&self, bounds: &GridBounds, origin: [f64; 2], jobs: &JobSystem, out: &mut [f64]) {
        let len = bounds.len().min(out.len());
        let out = &mut out[..len];
        match self {
            Self::Global(biome) => out.fill(biome.threshold),
            Self::Noise(biome) => {
                jobs.parallel_for(out, WEIGHT_BATCH, |index, slot| {
                    let [x, z] = bounds.cell(index);
                    *slot = biome.weight_at(origin[0] + x as f64, origin[1] + z as f64);
                });
            }
        }
    }

    /// Weight grid for `bounds`.
    #[must_use]
    pub fn weights(&self, bounds: &GridBounds, origin: [f64; 2], jobs: &JobSystem) -> Vec<f64> {
        let mut out = vec![0.0; bounds.len()];
        self.compute_weight(bounds, origin, jobs, &mut out);
        out
    }
}

impl From<GlobalBiome> for Biome {
    fn from(biome: GlobalBiome) -> Self {
        Self::Global(biome)
    }
}

impl From<NoiseBiome> for Biome {
    fn from(biome: NoiseBiome) -> Self {
        Self::Noise(biome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_threshold_comparisons() {
        use ThresholdOperation::*;
        assert!(Greater.passes(0.6, 0.5));
        assert!(!Greater.passes(0.5, 0.5));
        assert!(GreaterEqual.passes(0.5, 0.5));
        assert!(Less.passes(0.4, 0.5));
        assert!(!Less.passes(0.5, 0.5));
        assert!(LessEqual.passes(0.5, 0.5));
    }

    #[test]
    fn test_weight_is_clamped_distance() {
        use ThresholdOperation::*;
        assert!((Greater.weight(0.75, 0.5, false) - 0.25).abs() < 1e-12);
        assert!((Less.weight(0.25, 0.5, false) - 0.25).abs() < 1e-12);
        assert_eq!(GreaterEqual.weight(0.5, 0.5, false), 0.0);
        assert_eq!(Greater.weight(5.0, -1.0, false), 1.0);
    }

    #[test]
    fn test_failed_comparison_weighs_zero() {
        use ThresholdOperation::*;
        for normalize in [false, true] {
            assert_eq!(Greater.weight(0.25, 0.5, normalize), 0.0);
            assert_eq!(Greater.weight(0.5, 0.5, normalize), 0.0);
            assert_eq!(Less.weight(0.75, 0.5, normalize), 0.0);
            assert_eq!(GreaterEqual.weight(-1.0, 0.0, normalize), 0.0);
            assert_eq!(LessEqual.weight(1.0, 0.0, normalize), 0.0);
        }
        // Passing comparisons keep the clamped distance
        assert!((Greater.weight(0.9, 0.5, false) - 0.4).abs() < 1e-12);
        assert!((LessEqual.weight(-0.3, 0.0, false) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_weight_normalization() {
        use ThresholdOperation::*;
        // Half of the way from 0.5 to 1.0
        assert!((Greater.weight(0.75, 0.5, true) - 0.5).abs() < 1e-12);
        // Half of the way from 0.0 to -1.0
        assert!((Less.weight(-0.5, 0.0, true) - 0.5).abs() < 1e-12);
        // Degenerate range
        assert_eq!(GreaterEqual.weight(1.0, 1.0, true), 1.0);
    }

    #[test]
    fn test_global_weight_is_constant() {
        let biome = Biome::from(GlobalBiome::new("ocean", 0.01, Curve::identity()).unwrap());
        let bounds = GridBounds::from_chunk([4, -2], 8);
        let weights = biome.weights(&bounds, [0.0, 0.0], &JobSystem::new(2));
        assert_eq!(weights.len(), 81);
        assert!(weights.iter().all(|&w| w == 0.01));
        assert_eq!(biome.name(), "ocean");
    }

    #[test]
    fn test_noise_weights_match_point_samples() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let noise = NoiseBiome::new(
            "hills",
            FractalSettings::default(),
            0.4,
            ThresholdOperation::Greater,
            true,
            Curve::identity(),
            &mut rng,
        )
        .unwrap();
        let biome = Biome::from(noise.clone());
        let bounds = GridBounds::from_chunk([0, 0], 32);
        let weights = biome.weights(&bounds, [0.0, 0.0], &JobSystem::new(3));

        let mut spawned = 0;
        for (i, &w) in weights.iter().enumerate() {
            let [x, z] = bounds.cell(i);
            assert_eq!(w, noise.weight_at(x as f64, z as f64));
            assert!((0.0..=1.0).contains(&w));
            if w > 0.0 {
                spawned += 1;
            }
        }
        assert!(spawned > 0, "threshold 0.4 should claim some cells");
    }

    #[test]
    fn test_rejects_nan_threshold() {
        assert!(GlobalBiome::new("bad", f64::NAN, Curve::identity()).is_err());
    }
}
