//! # Fractal Noise Sampler
//!
//! Sums octaves of a base noise primitive over a rectangular grid of world
//! cells. Used for the raw heightmap and for every noise-driven biome.
//!
//! ## Per Octave
//!
//! 1. `position = rotate(position) * frequency + offset`, with a fixed
//!    0.5 radian rotation and the octave's random offset
//! 2. Accumulate `amplitude * base(position)`
//! 3. `frequency *= lacunarity`, `amplitude *= gain`
//!
//! The sum is divided by the total amplitude, so a base in `[-1, 1]` gives
//! a result in roughly `[-1, 1]` whatever the octave count.
//!
//! The position is carried from octave to octave, so rotation, frequency
//! and offset all compound, breaking up axis-aligned lattice artifacts. Offsets come from a seeded stream and are fixed for
//! the lifetime of the sampler.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tessera_core::jobs::JobSystem;

use crate::error::{GenError, GenResult};
use crate::noise::{simplex2d, value2d};

/// Half-width of the range octave offsets are drawn from.
pub const OFFSET_RANGE: f64 = 100_000.0;

/// Amplitude of the first octave.
pub const INITIAL_AMPLITUDE: f64 = 0.5;

/// Frequency of the first octave.
pub const INITIAL_FREQUENCY: f64 = 2.0;

/// cos(0.5), sin(0.5) as literals so every platform rotates identically.
const ROTATION_COS: f64 = 0.877_582_561_890_372_8;
const ROTATION_SIN: f64 = 0.479_425_538_604_203;

/// Cells per work item when filling a grid.
const GRID_BATCH: usize = 256;

/// Base primitive summed by the fractal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseNoise {
    /// Smooth 2D value noise, output in `[0, 1)`.
    #[default]
    Value,
    /// 2D simplex noise, output in roughly `[-1, 1]`.
    Simplex,
}

impl BaseNoise {
    /// Samples the primitive at a position.
    #[inline]
    #[must_use]
    pub fn sample(self, x: f64, y: f64) -> f64 {
        match self {
            Self::Value => value2d(x, y),
            Self::Simplex => simplex2d(x, y),
        }
    }
}

/// Fractal noise settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FractalSettings {
    /// Divides world positions; larger means broader features.
    pub scale: f64,
    /// Number of octaves summed.
    pub octaves: u32,
    /// Amplitude multiplier per octave.
    pub gain: f64,
    /// Frequency multiplier per octave.
    pub lacunarity: f64,
    /// Base primitive.
    pub base: BaseNoise,
}

impl Default for FractalSettings {
    fn default() -> Self {
        Self {
            scale: 64.0,
            octaves: 5,
            gain: 0.5,
            lacunarity: 2.0,
            base: BaseNoise::Value,
        }
    }
}

impl FractalSettings {
    /// Checks that the settings describe a usable fractal.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no octaves, the scale is not positive
    /// and finite, or gain/lacunarity are not positive and finite.
    pub fn validate(&self) -> GenResult<()> {
        if self.octaves == 0 {
            return Err(GenError::InvalidOctaves(self.octaves));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(GenError::InvalidScale(self.scale));
        }
        if !(self.gain.is_finite() && self.gain > 0.0) {
            return Err(GenError::InvalidNoiseParameter {
                name: "gain",
                value: self.gain,
            });
        }
        if !(self.lacunarity.is_finite() && self.lacunarity > 0.0) {
            return Err(GenError::InvalidNoiseParameter {
                name: "lacunarity",
                value: self.lacunarity,
            });
        }
        Ok(())
    }

    /// Sum of every octave's amplitude.
    #[must_use]
    pub fn amplitude_total(&self) -> f64 {
        let mut amplitude = INITIAL_AMPLITUDE;
        let mut total = amplitude;
        for _ in 1..self.octaves {
            amplitude *= self.gain;
            total += amplitude;
        }
        total
    }
}

/// Rectangular, inclusive range of integer world cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridBounds {
    /// Smallest cell (x, z).
    pub min: [i64; 2],
    /// Largest cell (x, z), inclusive.
    pub max: [i64; 2],
}

impl GridBounds {
    /// Creates bounds from two corners.
    #[must_use]
    pub fn new(min: [i64; 2], max: [i64; 2]) -> Self {
        Self {
            min: [min[0].min(max[0]), min[1].min(max[1])],
            max: [min[0].max(max[0]), min[1].max(max[1])],
        }
    }

    /// Vertex grid of one chunk: `(size + 1)^2` cells starting at
    /// `index * size`, so neighbouring chunks share their edge row.
    #[must_use]
    pub fn from_chunk(index: [i32; 2], size: usize) -> Self {
        let size = size as i64;
        let min = [i64::from(index[0]) * size, i64::from(index[1]) * size];
        Self {
            min,
            max: [min[0] + size, min[1] + size],
        }
    }

    /// Cells along x.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn width(&self) -> usize {
        (self.max[0] - self.min[0] + 1) as usize
    }

    /// Cells along z.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn depth(&self) -> usize {
        (self.max[1] - self.min[1] + 1) as usize
    }

    /// Total number of cells.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.width() * self.depth()
    }

    /// Always false: bounds are inclusive, so there is at least one cell.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// World cell of the `index`-th cell in row-major (x fastest) order.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn cell(&self, index: usize) -> [i64; 2] {
        let width = self.width();
        [
            self.min[0] + (index % width) as i64,
            self.min[1] + (index / width) as i64,
        ]
    }
}

/// Per-octave 2D offsets drawn once from a seeded stream.
#[derive(Clone, Debug, PartialEq)]
pub struct OctaveOffsets(Vec<[f64; 2]>);

impl OctaveOffsets {
    /// Draws `octaves` offsets in `[-OFFSET_RANGE, OFFSET_RANGE)`.
    pub fn generate<R: Rng + ?Sized>(octaves: u32, rng: &mut R) -> Self {
        Self(
            (0..octaves)
                .map(|_| {
                    [
                        rng.gen_range(-OFFSET_RANGE..OFFSET_RANGE),
                        rng.gen_range(-OFFSET_RANGE..OFFSET_RANGE),
                    ]
                })
                .collect(),
        )
    }

    /// Offsets in octave order.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[[f64; 2]] {
        &self.0
    }
}

/// A seeded fractal noise field.
///
/// Immutable once built; share it by reference across workers.
#[derive(Clone, Debug, PartialEq)]
pub struct FractalNoise {
    settings: FractalSettings,
    offsets: OctaveOffsets,
    amplitude_total: f64,
}

impl FractalNoise {
    /// Validates `settings` and draws the octave offsets from `rng`.
    ///
    /// # Errors
    ///
    /// Returns the error from [`FractalSettings::validate`].
    pub fn new<R: Rng + ?Sized>(settings: FractalSettings, rng: &mut R) -> GenResult<Self> {
        settings.validate()?;
        let offsets = OctaveOffsets::generate(settings.octaves, rng);
        Ok(Self {
            amplitude_total: settings.amplitude_total(),
            settings,
            offsets,
        })
    }

    /// Settings this field was built from.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &FractalSettings {
        &self.settings
    }

    /// Octave offsets in use.
    #[inline]
    #[must_use]
    pub fn offsets(&self) -> &OctaveOffsets {
        &self.offsets
    }

    /// Normalized fractal value at a world position.
    #[must_use]
    pub fn sample(&self, x: f64, z: f64) -> f64 {
        let mut position = [x / self.settings.scale, z / self.settings.scale];
        let mut value = 0.0;
        let mut amplitude = INITIAL_AMPLITUDE;
        let mut frequency = INITIAL_FREQUENCY;

        for offset in self.offsets.as_slice() {
            position = [
                (ROTATION_COS * position[0] + ROTATION_SIN * position[1]) * frequency + offset[0],
                (-ROTATION_SIN * position[0] + ROTATION_COS * position[1]) * frequency + offset[1],
            ];
            value += amplitude * self.settings.base.sample(position[0], position[1]);
            frequency *= self.settings.lacunarity;
            amplitude *= self.settings.gain;
        }

        value / self.amplitude_total
    }

    /// Samples every cell of `bounds`, row-major, shifted by `origin`.
    #[must_use]
    pub fn sample_grid(&self, bounds: &GridBounds, origin: [f64; 2], jobs: &JobSystem) -> Vec<f64> {
        let mut out = vec![0.0; bounds.len()];
        self.fill_grid(bounds, origin, jobs, &mut out);
        out
    }

    /// Like [`sample_grid`](Self::sample_grid) but into an existing buffer.
    ///
    /// Only the first `bounds.len()` slots are written.
    #[allow(clippy::cast_precision_loss)]
    pub fn fill_grid(&self, bounds: &GridBounds, origin: [f64; 2], jobs: &JobSystem, out: &mut [f64]) {
        let len = bounds.len().min(out.len());
        jobs.parallel_for(&mut out[..len], GRID_BATCH, |index, slot| {
            let [x, z] = bounds.cell(index);
            *slot = self.sample(origin[0] + x as f64, origin[1] + z as f64);
        });
    }
}
