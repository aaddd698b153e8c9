//! # Biome Map
//!
//! Competitive assignment of biomes to cells. Every cell keeps up to four
//! `(biome index, weight)` pairs, each stored in one `f64` lane as
//! `index + weight`: the integer part is the index, the fractional part the
//! weight.
//!
//! ## Packing
//!
//! Biomes are packed one after another, in list order. For each cell the
//! candidate is compared against the lane holding the smallest weight; if
//! the candidate's weight is greater or equal it takes that lane. When
//! several lanes tie for smallest, the first one (lowest lane index) is
//! replaced. Empty lanes count as weaker than any candidate.
//!
//! Packing mutates the shared per-cell buffer, so biome `i + 1` must not
//! start packing before biome `i` has finished. Within one biome every cell
//! is independent.
//!
//! ## Encoding Limits
//!
//! Weights are clamped to [`MAX_LANE_WEIGHT`] so a full-strength weight does
//! not carry into the index. Indices are limited to [`MAX_BIOMES`] so the
//! `f32` export keeps at least 12 fractional bits.

use serde::{Deserialize, Serialize};
use tessera_core::jobs::JobSystem;

use crate::biome::Biome;
use crate::error::{GenError, GenResult};
use crate::fractal::GridBounds;

/// Lanes per packed cell.
pub const LANES: usize = 4;

/// Value of a lane holding no biome.
pub const EMPTY_LANE: f64 = -1.0;

/// Largest storable weight.
pub const MAX_LANE_WEIGHT: f64 = 1.0 - 1.0 / 4096.0;

/// Largest number of biomes in one map.
pub const MAX_BIOMES: usize = 2048;

/// Cells per work item when packing.
const PACK_BATCH: usize = 512;

/// Up to four `(biome index, weight)` pairs for one cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PackedBiomes(pub [f64; LANES]);

impl Default for PackedBiomes {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl PackedBiomes {
    /// No biome in any lane.
    pub const EMPTY: Self = Self([EMPTY_LANE; LANES]);

    /// Encodes a pair into a lane value.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn encode(index: usize, weight: f64) -> f64 {
        index as f64 + weight.clamp(0.0, MAX_LANE_WEIGHT)
    }

    /// Decodes lane `lane`, or `None` if it is empty.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn lane(&self, lane: usize) -> Option<(usize, f64)> {
        let value = self.0[lane];
        if value < 0.0 {
            return None;
        }
        let index = value.floor();
        Some((index as usize, value - index))
    }

    /// Weight used for eviction: -1 for an empty lane.
    #[inline]
    fn rank(&self, lane: usize) -> f64 {
        self.lane(lane).map_or(EMPTY_LANE, |(_, weight)| weight)
    }

    /// Present pairs in lane order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        (0..LANES).filter_map(|lane| self.lane(lane))
    }

    /// Number of occupied lanes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Offers a candidate to this cell.
    ///
    /// Negative or NaN weights are ignored. Returns true if a lane was
    /// replaced.
    pub fn pack(&mut self, index: usize, weight: f64) -> bool {
        if !(weight >= 0.0) {
            return false;
        }

        // First lane holding the smallest weight
        let mut weakest = 0;
        let mut weakest_rank = self.rank(0);
        for lane in 1..LANES {
            let rank = self.rank(lane);
            if rank < weakest_rank {
                weakest = lane;
                weakest_rank = rank;
            }
        }

        let weight = weight.min(MAX_LANE_WEIGHT);
        if weight >= weakest_rank {
            self.0[weakest] = Self::encode(index, weight);
            true
        } else {
            false
        }
    }

    /// Lanes as `f32`, for vertex attributes.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_f32(&self) -> [f32; LANES] {
        self.0.map(|lane| lane as f32)
    }
}

/// How to treat empty slots in the biome list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Fail generation.
    Strict,
    /// Log a warning and skip the slot.
    Lenient,
}

impl Default for ValidationMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

/// Packs one biome's weights into the cell buffer.
///
/// `weights` and `packed` are matched by index; extra entries in either are
/// ignored.
pub fn pack_layer(packed: &mut [PackedBiomes], index: usize, weights: &[f64], jobs: &JobSystem) {
    let len = packed.len().min(weights.len());
    jobs.parallel_for(&mut packed[..len], PACK_BATCH, |cell, slot| {
        slot.pack(index, weights[cell]);
    });
}

/// Ordered biome list. Order is priority: later biomes may evict earlier
/// ones from a cell's weakest lane.
#[derive(Clone, Debug, PartialEq)]
pub struct BiomeMap {
    biomes: Vec<Option<Biome>>,
    validation: ValidationMode,
}

impl BiomeMap {
    /// Creates a map. `None` entries are empty slots.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::TooManyBiomes`] above [`MAX_BIOMES`].
    pub fn new(biomes: Vec<Option<Biome>>, validation: ValidationMode) -> GenResult<Self> {
        if biomes.len() > MAX_BIOMES {
            return Err(GenError::TooManyBiomes {
                count: biomes.len(),
                max: MAX_BIOMES,
            });
        }
        Ok(Self { biomes, validation })
    }

    /// Map with every slot filled.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::TooManyBiomes`] above [`MAX_BIOMES`].
    pub fn from_biomes(biomes: Vec<Biome>, validation: ValidationMode) -> GenResult<Self> {
        Self::new(biomes.into_iter().map(Some).collect(), validation)
    }

    /// Number of slots, filled or not.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.biomes.len()
    }

    /// Returns true if there are no slots.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.biomes.is_empty()
    }

    /// Biome in slot `index`, if filled.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Biome> {
        self.biomes.get(index).and_then(Option::as_ref)
    }

    /// Validation mode for empty slots.
    #[inline]
    #[must_use]
    pub const fn validation(&self) -> ValidationMode {
        self.validation
    }

    /// Checks slot `index` before it is used.
    ///
    /// Returns `Ok(None)` for an empty slot in lenient mode.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::MissingBiome`] for an empty slot in strict mode.
    pub fn checked(&self, index: usize) -> GenResult<Option<&Biome>> {
        match self.get(index) {
            Some(biome) => Ok(Some(biome)),
            None => match self.validation {
                ValidationMode::Strict => Err(GenError::MissingBiome { index }),
                ValidationMode::Lenient => {
                    tracing::warn!("biome slot {} is empty; skipping it", index);
                    Ok(None)
                }
            },
        }
    }

    /// Weights of slot `index` over `bounds`, or `None` for a skipped slot.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::MissingBiome`] for an empty slot in strict mode.
    pub fn layer_weights(
        &self,
        index: usize,
        bounds: &GridBounds,
        origin: [f64; 2],
        jobs: &JobSystem,
    ) -> GenResult<Option<Vec<f64>>> {
        Ok(self
            .checked(index)?
            .map(|biome| biome.weights(bounds, origin, jobs)))
    }

    /// Weights and packs every biome in order over `bounds`.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::MissingBiome`] for an empty slot in strict mode.
    pub fn generate(
        &self,
        bounds: &GridBounds,
        origin: [f64; 2],
        jobs: &JobSystem,
    ) -> GenResult<Vec<PackedBiomes>> {
        let mut packed = vec![PackedBiomes::EMPTY; bounds.len()];
        for index in 0..self.len() {
            if let Some(weights) = self.layer_weights(index, bounds, origin, jobs)? {
                pack_layer(&mut packed, index, &weights, jobs);
            }
        }
        Ok(packed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::GlobalBiome;
    use crate::curve::Curve;

    fn global(name: &str, threshold: f64) -> Biome {
        GlobalBiome::new(name, threshold, Curve::identity()).unwrap().into()
    }

    #[test]
    fn test_encoding_roundtrip() {
        let value = PackedBiomes::encode(7, 0.25);
        assert_eq!(value, 7.25);
        let packed = PackedBiomes([value, EMPTY_LANE, EMPTY_LANE, EMPTY_LANE]);
        assert_eq!(packed.lane(0), Some((7, 0.25)));
        assert_eq!(packed.lane(1), None);
        assert_eq!(packed.count(), 1);
    }

    #[test]
    fn test_full_weight_does_not_carry() {
        let mut packed = PackedBiomes::EMPTY;
        assert!(packed.pack(3, 1.0));
        let (index, weight) = packed.lane(0).unwrap();
        assert_eq!(index, 3);
        assert!((weight - 1.0).abs() < 1e-3);
        let exported = packed.to_f32()[0];
        assert_eq!(exported.floor(), 3.0);
    }

    #[test]
    fn test_fills_empty_lanes_in_order() {
        let mut packed = PackedBiomes::EMPTY;
        for index in 0..3 {
            assert!(packed.pack(index, 0.0));
        }
        assert_eq!(packed.lane(0), Some((0, 0.0)));
        assert_eq!(packed.lane(1), Some((1, 0.0)));
        assert_eq!(packed.lane(2), Some((2, 0.0)));
        assert_eq!(packed.lane(3), None);
    }

    #[test]
    fn test_ignores_negative_candidates() {
        let mut packed = PackedBiomes::EMPTY;
        assert!(!packed.pack(0, -1.0));
        assert!(!packed.pack(0, f64::NAN));
        assert_eq!(packed, PackedBiomes::EMPTY);
    }

    #[test]
    fn test_packing_cap_keeps_top_four() {
        let mut packed = PackedBiomes::EMPTY;
        for index in 0..9 {
            packed.pack(index, 0.1 * (index as f64 + 1.0) * 0.9);
        }
        let mut indices: Vec<usize> = packed.iter().map(|(index, _)| index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_tie_replaces_first_weakest_lane() {
        let mut packed = PackedBiomes::EMPTY;
        for index in 0..4 {
            packed.pack(index, 0.5);
        }
        // Equal weight evicts; lane 0 is the first of the tied lanes
        assert!(packed.pack(4, 0.5));
        assert_eq!(packed.lane(0).map(|(i, _)| i), Some(4));
        // Still tied everywhere, so lane 0 again
        assert!(packed.pack(5, 0.5));
        assert_eq!(packed.lane(0).map(|(i, _)| i), Some(5));
        // Weaker candidates are rejected
        assert!(!packed.pack(6, 0.4));
    }

    #[test]
    fn test_weaker_lane_is_evicted_first() {
        let mut packed = PackedBiomes([0.9, 1.2, 2.7, 3.5]);
        assert!(packed.pack(4, 0.3));
        let (index, weight) = packed.lane(1).unwrap();
        assert_eq!(index, 4);
        assert!((weight - 0.3).abs() < 1e-9);
        assert_eq!(packed.lane(0).map(|(i, _)| i), Some(0));
    }

    #[test]
    fn test_map_generate_strict_and_lenient() {
        let bounds = GridBounds::from_chunk([0, 0], 4);
        let jobs = JobSystem::single_threaded();

        let strict = BiomeMap::new(vec![Some(global("a", 0.2)), None], ValidationMode::Strict).unwrap();
        assert_eq!(
            strict.generate(&bounds, [0.0, 0.0], &jobs).unwrap_err(),
            GenError::MissingBiome { index: 1 }
        );

        let lenient = BiomeMap::new(
            vec![Some(global("a", 0.2)), None, Some(global("c", 0.6))],
            ValidationMode::Lenient,
        )
        .unwrap();
        let packed = lenient.generate(&bounds, [0.0, 0.0], &jobs).unwrap();
        assert_eq!(packed.len(), 25);
        for cell in &packed {
            let pairs: Vec<usize> = cell.iter().map(|(index, _)| index).collect();
            assert_eq!(pairs, vec![0, 2]);
        }
    }

    #[test]
    fn test_too_many_biomes() {
        let biomes = vec![None; MAX_BIOMES + 1];
        assert!(matches!(
            BiomeMap::new(biomes, ValidationMode::Lenient),
            Err(GenError::TooManyBiomes { .. })
        ));
    }

    #[test]
    fn test_pack_layer_parallel_matches_sequential() {
        let weights: Vec<f64> = (0..1000_i32).map(|i| f64::from(i % 17) / 17.0).collect();
        let mut sequential = vec![PackedBiomes::EMPTY; 1000];
        let mut parallel = vec![PackedBiomes::EMPTY; 1000];
        for layer in 0..6 {
            pack_layer(&mut sequential, layer, &weights, &JobSystem::single_threaded());
            pack_layer(&mut parallel, layer, &weights, &JobSystem::new(4));
        }
        assert_eq!(sequential, parallel);
    }
}
