//! # Height Blending
//!
//! Turns raw noise height into final terrain height. Every biome packed into
//! a cell remaps the raw height through its curve; the results are mixed by
//! weight wherever biomes are close to each other in strength.
//!
//! ## Blend Window
//!
//! With `blend` the configured window and `max` the strongest lane weight,
//! a lane with weight `w` takes part with
//!
//! ```text
//! ramp = unlerp(blend, 0, max - w)    clamped to [0, 1], 0 past the window
//! bw   = w * ramp
//! ```
//!
//! and the height is `sum(bw * curve(raw)) / sum(bw)`. A cell where only one
//! lane contributes gets that lane's curve value unchanged.

use tessera_core::jobs::JobSystem;
use tessera_core::math::{clamp01, unlerp};

use crate::biome_map::{BiomeMap, PackedBiomes, LANES};

/// Cells per work item when blending.
const BLEND_BATCH: usize = 512;

/// Final height of one cell.
///
/// Lanes naming an empty biome slot are skipped. A cell with no usable lane
/// keeps its raw height.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn blend_height(raw: f64, packed: &PackedBiomes, map: &BiomeMap, blend: f64) -> f64 {
    // (weight, curve value) per usable lane
    let mut lanes = [(0.0, 0.0); LANES];
    let mut count = 0;
    for (index, weight) in packed.iter() {
        if let Some(biome) = map.get(index) {
            lanes[count] = (weight, f64::from(biome.curve().evaluate(raw as f32)));
            count += 1;
        }
    }

    let lanes = &lanes[..count];
    match lanes {
        [] => return raw,
        [(_, value)] => return *value,
        _ => {}
    }

    let strongest = lanes.iter().fold(f64::MIN, |max, &(weight, _)| max.max(weight));
    let ramp = |weight: f64| {
        let spread = strongest - weight;
        if blend > 0.0 {
            if spread > blend {
                0.0
            } else {
                clamp01(unlerp(blend, 0.0, spread))
            }
        } else if spread <= 0.0 {
            1.0
        } else {
            0.0
        }
    };

    let mut blend_weights = [0.0; LANES];
    let mut total = 0.0;
    for (slot, &(weight, _)) in blend_weights.iter_mut().zip(lanes) {
        *slot = weight * ramp(weight);
        total += *slot;
    }
    if total <= 0.0 {
        // Strongest lanes all carry zero weight: mix them evenly
        total = 0.0;
        for (slot, &(weight, _)) in blend_weights.iter_mut().zip(lanes) {
            *slot = ramp(weight);
            total += *slot;
        }
    }

    let mut contributing = blend_weights
        .iter()
        .zip(lanes)
        .filter(|(weight, _)| **weight > 0.0);
    if let (Some((_, &(_, value))), None) = (contributing.next(), contributing.next()) {
        return value;
    }

    blend_weights
        .iter()
        .zip(lanes)
        .map(|(weight, &(_, value))| weight * value)
        .sum::<f64>()
        / total
}

/// Blends a whole grid into `out`.
///
/// `out`, `raw` and `packed` are matched by index; only the shortest length
/// is written.
pub fn blend_into(
    out: &mut [f64],
    raw: &[f64],
    packed: &[PackedBiomes],
    map: &BiomeMap,
    blend: f64,
    jobs: &JobSystem,
) {
    let len = out.len().min(raw.len()).min(packed.len());
    jobs.parallel_for(&mut out[..len], BLEND_BATCH, |cell, slot| {
        *slot = blend_height(raw[cell], &packed[cell], map, blend);
    });
}

/// Blends a whole grid.
#[must_use]
pub fn blend_grid(
    raw: &[f64],
    packed: &[PackedBiomes],
    map: &BiomeMap,
    blend: f64,
    jobs: &JobSystem,
) -> Vec<f64> {
    let mut out = vec![0.0; raw.len().min(packed.len())];
    blend_into(&mut out, raw, packed, map, blend, jobs);
    out
}
