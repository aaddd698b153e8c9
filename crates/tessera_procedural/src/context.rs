//! # Generator Context
//!
//! Everything a generation run needs besides its settings: the world seed,
//! the job system and per-purpose random streams. Passed explicitly to each
//! stage, so two contexts with the same seed produce the same world no
//! matter what else is running in the process.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tessera_core::jobs::JobSystem;

/// World seed for deterministic generation.
///
/// All procedural generation derives from this seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldSeed(u64);

impl WorldSeed {
    /// Creates a new world seed.
    #[inline]
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Returns the raw seed value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Derives a sub-seed for a specific purpose (e.g. one biome's offsets).
    ///
    /// Uses a hash function to create independent streams from one seed.
    #[inline]
    #[must_use]
    pub const fn derive(self, purpose: u64) -> Self {
        let mut hash = self.0;
        hash ^= purpose;
        hash = hash.wrapping_mul(0x517c_c1b7_2722_0a95);
        hash ^= hash >> 32;
        Self(hash)
    }

    /// Deterministic random stream for `purpose`.
    #[must_use]
    pub fn rng(self, purpose: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.derive(purpose).value())
    }
}

impl Default for WorldSeed {
    fn default() -> Self {
        Self(0xDEAD_BEEF_CAFE_BABE)
    }
}

/// Purposes used to derive independent random streams.
pub mod purpose {
    /// Heightmap octave offsets.
    pub const HEIGHTMAP: u64 = 0x4845_4947_4854;
    /// Island mask angles and extent seed.
    pub const MASK: u64 = 0x4d41_534b;
    /// Base value for biome noise; the biome index is added.
    pub const BIOME_BASE: u64 = 0x4249_4f4d_0000;

    /// Stream purpose of the biome at `index`.
    #[inline]
    #[must_use]
    pub const fn biome(index: usize) -> u64 {
        BIOME_BASE + index as u64
    }
}

/// Seed and scheduler shared by all stages of one generator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneratorContext {
    seed: WorldSeed,
    jobs: JobSystem,
}

impl GeneratorContext {
    /// Creates a context from a seed and job system.
    #[must_use]
    pub fn new(seed: WorldSeed, jobs: JobSystem) -> Self {
        Self { seed, jobs }
    }

    /// Context with `workers` threads; 0 means one per hardware thread.
    #[must_use]
    pub fn with_workers(seed: WorldSeed, workers: usize) -> Self {
        let jobs = if workers == 0 {
            JobSystem::available()
        } else {
            JobSystem::new(workers)
        };
        Self::new(seed, jobs)
    }

    /// World seed.
    #[inline]
    #[must_use]
    pub const fn seed(&self) -> WorldSeed {
        self.seed
    }

    /// Job system used for every parallel stage.
    #[inline]
    #[must_use]
    pub const fn jobs(&self) -> &JobSystem {
        &self.jobs
    }

    /// Random stream for `purpose`, independent of every other purpose.
    #[must_use]
    pub fn rng(&self, purpose: u64) -> ChaCha8Rng {
        self.seed.rng(purpose)
    }
}

/// Result of a floating-origin recentre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OriginShift {
    /// Whole shift steps taken per axis (x, z).
    pub index: [i32; 2],
    /// Distance to subtract from positions per axis (x, z).
    pub amount: [f32; 2],
}

impl OriginShift {
    /// Returns true if nothing needs to move.
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.index == [0, 0]
    }
}

/// Computes how far to recentre the world around `position` (x, z).
///
/// Steps are truncated toward zero, so positions within one `shift_size`
/// of the origin on either side are left alone.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn origin_shift(position: [f32; 2], shift_size: f32) -> OriginShift {
    let steps = position.map(|p| (p / shift_size).trunc());
    OriginShift {
        // Saturating float-to-int cast
        index: steps.map(|s| s as i32),
        amount: steps.map(|s| s * shift_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_seed_derivation() {
        let seed = WorldSeed::new(12345);
        assert_ne!(seed.derive(1), seed.derive(2));
        assert_eq!(seed.derive(1), seed.derive(1));
        assert_ne!(seed.derive(1).value(), seed.value());
    }

    #[test]
    fn test_streams_are_reproducible() {
        let context = GeneratorContext::with_workers(WorldSeed::new(7), 1);
        let a: Vec<u64> = (0..8).map(|_| context.rng(purpose::MASK).gen()).collect();
        let mut rng = context.rng(purpose::MASK);
        let b: Vec<u64> = (0..8).map(|_| rng.gen()).collect();
        // Fresh stream per call: first draw repeats
        assert!(a.iter().all(|&v| v == a[0]));
        assert_eq!(a[0], b[0]);
        assert_ne!(b[0], b[1]);
    }

    #[test]
    fn test_purposes_are_independent() {
        let seed = WorldSeed::new(1);
        let heights: u64 = seed.rng(purpose::HEIGHTMAP).gen();
        let mask: u64 = seed.rng(purpose::MASK).gen();
        let biome0: u64 = seed.rng(purpose::biome(0)).gen();
        let biome1: u64 = seed.rng(purpose::biome(1)).gen();
        assert_ne!(heights, mask);
        assert_ne!(biome0, biome1);
    }

    #[test]
    fn test_worker_selection() {
        let context = GeneratorContext::with_workers(WorldSeed::default(), 3);
        assert_eq!(context.jobs().workers(), 3);
        assert!(GeneratorContext::with_workers(WorldSeed::default(), 0).jobs().workers() >= 1);
    }

    #[test]
    fn test_origin_shift_truncates() {
        let shift = origin_shift([5000.0, -5000.0], 4096.0);
        assert_eq!(shift.index, [1, -1]);
        assert_eq!(shift.amount, [4096.0, -4096.0]);

        let none = origin_shift([4095.0, -4095.0], 4096.0);
        assert!(none.is_zero());
        assert_eq!(none.amount, [0.0, -0.0]);

        let far = origin_shift([9000.0, 0.0], 4096.0);
        assert_eq!(far.index, [2, 0]);
    }
}
