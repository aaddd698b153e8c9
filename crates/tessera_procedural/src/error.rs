//! Error types for terrain generation.

use thiserror::Error;

/// Errors that can occur while configuring or running a generator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenError {
    /// Fractal settings asked for no octaves.
    #[error("octave count must be at least 1, got {0}")]
    InvalidOctaves(u32),

    /// Noise scale must be strictly positive and finite.
    #[error("noise scale must be positive and finite, got {0}")]
    InvalidScale(f64),

    /// A gain, lacunarity or threshold value is not usable.
    #[error("invalid noise parameter `{name}`: {value}")]
    InvalidNoiseParameter {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// Mask complexity is not a whole number of SIMD batches.
    #[error("mask complexity {complexity} is not a multiple of the batch size {batch}")]
    ComplexityNotAligned {
        /// Requested vertex count.
        complexity: usize,
        /// Required multiple.
        batch: usize,
    },

    /// Mask complexity is too small to form a polygon.
    #[error("mask complexity {complexity} is below the minimum of {minimum}")]
    ComplexityTooSmall {
        /// Requested vertex count.
        complexity: usize,
        /// Smallest accepted value.
        minimum: usize,
    },

    /// A curve needs at least two keyframes.
    #[error("curve needs at least 2 keyframes, got {0}")]
    CurveTooShort(usize),

    /// Keyframe times must be strictly increasing.
    #[error("curve keyframe {index} does not increase (x = {x})")]
    CurveNotIncreasing {
        /// Index of the offending keyframe.
        index: usize,
        /// Its time value.
        x: f32,
    },

    /// More biomes than the packed encoding can index.
    #[error("too many biomes: {count} (max {max})")]
    TooManyBiomes {
        /// Configured biome count.
        count: usize,
        /// Encoding limit.
        max: usize,
    },

    /// Chunk or world size is unusable.
    #[error("invalid size `{name}`: {value}")]
    InvalidChunkSize {
        /// Size parameter name.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A biome slot is empty while validation is strict.
    #[error("biome {index} is missing")]
    MissingBiome {
        /// Position in the biome list.
        index: usize,
    },

    /// Mask output was requested before the mask was generated.
    #[error("island mask has not been generated")]
    MaskNotGenerated,

    /// The mask rasterizer reported a failure.
    #[error("mask rasterization failed: {0}")]
    Rasterization(String),

    /// A pipeline stage finished without producing its output.
    #[error("job `{0}` produced no output")]
    JobIncomplete(&'static str),
}

/// Result type for generator operations.
pub type GenResult<T> = Result<T, GenError>;

impl From<toml::de::Error> for GenError {
    fn from(err: toml::de::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl From<std::io::Error> for GenError {
    fn from(err: std::io::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
