//! # Tessera Procedural Terrain
//!
//! Deterministic terrain generation for large, tiled worlds.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: Same seed and settings always produce the same chunk,
//!    whatever the worker count
//! 2. **Chunked**: The world is generated in fixed-size square chunks
//! 3. **Explicit context**: Seed, random streams and workers are passed in,
//!    never looked up globally
//! 4. **Render agnostic**: Output is flat buffers; rasterizing the island
//!    mask is a pluggable collaborator
//!
//! ## Core Components
//!
//! - `FractalNoise`: Octave-summed value/simplex noise over world cells
//! - `Biome` / `BiomeMap`: Per-cell biome weights packed four to a cell
//! - `blend`: Curve remapping and mixing of neighbouring biomes
//! - `MaskGenerator`: Perturbed-disc island silhouette
//! - `ChunkGenerator`: Runs the whole pipeline for one chunk
//! - `GeneratorConfig`: TOML configuration
//!
//! ## Example
//!
//! ```rust
//! use tessera_procedural::{ChunkCoord, ChunkGenerator, GeneratorConfig};
//!
//! let config = GeneratorConfig::from_toml_str(
//!     "seed = 1\nchunk_size = 32\n[mask]\nenabled = false",
//! )?;
//! let generator = ChunkGenerator::from_config(&config)?;
//! let mesh = generator.generate(ChunkCoord::new(0, 0))?;
//! assert_eq!(mesh.vertex_count(), 33 * 33);
//! # Ok::<(), tessera_procedural::GenError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod biome;
pub mod biome_map;
pub mod blend;
pub mod chunk;
pub mod config;
pub mod context;
pub mod curve;
pub mod error;
pub mod fractal;
pub mod mask;
pub mod noise;

pub use biome::{Biome, GlobalBiome, NoiseBiome, ThresholdOperation};
pub use biome_map::{pack_layer, BiomeMap, PackedBiomes, ValidationMode, MAX_BIOMES};
pub use blend::{blend_grid, blend_height};
pub use chunk::{ChunkCoord, ChunkGenerator, ChunkMesh, ChunkSettings, TerrainVertex};
pub use config::{BiomeConfig, GeneratorConfig};
pub use context::{origin_shift, purpose, GeneratorContext, OriginShift, WorldSeed};
pub use curve::{Curve, Keyframe};
pub use error::{GenError, GenResult};
pub use fractal::{BaseNoise, FractalNoise, FractalSettings, GridBounds};
pub use mask::{
    CpuRasterizer, MaskField, MaskGenerator, MaskMesh, MaskRasterizer, MaskSettings, ReadbackTicket,
};
