//! # Generator Configuration
//!
//! Everything needed to build a terrain generator, loadable from TOML.
//! Every field has a default, so a config file only lists what it changes.
//!
//! ```toml
//! seed = 1
//! world_size = 4096.0
//! chunk_size = 128
//!
//! [heightmap]
//! octaves = 6
//!
//! [mask]
//! enabled = false
//!
//! [[biomes]]
//! kind = "global"
//! name = "ocean"
//!
//! [[biomes]]
//! kind = "noise"
//! name = "hills"
//! threshold = 0.6
//! operation = "greater"
//! normalize = true
//! curve = [{ time = -1.0, value = -1.0, out_tangent = 1.0 }, { time = 1.0, value = 2.0 }, { time = 2.0, value = 2.0 }]
//! ```
//!
//! Seeds above `i64::MAX` cannot be written in TOML; set them in code.

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::biome::{Biome, GlobalBiome, NoiseBiome, ThresholdOperation};
use crate::biome_map::{BiomeMap, ValidationMode, MAX_BIOMES};
use crate::chunk::{ChunkSettings, MAX_CHUNK_SIZE};
use crate::context::{purpose, GeneratorContext, WorldSeed};
use crate::curve::{Curve, Keyframe};
use crate::error::{GenError, GenResult};
use crate::fractal::{FractalNoise, FractalSettings};
use crate::mask::MaskSettings;

fn default_global_threshold() -> f64 {
    GlobalBiome::DEFAULT_THRESHOLD
}

fn default_noise_threshold() -> f64 {
    0.5
}

/// One entry of the biome list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BiomeConfig {
    /// Constant weight everywhere.
    Global {
        /// Display name.
        name: String,
        /// Constant weight.
        #[serde(default = "default_global_threshold")]
        threshold: f64,
        /// Height remap; empty means identity.
        #[serde(default)]
        curve: Vec<Keyframe>,
    },
    /// Weight from fractal noise against a threshold.
    Noise {
        /// Display name.
        name: String,
        /// Selection noise.
        #[serde(default)]
        noise: FractalSettings,
        /// Comparison threshold.
        #[serde(default = "default_noise_threshold")]
        threshold: f64,
        /// Comparison.
        #[serde(default)]
        operation: ThresholdOperation,
        /// Rescale weights to `[0, 1]`.
        #[serde(default)]
        normalize: bool,
        /// Height remap; empty means identity.
        #[serde(default)]
        curve: Vec<Keyframe>,
    },
    /// Placeholder slot with no biome.
    Missing,
}

impl BiomeConfig {
    /// Display name, if the slot is filled.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Global { name, .. } | Self::Noise { name, .. } => Some(name),
            Self::Missing => None,
        }
    }

    /// Checks the entry without building it.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed curve, a non-finite threshold or bad
    /// noise settings.
    pub fn validate(&self) -> GenResult<()> {
        match self {
            Self::Global {
                threshold, curve, ..
            } => {
                check_threshold(*threshold)?;
                build_curve(curve).map(drop)
            }
            Self::Noise {
                noise,
                threshold,
                curve,
                ..
            } => {
                noise.validate()?;
                check_threshold(*threshold)?;
                build_curve(curve).map(drop)
            }
            Self::Missing => Ok(()),
        }
    }

    /// Builds the biome, drawing any noise offsets from `rng`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`validate`](Self::validate).
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> GenResult<Option<Biome>> {
        match self {
            Self::Global {
                name,
                threshold,
                curve,
            } => Ok(Some(
                GlobalBiome::new(name.clone(), *threshold, build_curve(curve)?)?.into(),
            )),
            Self::Noise {
                name,
                noise,
                threshold,
                operation,
                normalize,
                curve,
            } => Ok(Some(
                NoiseBiome::new(
                    name.clone(),
                    *noise,
                    *threshold,
                    *operation,
                    *normalize,
                    build_curve(curve)?,
                    rng,
                )?
                .into(),
            )),
            Self::Missing => Ok(None),
        }
    }
}

fn check_threshold(threshold: f64) -> GenResult<()> {
    if threshold.is_finite() {
        Ok(())
    } else {
        Err(GenError::InvalidNoiseParameter {
            name: "threshold",
            value: threshold,
        })
    }
}

fn build_curve(keys: &[Keyframe]) -> GenResult<Curve> {
    if keys.is_empty() {
        Ok(Curve::identity())
    } else {
        Curve::new(keys)
    }
}

/// Full generator configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// World seed.
    pub seed: u64,
    /// World edge length in cells, rounded to the mask step.
    pub world_size: f32,
    /// Chunk edge length in cells.
    pub chunk_size: usize,
    /// Worker threads; 0 means one per hardware thread.
    pub workers: usize,
    /// Vertical scale applied to final heights.
    pub height_scale: f32,
    /// Horizontal distance between vertices.
    pub cell_size: f32,
    /// Weight window within which biomes are mixed.
    pub blend: f64,
    /// How empty biome slots are treated.
    pub validation: ValidationMode,
    /// Raw height noise.
    pub heightmap: FractalSettings,
    /// Island mask.
    pub mask: MaskSettings,
    /// Biomes in priority order.
    pub biomes: Vec<BiomeConfig>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED_CAFE_BABE,
            world_size: 16_384.0,
            chunk_size: 256,
            workers: 0,
            height_scale: 100.0,
            cell_size: 1.0,
            blend: 0.1,
            validation: ValidationMode::default(),
            heightmap: FractalSettings::default(),
            mask: MaskSettings::default(),
            biomes: vec![BiomeConfig::Global {
                name: "default".into(),
                threshold: GlobalBiome::DEFAULT_THRESHOLD,
                curve: Vec::new(),
            }],
        }
    }
}

impl GeneratorConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::InvalidConfig`] for malformed TOML, or the first
    /// validation error.
    pub fn from_toml_str(text: &str) -> GenResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::InvalidConfig`] if the file cannot be read, plus
    /// everything [`from_toml_str`](Self::from_toml_str) returns.
    pub fn from_toml_file(path: impl AsRef<Path>) -> GenResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::InvalidConfig`] if a value has no TOML form, such
    /// as a seed above `i64::MAX`.
    pub fn to_toml_string(&self) -> GenResult<String> {
        toml::to_string(self).map_err(|err| GenError::InvalidConfig(err.to_string()))
    }

    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    #[allow(clippy::cast_precision_loss)]
    pub fn validate(&self) -> GenResult<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(GenError::InvalidChunkSize {
                name: "chunk_size",
                value: self.chunk_size as f64,
            });
        }
        for (name, value) in [
            ("world_size", self.world_size),
            ("cell_size", self.cell_size),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(GenError::InvalidChunkSize {
                    name,
                    value: f64::from(value),
                });
            }
        }
        if !self.height_scale.is_finite() {
            return Err(GenError::InvalidChunkSize {
                name: "height_scale",
                value: f64::from(self.height_scale),
            });
        }
        if !(self.blend.is_finite() && self.blend >= 0.0) {
            return Err(GenError::InvalidNoiseParameter {
                name: "blend",
                value: self.blend,
            });
        }

        self.heightmap.validate()?;
        if self.mask.enabled {
            self.mask.validate()?;
            if self.mask.mask_size(self.world_size) == 0 {
                return Err(GenError::InvalidChunkSize {
                    name: "world_size",
                    value: f64::from(self.world_size),
                });
            }
        }

        if self.biomes.len() > MAX_BIOMES {
            return Err(GenError::TooManyBiomes {
                count: self.biomes.len(),
                max: MAX_BIOMES,
            });
        }
        self.biomes.iter().try_for_each(BiomeConfig::validate)
    }

    /// World size after rounding to the mask step.
    #[must_use]
    pub fn rounded_world_size(&self) -> f32 {
        self.mask.round_world_size(self.world_size)
    }

    /// Seed and job system for this configuration.
    #[must_use]
    pub fn context(&self) -> GeneratorContext {
        GeneratorContext::with_workers(WorldSeed::new(self.seed), self.workers)
    }

    /// Chunk assembly settings.
    #[must_use]
    pub fn chunk_settings(&self) -> ChunkSettings {
        ChunkSettings {
            size: self.chunk_size,
            height_scale: self.height_scale,
            cell_size: self.cell_size,
            blend: self.blend,
        }
    }

    /// Builds the raw height field from the heightmap stream.
    ///
    /// # Errors
    ///
    /// Returns the error from [`FractalSettings::validate`].
    pub fn build_heightmap(&self, context: &GeneratorContext) -> GenResult<FractalNoise> {
        FractalNoise::new(self.heightmap, &mut context.rng(purpose::HEIGHTMAP))
    }

    /// Builds the biome list. Biome `i` draws from its own stream, so adding
    /// a biome does not change the ones before it.
    ///
    /// # Errors
    ///
    /// Returns the first biome error or [`GenError::TooManyBiomes`].
    pub fn build_biome_map(&self, context: &GeneratorContext) -> GenResult<BiomeMap> {
        let biomes = self
            .biomes
            .iter()
            .enumerate()
            .map(|(index, biome)| biome.build(&mut context.rng(purpose::biome(index))))
            .collect::<GenResult<Vec<_>>>()?;
        BiomeMap::new(biomes, self.validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fractal::BaseNoise;

    const SAMPLE: &str = r#"
seed = 7
world_size = 2048.0
chunk_size = 64
workers = 2
blend = 0.2
validation = "lenient"

[heightmap]
octaves = 3
base = "simplex"

[mask]
complexity = 128
divisor = 8

[[biomes]]
kind = "global"
name = "ocean"
curve = [{ time = -1.0, value = -0.5, in_tangent = 0.5, out_tangent = 0.5 }, { time = 1.0, value = 0.5 }, { time = 2.0, value = 0.5 }]

[[biomes]]
kind = "missing"

[[biomes]]
kind = "noise"
name = "hills"
threshold = 0.6
operation = "less_equal"
normalize = true

[biomes.noise]
scale = 300.0
octaves = 2
"#;

    #[test]
    fn test_parse_sample() {
        let config = GeneratorConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.chunk_size, 64);
        assert_eq!(config.validation, ValidationMode::Lenient);
        assert_eq!(config.heightmap.octaves, 3);
        assert_eq!(config.heightmap.base, BaseNoise::Simplex);
        assert_eq!(config.heightmap.gain, 0.5);
        assert_eq!(config.mask.complexity, 128);
        assert!(config.mask.enabled);
        assert_eq!(config.biomes.len(), 3);
        assert_eq!(config.biomes[1], BiomeConfig::Missing);
        match &config.biomes[2] {
            BiomeConfig::Noise {
                name,
                noise,
                threshold,
                operation,
                normalize,
                curve,
            } => {
                assert_eq!(name, "hills");
                assert_eq!(noise.scale, 300.0);
                assert_eq!(noise.octaves, 2);
                assert_eq!(*threshold, 0.6);
                assert_eq!(*operation, ThresholdOperation::LessEqual);
                assert!(*normalize);
                assert!(curve.is_empty());
            }
            other => panic!("expected a noise biome, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_apply() {
        let config = GeneratorConfig::from_toml_str("seed = 3").unwrap();
        let defaults = GeneratorConfig::default();
        assert_eq!(config.seed, 3);
        assert_eq!(config.chunk_size, defaults.chunk_size);
        assert_eq!(config.mask, defaults.mask);
        assert_eq!(config.biomes, defaults.biomes);

        let global: GeneratorConfig =
            toml::from_str("[[biomes]]\nkind = \"global\"\nname = \"flat\"").unwrap();
        assert_eq!(
            global.biomes[0],
            BiomeConfig::Global {
                name: "flat".into(),
                threshold: GlobalBiome::DEFAULT_THRESHOLD,
                curve: Vec::new(),
            }
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            GeneratorConfig::from_toml_str("chunk_size = 0"),
            Err(GenError::InvalidChunkSize { name: "chunk_size", .. })
        ));
        assert!(matches!(
            GeneratorConfig::from_toml_str("blend = -1.0"),
            Err(GenError::InvalidNoiseParameter { name: "blend", .. })
        ));
        assert!(matches!(
            GeneratorConfig::from_toml_str("[mask]\ncomplexity = 100"),
            Err(GenError::ComplexityNotAligned { .. })
        ));
        // Disabled masks are not checked
        assert!(GeneratorConfig::from_toml_str("[mask]\nenabled = false\ncomplexity = 100").is_ok());
        assert!(matches!(
            GeneratorConfig::from_toml_str(
                "[[biomes]]\nkind = \"global\"\nname = \"x\"\ncurve = [{ time = 0.0 }]"
            ),
            Err(GenError::CurveTooShort(1))
        ));
        assert!(matches!(
            GeneratorConfig::from_toml_str("chunk_size = \"big\""),
            Err(GenError::InvalidConfig(_))
        ));
        assert!(matches!(
            GeneratorConfig::from_toml_str("[[biomes]]\nkind = \"volcano\"\nname = \"x\""),
            Err(GenError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = GeneratorConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(GeneratorConfig::from_toml_str(&text).unwrap(), config);

        let huge = GeneratorConfig {
            seed: u64::MAX,
            ..GeneratorConfig::default()
        };
        assert!(huge.to_toml_string().is_err());
    }

    #[test]
    fn test_file_loading() {
        let path = std::env::temp_dir().join(format!("tessera-config-{}.toml", std::process::id()));
        std::fs::write(&path, SAMPLE).unwrap();
        let config = GeneratorConfig::from_toml_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.seed, 7);

        assert!(matches!(
            GeneratorConfig::from_toml_file(path),
            Err(GenError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_builds_biome_map() {
        let config = GeneratorConfig::from_toml_str(SAMPLE).unwrap();
        let context = config.context();
        assert_eq!(context.jobs().workers(), 2);

        let map = config.build_biome_map(&context).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(0).map(Biome::name), Some("ocean"));
        assert!(map.get(1).is_none());
        assert_eq!(map.get(2).map(Biome::name), Some("hills"));

        // Same seed, same noise offsets
        let again = config.build_biome_map(&config.context()).unwrap();
        assert_eq!(map, again);
        assert_eq!(
            config.build_heightmap(&context).unwrap(),
            config.build_heightmap(&context).unwrap()
        );
    }

    #[test]
    fn test_world_size_rounding_and_chunk_settings() {
        let config = GeneratorConfig {
            world_size: 1001.0,
            chunk_size: 32,
            ..GeneratorConfig::default()
        };
        assert_eq!(config.rounded_world_size(), 1000.0);
        let settings = config.chunk_settings();
        assert_eq!(settings.size, 32);
        assert_eq!(settings.blend, config.blend);
    }
}
