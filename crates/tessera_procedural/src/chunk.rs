//! # Chunk Assembly
//!
//! The world is cut into square chunks of `size x size` cells. A chunk's
//! mesh has `(size + 1)^2` vertices so neighbouring chunks share their edge
//! vertices exactly.
//!
//! ## Pipeline
//!
//! ```text
//! heightmap ──┬── (x mask) ──────────────────────┐
//! mask ───────┘                                  ├── blend ── positions
//! weights 0 ── pack 0 ── pack 1 ── ... pack n ───┘
//! weights 1 ──────────┘
//! indices, uvs (independent)
//! ```
//!
//! Biome weights are computed in parallel, but packing runs strictly in
//! list order because every pack step mutates the same per-cell buffer.
//! [`ChunkGenerator::generate`] blocks until the whole graph has finished.

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use tessera_core::jobs::{JobGraph, JobHandle, JobOutput};

use crate::biome_map::{pack_layer, BiomeMap, PackedBiomes};
use crate::blend::blend_grid;
use crate::config::GeneratorConfig;
use crate::context::{purpose, GeneratorContext, OriginShift};
use crate::error::{GenError, GenResult};
use crate::fractal::{FractalNoise, GridBounds};
use crate::mask::{CpuRasterizer, MaskField, MaskGenerator};

/// Largest chunk edge whose vertex indices still fit in `u32`.
pub const MAX_CHUNK_SIZE: usize = 65_534;

/// Cells per work item for per-vertex passes.
const VERTEX_BATCH: usize = 1024;

/// Chunk coordinate (identifies a chunk in the world grid).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChunkCoord {
    /// X coordinate (in chunks, not cells).
    pub x: i32,
    /// Z coordinate (in chunks, not cells).
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing a world cell.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn from_world_pos(world_x: i64, world_z: i64, size: usize) -> Self {
        let size = size as i64;
        Self {
            x: world_x.div_euclid(size) as i32,
            z: world_z.div_euclid(size) as i32,
        }
    }

    /// World X of the chunk's corner.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn world_x(self, size: usize) -> i64 {
        self.x as i64 * size as i64
    }

    /// World Z of the chunk's corner.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn world_z(self, size: usize) -> i64 {
        self.z as i64 * size as i64
    }

    /// Vertex grid of this chunk.
    #[inline]
    #[must_use]
    pub fn bounds(self, size: usize) -> GridBounds {
        GridBounds::from_chunk([self.x, self.z], size)
    }
}

/// Mesh assembly settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkSettings {
    /// Cells per chunk edge.
    pub size: usize,
    /// Vertical scale applied to final heights.
    pub height_scale: f32,
    /// Horizontal distance between vertices.
    pub cell_size: f32,
    /// Biome blend window.
    pub blend: f64,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            size: 256,
            height_scale: 100.0,
            cell_size: 1.0,
            blend: 0.1,
        }
    }
}

impl ChunkSettings {
    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::InvalidChunkSize`] for a size outside
    /// `1..=MAX_CHUNK_SIZE` or non-finite scales, and
    /// [`GenError::InvalidNoiseParameter`] for a negative blend window.
    #[allow(clippy::cast_precision_loss)]
    pub fn validate(&self) -> GenResult<()> {
        if self.size == 0 || self.size > MAX_CHUNK_SIZE {
            return Err(GenError::InvalidChunkSize {
                name: "size",
                value: self.size as f64,
            });
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(GenError::InvalidChunkSize {
                name: "cell_size",
                value: f64::from(self.cell_size),
            });
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
        Ok(())
    }

    /// Vertices per chunk edge.
    #[inline]
    #[must_use]
    pub const fn vertices_per_edge(&self) -> usize {
        self.size + 1
    }
}

/// Interleaved vertex layout for upload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TerrainVertex {
    /// Chunk-local position.
    pub position: [f32; 3],
    /// Texture coordinate in `[0, 1]`.
    pub uv: [f32; 2],
    /// Packed biome lanes.
    pub biomes: [f32; 4],
}

impl TerrainVertex {
    /// Raw bytes of a vertex slice.
    #[inline]
    #[must_use]
    pub fn as_bytes(vertices: &[Self]) -> &[u8] {
        bytemuck::cast_slice(vertices)
    }
}

/// Generated chunk buffers.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkMesh {
    /// Which chunk this is.
    pub coord: ChunkCoord,
    /// Cells per edge.
    pub size: usize,
    /// Raw fractal height per vertex, after the island mask.
    pub noise: Vec<f64>,
    /// Final height per vertex, before `height_scale`.
    pub heights: Vec<f64>,
    /// Chunk-local vertex positions.
    pub positions: Vec<[f32; 3]>,
    /// Texture coordinates.
    pub uvs: Vec<[f32; 2]>,
    /// Two triangles per cell.
    pub indices: Vec<u32>,
    /// Packed biome lanes per vertex.
    pub biome_weights: Vec<[f32; 4]>,
}

impl ChunkMesh {
    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    #[inline]
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Vertex attributes interleaved for upload.
    #[must_use]
    pub fn interleaved(&self) -> Vec<TerrainVertex> {
        self.positions
            .iter()
            .zip(&self.uvs)
            .zip(&self.biome_weights)
            .map(|((&position, &uv), &biomes)| TerrainVertex {
                position,
                uv,
                biomes,
            })
            .collect()
    }
}

/// Produces chunk meshes for one world.
///
/// Holds only immutable state, so one generator can serve any number of
/// threads.
#[derive(Debug)]
pub struct ChunkGenerator {
    context: GeneratorContext,
    heightmap: FractalNoise,
    biomes: BiomeMap,
    mask: Option<MaskField>,
    settings: ChunkSettings,
    origin: [f64; 2],
}

impl ChunkGenerator {
    /// Creates a generator without a mask.
    ///
    /// # Errors
    ///
    /// Returns the error from [`ChunkSettings::validate`].
    pub fn new(
        context: GeneratorContext,
        heightmap: FractalNoise,
        biomes: BiomeMap,
        settings: ChunkSettings,
    ) -> GenResult<Self> {
        settings.validate()?;
        Ok(Self {
            context,
            heightmap,
            biomes,
            mask: None,
            settings,
            origin: [0.0, 0.0],
        })
    }

    /// Builds everything a configuration describes. With the mask enabled,
    /// the island is generated and rasterized on the CPU before returning.
    ///
    /// # Errors
    ///
    /// Returns the first configuration, mask or rasterization error.
    pub fn from_config(config: &GeneratorConfig) -> GenResult<Self> {
        config.validate()?;
        let context = config.context();
        let heightmap = config.build_heightmap(&context)?;
        let biomes = config.build_biome_map(&context)?;
        let mut generator = Self::new(context, heightmap, biomes, config.chunk_settings())?;

        if config.mask.enabled {
            let context = &generator.context;
            let mut mask = MaskGenerator::new(config.mask)?;
            let mesh = mask.generate(
                &mut context.rng(purpose::MASK),
                config.world_size,
                context.jobs(),
            )?;
            let field = mesh.rasterize(&CpuRasterizer::new(context.jobs().clone()))?;
            generator.set_mask(Some(field));
        }

        tracing::info!(
            "terrain generator ready: seed {:#x}, {} biomes, chunk size {}, {} workers",
            config.seed,
            generator.biomes.len(),
            config.chunk_size,
            generator.context.jobs().workers()
        );
        Ok(generator)
    }

    /// Seed and job system.
    #[inline]
    #[must_use]
    pub const fn context(&self) -> &GeneratorContext {
        &self.context
    }

    /// Assembly settings.
    #[inline]
    #[must_use]
    pub const fn settings(&self) -> &ChunkSettings {
        &self.settings
    }

    /// Raw height field.
    #[inline]
    #[must_use]
    pub const fn heightmap(&self) -> &FractalNoise {
        &self.heightmap
    }

    /// Biome list.
    #[inline]
    #[must_use]
    pub const fn biomes(&self) -> &BiomeMap {
        &self.biomes
    }

    /// Island mask, if attached.
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> Option<&MaskField> {
        self.mask.as_ref()
    }

    /// Attaches or removes the island mask.
    pub fn set_mask(&mut self, mask: Option<MaskField>) {
        self.mask = mask;
    }

    /// World offset added to every sample position.
    #[inline]
    #[must_use]
    pub const fn origin(&self) -> [f64; 2] {
        self.origin
    }

    /// Sets the world offset added to every sample position.
    pub fn set_origin(&mut self, origin: [f64; 2]) {
        self.origin = origin;
    }

    /// Follows a floating-origin recentre so chunks generated afterwards
    /// sample the same world.
    pub fn shift_origin(&mut self, shift: &OriginShift) {
        self.origin[0] += f64::from(shift.amount[0]);
        self.origin[1] += f64::from(shift.amount[1]);
    }

    /// Generates one chunk.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::MissingBiome`] for an empty biome slot in strict
    /// mode, or [`GenError::JobIncomplete`] if a stage produced no output.
    #[allow(clippy::too_many_lines, clippy::cast_precision_loss)]
    pub fn generate(&self, coord: ChunkCoord) -> GenResult<ChunkMesh> {
        let size = self.settings.size;
        let edge = self.settings.vertices_per_edge();
        let bounds = coord.bounds(size);
        let cells = bounds.len();
        let origin = self.origin;
        let settings = self.settings;
        let jobs = self.context.jobs();

        let raw = Mutex::new(vec![0.0f64; cells]);
        let packed = Mutex::new(vec![PackedBiomes::EMPTY; cells]);
        let mask_out = JobOutput::<Vec<f64>>::new("chunk mask");
        let weights: Vec<JobOutput<GenResult<Option<Vec<f64>>>>> = (0..self.biomes.len())
            .map(|_| JobOutput::new("biome weights"))
            .collect();
        let heights_out = JobOutput::<Vec<f64>>::new("chunk heights");
        let positions_out = JobOutput::<Vec<[f32; 3]>>::new("chunk positions");
        let uvs_out = JobOutput::<Vec<[f32; 2]>>::new("chunk uvs");
        let indices_out = JobOutput::<Vec<u32>>::new("chunk indices");

        let (bounds, raw, packed, mask_out, heights) =
            (&bounds, &raw, &packed, &mask_out, &heights_out);

        let mut graph = JobGraph::new();

        let sampled = graph.schedule("heightmap", &[], move || {
            self.heightmap.fill_grid(bounds, origin, jobs, &mut raw.lock());
        });

        let raw_ready = match &self.mask {
            Some(mask) => {
                let mask_sampled = graph.schedule("mask sample", &[], move || {
                    mask_out.publish(mask.sample_chunk(bounds, origin, jobs));
                });
                let both = graph.combine(&[sampled, mask_sampled]);
                graph.schedule("mask combine", &[both], move || {
                    let Some(values) = mask_out.get() else {
                        return;
                    };
                    jobs.parallel_for(&mut raw.lock()[..], VERTEX_BATCH, |i, height| {
                        *height *= values[i];
                    });
                })
            }
            None => sampled,
        };

        let mut packed_ready: Option<JobHandle> = None;
        for (index, slot) in weights.iter().enumerate() {
            let weighed = graph.schedule("biome weights", &[], move || {
                let result = self
                    .biomes
                    .checked(index)
                    .map(|biome| biome.map(|biome| biome.weights(bounds, origin, jobs)));
                slot.publish(result);
            });
            let dependencies: Vec<JobHandle> = packed_ready.into_iter().chain([weighed]).collect();
            packed_ready = Some(graph.schedule("biome pack", &dependencies, move || {
                if let Some(Ok(Some(layer))) = slot.get() {
                    pack_layer(&mut packed.lock(), index, layer, jobs);
                }
            }));
        }

        let blend_inputs: Vec<JobHandle> = packed_ready.into_iter().chain([raw_ready]).collect();
        let blend_ready = graph.combine(&blend_inputs);
        let blended = graph.schedule("blend", &[blend_ready], move || {
            let raw = raw.lock();
            let packed = packed.lock();
            heights.publish(blend_grid(&raw, &packed, &self.biomes, settings.blend, jobs));
        });

        graph.schedule("positions", &[blended], || {
            let Some(heights) = heights_out.get() else {
                return;
            };
            let mut positions = vec![[0.0f32; 3]; cells];
            jobs.parallel_for(&mut positions, VERTEX_BATCH, |i, position| {
                let column = (i % edge) as f32;
                let row = (i / edge) as f32;
                #[allow(clippy::cast_possible_truncation)]
                let height = heights[i] as f32;
                *position = [
                    column * settings.cell_size,
                    height * settings.height_scale,
                    row * settings.cell_size,
                ];
            });
            positions_out.publish(positions);
        });

        graph.schedule("uvs", &[], || {
            let step = 1.0 / size as f32;
            let mut uvs = vec![[0.0f32; 2]; cells];
            jobs.parallel_for(&mut uvs, VERTEX_BATCH, |i, uv| {
                *uv = [(i % edge) as f32 * step, (i / edge) as f32 * step];
            });
            uvs_out.publish(uvs);
        });

        graph.schedule("indices", &[], || {
            indices_out.publish(grid_indices(size));
        });

        graph.run(jobs);

        for slot in &weights {
            match slot.get() {
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.clone()),
                None => return Err(GenError::JobIncomplete(slot.name())),
            }
        }

        let mesh = ChunkMesh {
            coord,
            size,
            noise: std::mem::take(&mut *raw.lock()),
            heights: heights_out
                .into_inner()
                .ok_or(GenError::JobIncomplete("chunk heights"))?,
            positions: positions_out
                .into_inner()
                .ok_or(GenError::JobIncomplete("chunk positions"))?,
            uvs: uvs_out
                .into_inner()
                .ok_or(GenError::JobIncomplete("chunk uvs"))?,
            indices: indices_out
                .into_inner()
                .ok_or(GenError::JobIncomplete("chunk indices"))?,
            biome_weights: packed.lock().iter().map(PackedBiomes::to_f32).collect(),
        };

        tracing::debug!(
            "generated chunk ({}, {}): {} vertices, {} triangles",
            coord.x,
            coord.z,
            mesh.vertex_count(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }
}

/// Two triangles per cell over a `(size + 1)^2` vertex grid.
#[allow(clippy::cast_possible_truncation)]
fn grid_indices(size: usize) -> Vec<u32> {
    let edge = size + 1;
    let mut indices = Vec::with_capacity(size * size * 6);
    for row in 0..size {
        for column in 0..size {
            let i0 = (row * edge + column) as u32;
            let i1 = i0 + 1;
            let i2 = i0 + edge as u32;
            let i3 = i2 + 1;
            indices.extend_from_slice(&[i0, i2, i1, i1, i2, i3]);
        }
    }
    indices
}
