//! # Island Mask
//!
//! A low-frequency silhouette that decides where land may exist. The mask
//! is a perturbed disc: a triangle fan whose rim radius follows 1D fractal
//! noise around the circle.
//!
//! ## Pipeline
//!
//! ```text
//! angles ──┬── extents ── min/max ── smooth seam ──┐
//!          │                                       ├── vertices
//!          └───────────────────────────────────────┘
//! indices (independent)
//! ```
//!
//! Every step is a job in one [`JobGraph`]. The finished [`MaskMesh`] is
//! handed to a [`MaskRasterizer`], which turns it into a square grid of
//! floats ([`MaskField`]). [`CpuRasterizer`] does this on the CPU; a
//! rendering host can provide its own. [`MaskGenerator::request_readback`]
//! runs rasterization off the calling thread and reports through a
//! completion callback.
//!
//! ## Coordinates
//!
//! The mesh lives in `[-1, 1]^2`, centre at the origin. Texel `(x, y)` of
//! the field covers world cells `[x * divisor, (x + 1) * divisor)` along x
//! and the same along z, starting at the world origin corner.

use std::f32::consts::{PI, TAU};
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tessera_core::jobs::{JobGraph, JobOutput, JobSystem};
use tessera_core::math::{lerp, smoothstep};
use tessera_core::simd::{min_max, MinMax, MAX_BATCH_SIZE};

use crate::error::{GenError, GenResult};
use crate::fractal::GridBounds;
use crate::noise::fractal1d;

/// Smallest accepted rim vertex count.
pub const MIN_COMPLEXITY: usize = 8;

/// Smallest world-size rounding step.
const MIN_WORLD_STEP: u32 = 8;

/// Rim samples per work item.
const EXTENT_BATCH: usize = 64;

/// Mask texels per work item when sampling into a chunk.
const SAMPLE_BATCH: usize = 256;

/// Island mask settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskSettings {
    /// Build and apply a mask at all.
    pub enabled: bool,
    /// Rim vertex count. Must be a multiple of [`MAX_BATCH_SIZE`].
    pub complexity: usize,
    /// Angular frequency of the rim noise.
    pub scale: f32,
    /// Rim noise octaves.
    pub octaves: u32,
    /// Rim noise gain.
    pub gain: f32,
    /// Rim noise lacunarity.
    pub lacunarity: f32,
    /// Depth at which land starts to rise out of the sea.
    pub sea_level: f32,
    /// Depth at which the mask reaches full strength.
    pub mainland_level: f32,
    /// World cells per mask texel.
    pub divisor: u32,
}

impl Default for MaskSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            complexity: 256,
            scale: 2.0,
            octaves: 4,
            gain: 0.5,
            lacunarity: 2.0,
            sea_level: 0.2,
            mainland_level: 0.5,
            divisor: 4,
        }
    }
}

impl MaskSettings {
    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::ComplexityTooSmall`] or
    /// [`GenError::ComplexityNotAligned`] for a bad vertex count, and an
    /// error for non-finite noise parameters, reversed levels or a zero
    /// divisor.
    pub fn validate(&self) -> GenResult<()> {
        if self.complexity < MIN_COMPLEXITY {
            return Err(GenError::ComplexityTooSmall {
                complexity: self.complexity,
                minimum: MIN_COMPLEXITY,
            });
        }
        if self.complexity % MAX_BATCH_SIZE != 0 {
            return Err(GenError::ComplexityNotAligned {
                complexity: self.complexity,
                batch: MAX_BATCH_SIZE,
            });
        }
        if self.octaves == 0 {
            return Err(GenError::InvalidOctaves(self.octaves));
        }
        for (name, value) in [
            ("mask.scale", self.scale),
            ("mask.gain", self.gain),
            ("mask.lacunarity", self.lacunarity),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(GenError::InvalidNoiseParameter {
                    name,
                    value: f64::from(value),
                });
            }
        }
        if !(self.sea_level.is_finite()
            && self.mainland_level.is_finite()
            && self.sea_level < self.mainland_level)
        {
            return Err(GenError::InvalidNoiseParameter {
                name: "mask.sea_level",
                value: f64::from(self.sea_level),
            });
        }
        if self.divisor == 0 {
            return Err(GenError::InvalidChunkSize {
                name: "mask.divisor",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Rounds a world size to the nearest multiple of the mask step.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn round_world_size(&self, world_size: f32) -> f32 {
        let step = self.divisor.max(MIN_WORLD_STEP) as f32;
        (world_size / step).round() * step
    }

    /// Mask texels per side for a world.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn mask_size(&self, world_size: f32) -> usize {
        let size = self.round_world_size(world_size) / self.divisor.max(1) as f32;
        if size.is_finite() && size > 0.0 {
            size as usize
        } else {
            0
        }
    }

    /// Sea and mainland levels.
    #[inline]
    #[must_use]
    pub const fn levels(&self) -> MaskLevels {
        MaskLevels {
            sea_level: self.sea_level,
            mainland_level: self.mainland_level,
        }
    }
}

/// Depth thresholds that shape the coastline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskLevels {
    /// Below this depth the mask is 0.
    pub sea_level: f32,
    /// Above this depth the mask is 1.
    pub mainland_level: f32,
}

impl MaskLevels {
    /// Mask value for a radial depth (1 at the centre, 0 at the rim).
    #[inline]
    #[must_use]
    pub fn apply(self, depth: f32) -> f32 {
        smoothstep(self.sea_level, self.mainland_level, depth)
    }
}

/// Triangle fan describing the island silhouette.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskMesh {
    /// Centre followed by the rim, in `[-1, 1]^2` with z = 0.
    pub vertices: Vec<[f32; 3]>,
    /// Three indices per triangle.
    pub indices: Vec<u32>,
    /// Texels per side of the rasterized field.
    pub size: usize,
    /// World cells per texel.
    pub divisor: u32,
    /// Coastline thresholds.
    pub levels: MaskLevels,
}

impl MaskMesh {
    /// Number of triangles.
    #[inline]
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Rasterizes the mesh on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the rasterizer's error, or [`GenError::Rasterization`] if it
    /// produced the wrong number of texels.
    pub fn rasterize<R: MaskRasterizer + ?Sized>(&self, rasterizer: &R) -> GenResult<MaskField> {
        let data = rasterizer.rasterize(self)?;
        MaskField::from_raw(self.size, self.divisor, data)
    }
}

enum MaskState {
    Uninitialized,
    Generated(MaskMesh),
}

/// Builds the island mesh.
pub struct MaskGenerator {
    settings: MaskSettings,
    state: MaskState,
}

impl MaskGenerator {
    /// Creates a generator.
    ///
    /// # Errors
    ///
    /// Returns the error from [`MaskSettings::validate`].
    pub fn new(settings: MaskSettings) -> GenResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            state: MaskState::Uninitialized,
        })
    }

    /// Settings in use.
    #[inline]
    #[must_use]
    pub const fn settings(&self) -> &MaskSettings {
        &self.settings
    }

    /// Last generated mesh.
    #[must_use]
    pub fn mesh(&self) -> Option<&MaskMesh> {
        match &self.state {
            MaskState::Uninitialized => None,
            MaskState::Generated(mesh) => Some(mesh),
        }
    }

    /// Returns true once [`generate`](Self::generate) has succeeded.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        matches!(self.state, MaskState::Generated(_))
    }

    /// Generates the island mesh for a world, replacing any previous one.
    ///
    /// Random draws happen on the calling thread before any job starts, so
    /// the result does not depend on the worker count.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::InvalidChunkSize`] for a world smaller than one
    /// mask texel, or [`GenError::JobIncomplete`] if a stage produced no
    /// output.
    #[allow(clippy::cast_precision_loss, clippy::too_many_lines)]
    pub fn generate<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        world_size: f32,
        jobs: &JobSystem,
    ) -> GenResult<&MaskMesh> {
        let settings = self.settings;
        let size = settings.mask_size(world_size);
        if size == 0 {
            return Err(GenError::InvalidChunkSize {
                name: "world_size",
                value: f64::from(world_size),
            });
        }

        let count = settings.complexity;
        let seed: f32 = rng.gen();
        let jitter: Vec<f32> = (0..count).map(|_| rng.gen()).collect();

        let angles_out = JobOutput::<Vec<f32>>::new("mask angles");
        let indices_out = JobOutput::<Vec<u32>>::new("mask indices");
        let bounds_out = JobOutput::<MinMax>::new("mask extent range");
        let vertices_out = JobOutput::<Vec<[f32; 3]>>::new("mask vertices");
        let extents = Mutex::new(vec![0.0f32; count]);

        let mut graph = JobGraph::new();

        let angles = graph.schedule("mask angles", &[], || {
            angles_out.publish(rim_angles(&jitter));
        });

        let indices = graph.schedule("mask indices", &[], || {
            indices_out.publish(fan_indices(count));
        });

        let sampled = graph.schedule("mask extents", &[angles], || {
            let Some(angles) = angles_out.get() else {
                return;
            };
            let mut extents = extents.lock();
            jobs.parallel_for(&mut extents[..], EXTENT_BATCH, |i, extent| {
                *extent = fractal1d(
                    seed + angles[i] * settings.scale,
                    settings.octaves,
                    settings.lacunarity,
                    settings.gain,
                );
            });
        });

        let ranged = graph.schedule("mask extent range", &[sampled], || {
            bounds_out.publish(min_max(&extents.lock()));
        });

        let smoothed = graph.schedule("mask seam", &[ranged], || {
            smooth_seam(&mut extents.lock(), jobs);
        });

        let ready = graph.combine(&[angles, indices, smoothed]);
        graph.schedule("mask vertices", &[ready], || {
            let (Some(angles), Some(range)) = (angles_out.get(), bounds_out.get()) else {
                return;
            };
            let extents = extents.lock();
            let mut vertices = vec![[0.0f32; 3]; count + 1];
            jobs.parallel_for(&mut vertices[1..], EXTENT_BATCH, |i, vertex| {
                let radius = range.normalize(extents[i]);
                *vertex = [angles[i].cos() * radius, angles[i].sin() * radius, 0.0];
            });
            vertices_out.publish(vertices);
        });

        graph.run(jobs);

        let mesh = MaskMesh {
            vertices: vertices_out
                .into_inner()
                .ok_or(GenError::JobIncomplete("mask vertices"))?,
            indices: indices_out
                .into_inner()
                .ok_or(GenError::JobIncomplete("mask indices"))?,
            size,
            divisor: settings.divisor,
            levels: settings.levels(),
        };

        tracing::debug!(
            "generated island mask: {} rim vertices, {}x{} texels",
            count,
            size,
            size
        );

        self.state = MaskState::Generated(mesh);
        self.mesh().ok_or(GenError::MaskNotGenerated)
    }

    /// Rasterizes the current mesh on a background thread.
    ///
    /// `on_complete` runs on that thread with the result; failures are also
    /// logged. The returned ticket yields the same result.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::MaskNotGenerated`] before the first
    /// [`generate`](Self::generate), or [`GenError::Rasterization`] if the
    /// thread could not be started.
    pub fn request_readback<R, F>(&self, rasterizer: R, on_complete: F) -> GenResult<ReadbackTicket>
    where
        R: MaskRasterizer + 'static,
        F: FnOnce(&GenResult<MaskField>) + Send + 'static,
    {
        let mesh = self.mesh().ok_or(GenError::MaskNotGenerated)?.clone();
        let (sender, receiver) = bounded(1);

        thread::Builder::new()
            .name("mask-readback".into())
            .spawn(move || {
                let result = mesh.rasterize(&rasterizer);
                match &result {
                    Ok(field) => tracing::info!(
                        "island mask rasterized: {}x{} texels",
                        field.size(),
                        field.size()
                    ),
                    Err(err) => tracing::error!("island mask readback failed: {}", err),
                }
                on_complete(&result);
                // The ticket may have been dropped
                let _ = sender.send(result);
            })
            .map_err(|err| GenError::Rasterization(err.to_string()))?;

        Ok(ReadbackTicket { receiver })
    }
}

/// Rim angles in `(-PI, PI]`, strictly increasing, unevenly spaced.
///
/// `jitter` holds one draw in `[0, 1)` per angle.
#[allow(clippy::cast_precision_loss)]
fn rim_angles(jitter: &[f32]) -> Vec<f32> {
    let step = TAU / jitter.len() as f32;
    let mut angles = Vec::with_capacity(jitter.len());
    let mut current = -PI + f32::EPSILON;
    let mut previous = 0.0;
    for &draw in jitter {
        angles.push(current);
        let offset = draw * step;
        current += (step - previous) + offset;
        previous = offset;
    }
    angles
}

/// Fan indices over a centre vertex and `count` rim vertices.
///
/// The last triangle closes back onto the first rim vertex.
#[allow(clippy::cast_possible_truncation)]
fn fan_indices(count: usize) -> Vec<u32> {
    let triangles = count - 1;
    let mut indices = Vec::with_capacity(triangles * 3);
    for t in 0..triangles as u32 {
        indices.extend_from_slice(&[0, t + 1, t + 2]);
    }
    let last = indices.len() - 3;
    indices[last..].copy_from_slice(&[0, (count - 1) as u32, 1]);
    indices
}

/// Re-interpolates the last eighth of the rim towards the first extent so
/// the wrap-around has no visible step. The final sample is left as is.
#[allow(clippy::cast_precision_loss)]
fn smooth_seam(extents: &mut [f32], jobs: &JobSystem) {
    let amount = extents.len() / 8;
    if amount == 0 {
        return;
    }
    let start = extents.len() - 1 - amount;
    let from = extents[start];
    let to = extents[0];
    jobs.parallel_for(&mut extents[start..start + amount], EXTENT_BATCH, |i, extent| {
        *extent = lerp(from, to, smoothstep(0.0, 1.0, i as f32 / amount as f32));
    });
}

/// Turns a mask mesh into `size * size` floats in `[0, 1]`, row-major,
/// row 0 at y = -1.
pub trait MaskRasterizer: Send + Sync {
    /// Rasterizes `mesh`.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::Rasterization`] on failure.
    fn rasterize(&self, mesh: &MaskMesh) -> GenResult<Vec<f32>>;
}

/// Supersampled barycentric rasterizer.
///
/// Depth is interpolated across each triangle (1 at vertex 0, 0 elsewhere)
/// and mapped through the mesh's [`MaskLevels`]. Overlapping triangles keep
/// the larger value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuRasterizer {
    supersample: usize,
    jobs: JobSystem,
}

impl CpuRasterizer {
    /// Samples per texel along each axis.
    pub const DEFAULT_SUPERSAMPLE: usize = 2;

    /// Creates a rasterizer that splits rows across `jobs`.
    #[must_use]
    pub fn new(jobs: JobSystem) -> Self {
        Self {
            supersample: Self::DEFAULT_SUPERSAMPLE,
            jobs,
        }
    }

    /// Sets samples per texel along each axis (at least 1).
    #[must_use]
    pub fn with_supersample(mut self, supersample: usize) -> Self {
        self.supersample = supersample.max(1);
        self
    }
}

impl Default for CpuRasterizer {
    fn default() -> Self {
        Self::new(JobSystem::default())
    }
}

/// Triangle in sample space, ready for scanline coverage.
struct RasterTriangle {
    corners: [[f32; 2]; 3],
    depths: [f32; 3],
    area: f32,
    rows: (f32, f32),
}

impl RasterTriangle {
    fn new(corners: [[f32; 2]; 3], depths: [f32; 3]) -> Option<Self> {
        let area = edge(corners[0], corners[1], corners[2]);
        if area.abs() <= f32::EPSILON {
            return None;
        }
        let ys = corners.map(|c| c[1]);
        Some(Self {
            corners,
            depths,
            area,
            rows: (ys[0].min(ys[1]).min(ys[2]), ys[0].max(ys[1]).max(ys[2])),
        })
    }

    /// Covered x range at height `y`, in sample space.
    fn span(&self, y: f32) -> Option<(f32, f32)> {
        let sign = self.area.signum();
        let mut low = f32::NEG_INFINITY;
        let mut high = f32::INFINITY;
        for k in 0..3 {
            let p = self.corners[k];
            let q = self.corners[(k + 1) % 3];
            // sign * edge(p, q, (x, y)) = a * x + b
            let a = -sign * (q[1] - p[1]);
            let b = sign * ((q[0] - p[0]) * (y - p[1]) + (q[1] - p[1]) * p[0]);
            if a > 0.0 {
                low = low.max(-b / a);
            } else if a < 0.0 {
                high = high.min(-b / a);
            } else if b < 0.0 {
                return None;
            }
        }
        (low <= high).then_some((low, high))
    }

    fn depth(&self, point: [f32; 2]) -> f32 {
        let [a, b, c] = self.corners;
        let w0 = edge(b, c, point) / self.area;
        let w1 = edge(c, a, point) / self.area;
        let w2 = edge(a, b, point) / self.area;
        (w0 * self.depths[0] + w1 * self.depths[1] + w2 * self.depths[2]).clamp(0.0, 1.0)
    }
}

#[inline]
fn edge(p: [f32; 2], q: [f32; 2], s: [f32; 2]) -> f32 {
    (q[0] - p[0]) * (s[1] - p[1]) - (q[1] - p[1]) * (s[0] - p[0])
}

impl MaskRasterizer for CpuRasterizer {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn rasterize(&self, mesh: &MaskMesh) -> GenResult<Vec<f32>> {
        if mesh.size == 0 {
            return Err(GenError::Rasterization("mask size is zero".into()));
        }
        let supersample = self.supersample.max(1);
        let resolution = mesh.size * supersample;
        let extent = resolution as f32;

        let mut triangles = Vec::with_capacity(mesh.triangle_count());
        for triangle in mesh.indices.chunks_exact(3) {
            let mut corners = [[0.0f32; 2]; 3];
            let mut depths = [0.0f32; 3];
            for (k, &index) in triangle.iter().enumerate() {
                let vertex = mesh.vertices.get(index as usize).ok_or_else(|| {
                    GenError::Rasterization(format!(
                        "index {index} out of range for {} vertices",
                        mesh.vertices.len()
                    ))
                })?;
                corners[k] = [(vertex[0] + 1.0) * 0.5 * extent, (vertex[1] + 1.0) * 0.5 * extent];
                depths[k] = if index == 0 { 1.0 } else { 0.0 };
            }
            triangles.extend(RasterTriangle::new(corners, depths));
        }

        let levels = mesh.levels;
        let scale = 1.0 / (supersample * supersample) as f32;
        let mut rows = vec![Vec::new(); mesh.size];
        self.jobs.parallel_for(&mut rows, 4, |row, texels: &mut Vec<f32>| {
            let mut samples = vec![0.0f32; supersample * resolution];
            for sub in 0..supersample {
                let y = (row * supersample + sub) as f32 + 0.5;
                let line = &mut samples[sub * resolution..(sub + 1) * resolution];
                for triangle in &triangles {
                    if y < triangle.rows.0 || y > triangle.rows.1 {
                        continue;
                    }
                    let Some((low, high)) = triangle.span(y) else {
                        continue;
                    };
                    let first = (low - 0.5).ceil().max(0.0) as usize;
                    let last = (high - 0.5).floor().min(extent - 1.0);
                    if last < 0.0 {
                        continue;
                    }
                    for x in first..=last as usize {
                        let value = levels.apply(triangle.depth([x as f32 + 0.5, y]));
                        if value > line[x] {
                            line[x] = value;
                        }
                    }
                }
            }

            *texels = (0..mesh.size)
                .map(|column| {
                    let mut sum = 0.0;
                    for sub in 0..supersample {
                        let start = sub * resolution + column * supersample;
                        sum += samples[start..start + supersample].iter().sum::<f32>();
                    }
                    sum * scale
                })
                .collect();
        });

        Ok(rows.concat())
    }
}

/// Pending background rasterization.
#[derive(Debug)]
pub struct ReadbackTicket {
    receiver: Receiver<GenResult<MaskField>>,
}

impl ReadbackTicket {
    /// Blocks until the readback finishes.
    ///
    /// # Errors
    ///
    /// Returns the rasterization error, or [`GenError::Rasterization`] if
    /// the worker exited without a result.
    pub fn wait(self) -> GenResult<MaskField> {
        self.receiver.recv().unwrap_or_else(|_| {
            Err(GenError::Rasterization(
                "readback thread exited without a result".into(),
            ))
        })
    }

    /// Result if the readback has finished, without blocking.
    #[must_use]
    pub fn try_result(&self) -> Option<GenResult<MaskField>> {
        self.receiver.try_recv().ok()
    }
}

/// Rasterized island mask.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskField {
    size: usize,
    divisor: u32,
    data: Vec<f32>,
}

impl MaskField {
    /// Wraps `size * size` row-major texels.
    ///
    /// # Errors
    ///
    /// Returns [`GenError::Rasterization`] if the length does not match or
    /// the field is empty.
    pub fn from_raw(size: usize, divisor: u32, data: Vec<f32>) -> GenResult<Self> {
        if size == 0 || data.len() != size * size {
            return Err(GenError::Rasterization(format!(
                "expected {} texels for a {size}x{size} mask, got {}",
                size * size,
                data.len()
            )));
        }
        Ok(Self {
            size,
            divisor: divisor.max(1),
            data,
        })
    }

    /// Texels per side.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// World cells per texel.
    #[inline]
    #[must_use]
    pub const fn divisor(&self) -> u32 {
        self.divisor
    }

    /// Row-major texels.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Texel at `(x, y)`, clamped to the edges.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn texel(&self, x: i64, y: i64) -> f32 {
        let last = self.size as i64 - 1;
        let x = x.clamp(0, last) as usize;
        let y = y.clamp(0, last) as usize;
        self.data[y * self.size + x]
    }

    /// Bilinear mask value at a world position, clamped at the edges.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample(&self, world_x: f64, world_z: f64) -> f64 {
        let divisor = f64::from(self.divisor);
        let u = world_x / divisor - 0.5;
        let v = world_z / divisor - 0.5;
        let x0 = u.floor();
        let y0 = v.floor();
        let fx = u - x0;
        let fy = v - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = lerp(
            f64::from(self.texel(x0, y0)),
            f64::from(self.texel(x0 + 1, y0)),
            fx,
        );
        let bottom = lerp(
            f64::from(self.texel(x0, y0 + 1)),
            f64::from(self.texel(x0 + 1, y0 + 1)),
            fx,
        );
        lerp(top, bottom, fy)
    }

    /// Mask value for every cell of `bounds`, row-major, shifted by `origin`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sample_chunk(&self, bounds: &GridBounds, origin: [f64; 2], jobs: &JobSystem) -> Vec<f64> {
        let mut out = vec![0.0; bounds.len()];
        jobs.parallel_for(&mut out, SAMPLE_BATCH, |index, slot| {
            let [x, z] = bounds.cell(index);
            *slot = self.sample(origin[0] + x as f64, origin[1] + z as f64);
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn generated(complexity: usize, world_size: f32, seed: u64) -> MaskMesh {
        let mut generator = MaskGenerator::new(MaskSettings {
            complexity,
            ..MaskSettings::default()
        })
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        generator
            .generate(&mut rng, world_size, &JobSystem::new(3))
            .unwrap()
            .clone()
    }

    #[test]
    fn test_complexity_validation() {
        let aligned = |complexity| MaskSettings {
            complexity,
            ..MaskSettings::default()
        };
        assert_eq!(
            aligned(100).validate(),
            Err(GenError::ComplexityNotAligned {
                complexity: 100,
                batch: MAX_BATCH_SIZE
            })
        );
        assert!(matches!(
            aligned(0).validate(),
            Err(GenError::ComplexityTooSmall { .. })
        ));
        assert!(aligned(8).validate().is_ok());
        assert!(MaskGenerator::new(aligned(12)).is_err());
    }

    #[test]
    fn test_world_size_rounding() {
        let settings = MaskSettings::default();
        assert_eq!(settings.round_world_size(4096.0), 4096.0);
        assert_eq!(settings.round_world_size(4099.0), 4096.0);
        assert_eq!(settings.round_world_size(4101.0), 4104.0);
        assert_eq!(settings.mask_size(4096.0), 1024);

        let coarse = MaskSettings {
            divisor: 16,
            ..settings
        };
        assert_eq!(coarse.round_world_size(100.0), 96.0);
        assert_eq!(coarse.mask_size(100.0), 6);
        assert_eq!(settings.mask_size(2.0), 0);
    }

    #[test]
    fn test_vertex_and_index_counts() {
        let mesh = generated(256, 1024.0, 1);
        assert_eq!(mesh.vertices.len(), 257);
        assert_eq!(mesh.indices.len(), 765);
        assert_eq!(&mesh.indices[762..], &[0, 255, 1]);
        assert_eq!(&mesh.indices[..3], &[0, 1, 2]);
        assert_eq!(mesh.vertices[0], [0.0, 0.0, 0.0]);
        assert_eq!(mesh.size, 256);
        assert!(mesh.indices.chunks_exact(3).all(|t| t[0] == 0));
    }

    #[test]
    fn test_rim_radii_are_normalized() {
        let mesh = generated(128, 512.0, 7);
        for vertex in &mesh.vertices[1..] {
            let radius = (vertex[0] * vertex[0] + vertex[1] * vertex[1]).sqrt();
            assert!(radius <= 1.0 + 1e-5, "radius {radius}");
            assert_eq!(vertex[2], 0.0);
        }
    }

    #[test]
    fn test_angles_increase_around_circle() {
        let jitter: Vec<f32> = (0..64_u8).map(|i| f32::from(i % 10) / 10.0).collect();
        let angles = rim_angles(&jitter);
        assert_eq!(angles.len(), 64);
        assert!(angles[0] > -PI);
        for pair in angles.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert!(angles[63] < PI + 1e-5);
    }

    #[test]
    fn test_seam_smoothing() {
        let mut extents: Vec<f32> = (0..64_u8).map(f32::from).collect();
        smooth_seam(&mut extents, &JobSystem::new(2));
        // Eight samples from index 55 are eased from 55 towards 0
        assert_eq!(extents[55], 55.0);
        assert!(extents[56] < 55.0 && extents[56] > 50.0);
        assert!(extents[62] < extents[58]);
        assert_eq!(extents[63], 63.0);
        assert_eq!(extents[54], 54.0);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = generated(64, 256.0, 5);
        let b = generated(64, 256.0, 5);
        let c = generated(64, 256.0, 6);
        assert_eq!(a, b);
        assert_ne!(a.vertices, c.vertices);
    }

    #[test]
    fn test_tiny_world_rejected() {
        let mut generator = MaskGenerator::new(MaskSettings::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(generator
            .generate(&mut rng, 1.0, &JobSystem::single_threaded())
            .is_err());
        assert!(!generator.is_generated());
    }

    fn square() -> MaskMesh {
        MaskMesh {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [-2.0, -2.0, 0.0],
                [2.0, -2.0, 0.0],
                [2.0, 2.0, 0.0],
                [-2.0, 2.0, 0.0],
            ],
            indices: vec![0, 1, 2, 0, 2, 3, 0, 3, 4, 0, 4, 1],
            size: 16,
            divisor: 4,
            levels: MaskLevels {
                sea_level: 0.0,
                mainland_level: 1.0,
            },
        }
    }

    #[test]
    fn test_cpu_rasterizer_depth_falloff() {
        let data = CpuRasterizer::new(JobSystem::new(2))
            .rasterize(&square())
            .unwrap();
        assert_eq!(data.len(), 256);
        assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
        let centre = data[8 * 16 + 8];
        let corner = data[0];
        assert!(centre > 0.9, "centre {centre}");
        assert!(corner < 0.6, "corner {corner}");
        // Symmetric about both axes
        assert!((data[8 * 16 + 2] - data[8 * 16 + 13]).abs() < 1e-4);
    }

    #[test]
    fn test_cpu_rasterizer_errors() {
        let rasterizer = CpuRasterizer::new(JobSystem::single_threaded());
        let mut empty = square();
        empty.size = 0;
        assert!(matches!(
            rasterizer.rasterize(&empty),
            Err(GenError::Rasterization(_))
        ));

        let mut broken = square();
        broken.indices.extend_from_slice(&[0, 1, 99]);
        assert!(rasterizer.rasterize(&broken).is_err());
    }

    #[test]
    fn test_generated_island_has_land_and_sea() {
        let mesh = generated(64, 256.0, 3);
        let field = mesh
            .rasterize(&CpuRasterizer::new(JobSystem::new(2)))
            .unwrap();
        assert_eq!(field.size(), 64);
        let peak = field.data().iter().copied().fold(0.0f32, f32::max);
        assert!(peak > 0.99, "peak {peak}");
        assert_eq!(field.texel(0, 0), 0.0);
        assert_eq!(field.texel(63, 63), 0.0);
    }

    #[test]
    fn test_readback_invokes_callback() {
        let mut generator = MaskGenerator::new(MaskSettings {
            complexity: 32,
            ..MaskSettings::default()
        })
        .unwrap();

        assert!(matches!(
            generator.request_readback(CpuRasterizer::default(), |_| {}),
            Err(GenError::MaskNotGenerated)
        ));

        let mut rng = ChaCha8Rng::seed_from_u64(9);
        generator
            .generate(&mut rng, 128.0, &JobSystem::single_threaded())
            .unwrap();

        let (sender, receiver) = crossbeam_channel::bounded(1);
        let ticket = generator
            .request_readback(CpuRasterizer::default(), move |result| {
                sender.send(result.is_ok()).unwrap();
            })
            .unwrap();
        let field = ticket.wait().unwrap();
        assert!(receiver.recv().unwrap());
        assert_eq!(field.size(), 32);
    }

    struct Failing;

    impl MaskRasterizer for Failing {
        fn rasterize(&self, _mesh: &MaskMesh) -> GenResult<Vec<f32>> {
            Err(GenError::Rasterization("device lost".into()))
        }
    }

    #[test]
    fn test_readback_reports_failure() {
        let mut generator = MaskGenerator::new(MaskSettings::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        generator
            .generate(&mut rng, 64.0, &JobSystem::single_threaded())
            .unwrap();
        let ticket = generator.request_readback(Failing, |result| {
            assert!(result.is_err());
        });
        assert_eq!(
            ticket.unwrap().wait(),
            Err(GenError::Rasterization("device lost".into()))
        );
    }

    #[test]
    fn test_field_bilinear_sampling() {
        let field = MaskField::from_raw(2, 1, vec![0.0, 1.0, 0.0, 1.0]).unwrap();
        assert_eq!(field.sample(0.5, 0.5), 0.0);
        assert_eq!(field.sample(1.5, 0.5), 1.0);
        assert!((field.sample(1.0, 0.5) - 0.5).abs() < 1e-12);
        assert!((field.sample(1.0, 1.7) - 0.5).abs() < 1e-12);
        // Clamped outside
        assert_eq!(field.sample(-10.0, 0.5), 0.0);
        assert_eq!(field.sample(10.0, 40.0), 1.0);

        assert!(MaskField::from_raw(3, 1, vec![0.0; 8]).is_err());
        assert!(MaskField::from_raw(0, 1, Vec::new()).is_err());
    }

    #[test]
    fn test_field_chunk_sampling() {
        let data: Vec<f32> = (0..64_u8).map(|i| f32::from(i) / 64.0).collect();
        let field = MaskField::from_raw(8, 4, data).unwrap();
        let bounds = GridBounds::from_chunk([0, 1], 8);
        let values = field.sample_chunk(&bounds, [0.0, 0.0], &JobSystem::new(2));
        assert_eq!(values.len(), 81);
        for (i, value) in values.iter().enumerate() {
            let [x, z] = bounds.cell(i);
            assert_eq!(*value, field.sample(x as f64, z as f64));
        }
    }
}
