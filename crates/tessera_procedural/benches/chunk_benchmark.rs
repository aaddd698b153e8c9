//! # Chunk Benchmark
//!
//! Full chunk generation: heightmap, biome weights, blending and mesh
//! buffers, with and without the island mask.
//!
//! Run with: cargo bench --package tessera_procedural --bench chunk_benchmark

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tessera_procedural::{
    BiomeConfig, ChunkCoord, ChunkGenerator, FractalSettings, GeneratorConfig, MaskSettings,
};

fn config(mask: bool) -> GeneratorConfig {
    let mut biomes = vec![BiomeConfig::Global {
        name: "lowlands".into(),
        threshold: 0.05,
        curve: Vec::new(),
    }];
    for (i, scale) in [80.0, 160.0, 320.0].into_iter().enumerate() {
        biomes.push(BiomeConfig::Noise {
            name: format!("layer-{i}"),
            noise: FractalSettings {
                scale,
                octaves: 3,
                ..FractalSettings::default()
            },
            threshold: 0.2,
            operation: tessera_procedural::ThresholdOperation::Greater,
            normalize: true,
            curve: Vec::new(),
        });
    }

    GeneratorConfig {
        seed: 7,
        world_size: 4096.0,
        chunk_size: 128,
        mask: MaskSettings {
            enabled: mask,
            ..MaskSettings::default()
        },
        biomes,
        ..GeneratorConfig::default()
    }
}

fn bench_generate(c: &mut Criterion) {
    let plain = ChunkGenerator::from_config(&config(false)).unwrap();
    let masked = ChunkGenerator::from_config(&config(true)).unwrap();
    let coord = ChunkCoord::new(12, 9);

    let mut group = c.benchmark_group("chunk_128");
    group.throughput(Throughput::Elements(129 * 129));
    group.sample_size(10);

    group.bench_function("no_mask", |b| {
        b.iter(|| plain.generate(black_box(coord)).unwrap());
    });
    group.bench_function("island_mask", |b| {
        b.iter(|| masked.generate(black_box(coord)).unwrap());
    });

    group.finish();
}

fn bench_mask_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("generator_setup");
    group.sample_size(10);

    group.bench_function("mask_4096", |b| {
        let config = config(true);
        b.iter(|| ChunkGenerator::from_config(black_box(&config)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_generate, bench_mask_setup);
criterion_main!(benches);
