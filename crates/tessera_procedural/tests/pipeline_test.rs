//! # Pipeline Tests
//!
//! Whole-chunk scenarios through the public API: a single dominant biome,
//! the island mask, and reproducibility across worker counts.

use tessera_procedural::{
    BiomeConfig, ChunkCoord, ChunkGenerator, GeneratorConfig, Keyframe, MaskSettings,
};

fn single_biome_config(workers: usize) -> GeneratorConfig {
    GeneratorConfig {
        seed: 1,
        world_size: 4096.0,
        chunk_size: 128,
        workers,
        mask: MaskSettings {
            enabled: false,
            ..MaskSettings::default()
        },
        biomes: vec![BiomeConfig::Global {
            name: "plains".into(),
            threshold: 1.0,
            curve: vec![
                Keyframe::new(-1.0, -0.2, 0.3, 0.3),
                Keyframe::new(0.0, 0.1, 1.5, 1.5),
                Keyframe::new(1.0, 0.8, 0.2, 0.2),
                Keyframe::flat(2.0, 0.8),
            ],
        }],
        ..GeneratorConfig::default()
    }
}

/// Test: One global biome owns every cell and heights are its curve.
#[test]
fn test_single_global_biome_is_pure_curve() {
    let config = single_biome_config(4);
    let generator = ChunkGenerator::from_config(&config).unwrap();
    let coord = ChunkCoord::new(3, -2);
    let mesh = generator.generate(coord).unwrap();
    let curve = generator.biomes().get(0).unwrap().curve();

    assert_eq!(mesh.vertex_count(), 129 * 129);
    for (i, lanes) in mesh.biome_weights.iter().enumerate() {
        assert_eq!(lanes[0].floor(), 0.0, "cell {i}: {lanes:?}");
        assert!((lanes[0] - 1.0).abs() < 1e-3, "cell {i}: {lanes:?}");
        assert!(lanes[1..].iter().all(|&lane| lane == -1.0), "cell {i}: {lanes:?}");
        assert_eq!(
            mesh.heights[i],
            f64::from(curve.evaluate(mesh.noise[i] as f32)),
            "cell {i}"
        );
    }

    // No mask: the noise channel is the raw heightmap
    let bounds = coord.bounds(config.chunk_size);
    for i in (0..bounds.len()).step_by(97) {
        let [x, z] = bounds.cell(i);
        assert_eq!(mesh.noise[i], generator.heightmap().sample(x as f64, z as f64));
    }
}

/// Test: Worker count never changes a chunk.
#[test]
fn test_output_independent_of_workers() {
    let single = ChunkGenerator::from_config(&single_biome_config(1)).unwrap();
    let many = ChunkGenerator::from_config(&single_biome_config(8)).unwrap();
    for coord in [ChunkCoord::new(0, 0), ChunkCoord::new(-5, 7), ChunkCoord::new(15, 15)] {
        assert_eq!(single.generate(coord).unwrap(), many.generate(coord).unwrap());
    }
}

/// Test: A different seed gives a different world.
#[test]
fn test_seed_changes_world() {
    let a = ChunkGenerator::from_config(&single_biome_config(2)).unwrap();
    let b = ChunkGenerator::from_config(&GeneratorConfig {
        seed: 2,
        ..single_biome_config(2)
    })
    .unwrap();
    let coord = ChunkCoord::new(1, 1);
    assert_ne!(a.generate(coord).unwrap().heights, b.generate(coord).unwrap().heights);
}

/// Test: Land sinks to zero outside the island.
#[test]
fn test_island_mask_clears_world_corner() {
    let config = GeneratorConfig {
        mask: MaskSettings::default(),
        ..single_biome_config(4)
    };
    let generator = ChunkGenerator::from_config(&config).unwrap();
    let mask = generator.mask().expect("mask is enabled");
    assert_eq!(mask.size(), 1024);
    let peak = mask.data().iter().copied().fold(0.0f32, f32::max);
    assert!(peak > 0.99, "island has no mainland: {peak}");

    let corner = generator.generate(ChunkCoord::new(0, 0)).unwrap();
    assert!(corner.noise.iter().all(|&h| h == 0.0));
}

/// Test: Mixed biome list with noise biomes stays within lane limits.
#[test]
fn test_many_biomes_pack_four_lanes() {
    let mut biomes = vec![BiomeConfig::Global {
        name: "ocean".into(),
        threshold: 0.01,
        curve: Vec::new(),
    }];
    for i in 0..6_i32 {
        biomes.push(BiomeConfig::Noise {
            name: format!("noise-{i}"),
            noise: tessera_procedural::FractalSettings {
                scale: 20.0 + 15.0 * f64::from(i),
                ..tessera_procedural::FractalSettings::default()
            },
            threshold: 0.3,
            operation: tessera_procedural::ThresholdOperation::Greater,
            normalize: true,
            curve: Vec::new(),
        });
    }
    let config = GeneratorConfig {
        biomes,
        chunk_size: 64,
        ..single_biome_config(3)
    };
    let generator = ChunkGenerator::from_config(&config).unwrap();
    let mesh = generator.generate(ChunkCoord::new(2, 5)).unwrap();

    let mut busiest = 0;
    for lanes in &mesh.biome_weights {
        let occupied: Vec<f32> = lanes.iter().copied().filter(|&l| l >= 0.0).collect();
        assert!(!occupied.is_empty());
        let mut indices: Vec<u32> = occupied.iter().map(|l| l.floor() as u32).collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), occupied.len(), "duplicate biome in {lanes:?}");
        assert!(indices.iter().all(|&i| i < 7));
        busiest = busiest.max(occupied.len());
    }
    println!("most biomes in one cell: {busiest}");
    assert!(busiest >= 2);
}
