use std::hint::black_box;
use std::time::Instant;

use arena_common::Pose;
use arena_common::config::FusionConfig;
use arena_fusion::{CpuFusionBackend, FusionFrame, FusionPass, MAX_OBJECTS};
use arena_sampler::DepthImage;
use glam::{UVec2, UVec3, Vec3};

fn ring(n: usize) -> Vec<Pose> {
    (0..n)
        .map(|i| {
            let a = i as f32 / n as f32 * std::f32::consts::TAU;
            Pose::looking_at(Vec3::new(2.5 * a.cos(), 2.94, 1.5 * a.sin()), Vec3::ZERO)
        })
        .collect()
}

fn bench_update(resolution: UVec3, cameras: usize, objects: usize, iterations: usize) {
    let config = FusionConfig {
        resolution,
        output_resolution: UVec2::new(128, 128),
        ..Default::default()
    };
    let mut pass = FusionPass::new(CpuFusionBackend::new(), config);
    let poses = ring(cameras);
    let objs: Vec<Vec3> = (0..objects)
        .map(|i| Vec3::new(i as f32 * 0.01 - 0.5, 0.9, 0.0))
        .collect();
    let frame = FusionFrame {
        cameras: &poses,
        objects: &objs,
    };
    pass.initialize();

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(pass.update(&frame, 1.0 / 60.0));
    }
    let elapsed = start.elapsed();
    println!(
        "  update {resolution} ({cameras} cams, {objects} objects, {iterations} iters): {:?}/frame",
        elapsed / iterations as u32
    );
}

fn bench_fuse_depth(images: usize, iterations: usize) {
    let mut pass = FusionPass::new(CpuFusionBackend::new(), FusionConfig::default());
    let depth: Vec<DepthImage> = (0..images).map(|_| DepthImage::empty(160, 120)).collect();

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(pass.fuse_depth(&depth));
    }
    let elapsed = start.elapsed();
    println!(
        "  fuse_depth ({images} images -> 512x512, {iterations} iters): {:?}/frame",
        elapsed / iterations as u32
    );
}

fn main() {
    println!("=== Fusion Benchmarks (CPU backend) ===\n");

    println!("Volume update + top-down:");
    bench_update(UVec3::new(32, 16, 32), 4, 1, 50);
    bench_update(UVec3::new(64, 32, 64), 4, 1, 10);
    bench_update(UVec3::new(64, 32, 64), 8, MAX_OBJECTS, 5);

    println!("\nDepth fusion:");
    bench_fuse_depth(4, 10);
    bench_fuse_depth(8, 10);

    println!("\n=== Done ===");
}
