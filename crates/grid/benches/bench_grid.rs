use std::hint::black_box;
use std::time::Instant;

use arena_grid::VoxelGrid;
use glam::{IVec3, Vec3};

fn make_grid(dims: IVec3) -> VoxelGrid {
    let mut grid = VoxelGrid::new(Vec3::ZERO, dims, 0.1);
    grid.allocate().expect("valid dimensions");
    grid
}

fn bench_add_hit(dims: IVec3, hits: usize) {
    let mut grid = make_grid(dims);
    let extent = grid.world_size();
    // Deterministic low-discrepancy sweep, about a quarter outside the grid.
    let points: Vec<Vec3> = (0..hits)
        .map(|i| {
            let f = i as f32;
            Vec3::new(
                (f * 0.618_034).fract() * extent.x * 1.15,
                (f * 0.414_213).fract() * extent.y * 1.15,
                (f * 0.732_050).fract() * extent.z * 1.15,
            )
        })
        .collect();

    let start = Instant::now();
    for p in &points {
        grid.add_hit(black_box(*p), 1);
    }
    let elapsed = start.elapsed();
    println!(
        "  add_hit ({dims} grid, {hits} hits): {:?}/hit, total {elapsed:?}, occupied {}",
        elapsed / hits as u32,
        grid.occupied_voxels()
    );
}

fn bench_clear(dims: IVec3, iterations: usize) {
    let mut grid = make_grid(dims);
    let start = Instant::now();
    for _ in 0..iterations {
        grid.clear().expect("allocated");
        black_box(&grid);
    }
    let elapsed = start.elapsed();
    println!(
        "  clear ({dims} grid, {iterations} iters): {:?}/iter",
        elapsed / iterations as u32
    );
}

fn bench_scan(dims: IVec3, iterations: usize) {
    let mut grid = make_grid(dims);
    for i in 0..grid.len() / 3 {
        let p = grid.voxel_center_world(IVec3::new(i as i32 % dims.x, 0, 0));
        grid.add_hit(p, 1);
    }
    let start = Instant::now();
    for _ in 0..iterations {
        let n = grid.iter().filter(|(_, c)| *c >= 1).count();
        black_box(n);
    }
    let elapsed = start.elapsed();
    println!(
        "  threshold scan ({dims} grid, {iterations} iters): {:?}/iter",
        elapsed / iterations as u32
    );
}

fn main() {
    println!("=== Voxel Grid Benchmarks ===\n");

    println!("Hit accumulation:");
    bench_add_hit(IVec3::new(100, 20, 60), 100_000);
    bench_add_hit(IVec3::new(256, 64, 256), 1_000_000);

    println!("\nClear:");
    bench_clear(IVec3::new(100, 20, 60), 1000);
    bench_clear(IVec3::new(256, 64, 256), 50);

    println!("\nThreshold scan:");
    bench_scan(IVec3::new(100, 20, 60), 200);

    println!("\n=== Done ===");
}
