use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arena_common::config::{SampleMode, SweepMode};
use arena_common::{CoverageAccumulator, FrameClock, RigConfig, TickOutcome};
use arena_coverage::{CoverageAggregator, INSTANCE_BATCH_LIMIT, batches};
use arena_fusion::{
    ComputeBackend, CpuFusionBackend, FusionFrame, FusionPass, GpuContext, Kernel,
    WgpuFusionBackend,
};
use arena_rig::CameraRing;
use arena_sampler::DepthImage;
use arena_scene::{LayerMask, Mover, Scene, demo_arena};
use clap::{Parser, Subcommand};
use glam::Vec2;
use tracing_subscriber::EnvFilter;

/// Simulated frame length for headless runs.
const FRAME_DT: f32 = 1.0 / 60.0;
/// Depth capture size for the depth-fusion variant.
const DEPTH_SIZE: (u32, u32) = (80, 60);
/// Widest ASCII map printed to the terminal.
const MAP_COLUMNS: u32 = 72;
const SHADES: &[u8] = b" .:-=+*#%@";

#[derive(Parser)]
#[command(name = "arena-cli", about = "Headless driver for the arena coverage rig")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Rig configuration file (.yaml, .yml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, effective configuration and GPU availability
    Info,
    /// Print the camera ring placement
    Layout {
        /// Override the number of cameras
        #[arg(short = 'n', long)]
        cameras: Option<usize>,
        /// Keep camera rotations instead of aiming at the arena centre
        #[arg(long)]
        no_face_center: bool,
    },
    /// Run the CPU ray-cast aggregator against the demo arena
    Sample {
        /// Number of ticks to run
        #[arg(short, long, default_value = "60")]
        ticks: u32,
        /// Complete a full viewport pass per sensor every tick
        #[arg(long)]
        blocking: bool,
        /// Record points at maximum range instead of exact hits
        #[arg(long)]
        approximate: bool,
        /// Override rays cast per sensor per step
        #[arg(long)]
        samples_per_frame: Option<u32>,
    },
    /// Run the fusion pass and print the top-down coverage image
    Fuse {
        /// Number of frames to simulate
        #[arg(short, long, default_value = "120")]
        frames: u32,
        /// Use the CPU kernels even when a GPU is available
        #[arg(long)]
        cpu: bool,
        /// Fuse captured depth images instead of the coverage volume
        #[arg(long)]
        depth: bool,
        /// Walk the player in a circle while fusing
        #[arg(long)]
        walk: bool,
    },
    /// Write the effective configuration to a file
    Config {
        /// Output path; the extension picks YAML or JSON
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => info(&config),
        Commands::Layout {
            cameras,
            no_face_center,
        } => {
            if let Some(n) = cameras {
                config.ring.num_cameras = n;
            }
            if no_face_center {
                config.ring.face_center = false;
            }
            layout(&config);
        }
        Commands::Sample {
            ticks,
            blocking,
            approximate,
            samples_per_frame,
        } => {
            if blocking {
                config.aggregator.sweep = SweepMode::Blocking;
            }
            if approximate {
                config.sampler.mode = SampleMode::ApproximateDepth;
            }
            if let Some(spf) = samples_per_frame {
                config.sampler.samples_per_frame = spf;
            }
            sample(&config, ticks)?;
        }
        Commands::Fuse {
            frames,
            cpu,
            depth,
            walk,
        } => {
            let opts = FuseOptions {
                frames,
                depth,
                walk,
            };
            let gpu = if cpu { None } else { gpu_backend(depth) };
            match gpu {
                Some(backend) => {
                    fuse(backend, &config, &opts, WgpuFusionBackend::read_output)?;
                }
                None => fuse(CpuFusionBackend::new(), &config, &opts, |b| {
                    Some(b.output().to_vec())
                })?,
            }
        }
        Commands::Config { path } => {
            config
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<RigConfig> {
    match path {
        Some(path) => RigConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(RigConfig::default()),
    }
}

/// Build the ring and place its cameras right away.
fn build_ring(config: &RigConfig) -> CameraRing {
    let mut ring = CameraRing::new(&config.ring);
    if let TickOutcome::Skipped(reason) = ring.rebuild() {
        tracing::warn!("camera ring empty: {reason}");
    }
    ring
}

fn info(config: &RigConfig) {
    println!("arena-cli v{}", env!("CARGO_PKG_VERSION"));
    let g = &config.grid;
    println!(
        "grid: {}x{}x{} voxels of {:.3} m",
        g.size.x, g.size.y, g.size.z, g.voxel_size
    );
    let s = &config.sampler;
    println!(
        "sampler: {}x{} viewport, {} rays/step, range {:.2} m, {:?}",
        s.sample_width, s.sample_height, s.samples_per_frame, s.max_distance, s.mode
    );
    let f = &config.fusion;
    println!(
        "fusion: {}x{}x{} volume, {}x{} image, decay {} (persistence {})",
        f.resolution.x,
        f.resolution.y,
        f.resolution.z,
        f.output_resolution.x,
        f.output_resolution.y,
        f.decay_rate,
        if f.enable_persistence { "on" } else { "off" }
    );
    let r = &config.ring;
    println!(
        "ring: {} cameras on {:.2} x {:.2} m at {:.2} m",
        r.num_cameras, r.arena_width, r.arena_depth, r.camera_height
    );
    match GpuContext::headless() {
        Ok(ctx) => println!("gpu: {}", ctx.adapter_name),
        Err(e) => println!("gpu: unavailable ({e})"),
    }
}

fn layout(config: &RigConfig) {
    let ring = build_ring(config);
    println!(
        "{} cameras, perimeter {:.2} m",
        ring.len(),
        ring.layout().perimeter()
    );
    for cam in ring.cameras() {
        let pose = cam.camera.pose;
        let fwd = pose.forward();
        println!(
            "{:<12} pos ({:6.2}, {:5.2}, {:6.2})  fwd ({:5.2}, {:5.2}, {:5.2})",
            cam.name, pose.position.x, pose.position.y, pose.position.z, fwd.x, fwd.y, fwd.z
        );
    }
}

fn sample(config: &RigConfig, ticks: u32) -> Result<()> {
    let scene = demo_arena(config.ring.arena_width, config.ring.arena_depth);
    let ring = build_ring(config);
    let mut aggregator: CoverageAggregator = CoverageAggregator::from_config(config)?;
    for cam in ring.cameras() {
        aggregator.register(cam.name.clone(), cam.camera, &config.sampler)?;
    }

    let work = drive(&mut aggregator, &scene, ticks);
    let grid = aggregator.grid();
    let stats = aggregator.last_stats();
    println!(
        "{} ticks, {} sensors, {} rays total",
        ticks,
        aggregator.sensor_count(),
        work
    );
    println!(
        "last tick: rays={} hits={} recorded={}",
        stats.rays, stats.hits, stats.recorded
    );
    let transforms = aggregator.instance_transforms();
    println!(
        "grid: occupied={} hits={} max={} checksum={:#x}",
        grid.occupied_voxels(),
        grid.total_hits(),
        grid.max_count(),
        grid.checksum()
    );
    println!(
        "visible voxels: {} in {} instanced batches",
        transforms.len(),
        batches(&transforms, INSTANCE_BATCH_LIMIT).count()
    );

    let dims = grid.dimensions();
    let max = grid.max_count().max(1) as f32;
    let (sx, sy, sz) = (dims.x as u32, dims.y, dims.z as u32);
    let map = ascii_map(sx, sz, |x, z| {
        (0..sy)
            .map(|y| grid.count(glam::IVec3::new(x as i32, y, z as i32)))
            .max()
            .unwrap_or(0) as f32
            / max
    });
    println!("{map}");
    Ok(())
}

/// Feed `frames` fixed-length frames through any accumulator.
fn drive<I, A>(acc: &mut A, input: &I, frames: u32) -> usize
where
    I: ?Sized,
    A: CoverageAccumulator<I> + ?Sized,
{
    let mut clock = FrameClock::new();
    let mut work = 0;
    for _ in 0..frames {
        clock.advance(FRAME_DT);
        match acc.accumulate(input, &clock) {
            TickOutcome::Accumulated { work: w } => work += w,
            TickOutcome::Skipped(reason) => {
                tracing::debug!(accumulator = acc.label(), frame = clock.frame, "skipped: {reason}");
            }
        }
    }
    work
}

/// Kernels a fusion run dispatches.
fn run_kernels(depth: bool) -> &'static [Kernel] {
    if depth {
        &[Kernel::FuseDepth]
    } else {
        &[
            Kernel::ClearVoxels,
            Kernel::UpdateVoxels,
            Kernel::VisualizeTopDown,
        ]
    }
}

/// First kernel of the run that `backend` cannot execute.
fn missing_kernel<B: ComputeBackend>(backend: &B, depth: bool) -> Option<Kernel> {
    run_kernels(depth)
        .iter()
        .copied()
        .find(|k| !backend.has_kernel(*k))
}

/// A GPU backend able to run every kernel of the run, or `None` to fall back to the CPU.
fn gpu_backend(depth: bool) -> Option<WgpuFusionBackend> {
    let ctx = match GpuContext::headless() {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::warn!("GPU unavailable ({e}), using CPU kernels");
            return None;
        }
    };
    let backend = match WgpuFusionBackend::new(&ctx) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::warn!("GPU fusion unavailable ({e}), using CPU kernels");
            return None;
        }
    };
    if let Some(kernel) = missing_kernel(&backend, depth) {
        tracing::warn!("GPU kernel {kernel} unavailable, using CPU kernels");
        return None;
    }
    Some(backend)
}

struct FuseOptions {
    frames: u32,
    depth: bool,
    walk: bool,
}

fn fuse<B: ComputeBackend>(
    backend: B,
    config: &RigConfig,
    opts: &FuseOptions,
    readback: impl Fn(&B) -> Option<Vec<[u8; 4]>>,
) -> Result<()> {
    let mut scene = demo_arena(config.ring.arena_width, config.ring.arena_depth);
    let ring = build_ring(config);
    let poses = ring.coverage_poses();
    let fusion = &config.fusion;
    let mut pass = FusionPass::new(backend, fusion.clone());
    let label = pass.backend().label();

    let outcome = if opts.depth {
        let images: Vec<DepthImage> = ring
            .cameras()
            .iter()
            .map(|c| {
                DepthImage::capture(
                    &c.camera,
                    &scene,
                    DEPTH_SIZE.0,
                    DEPTH_SIZE.1,
                    LayerMask(config.sampler.layer_mask),
                )
            })
            .collect();
        for (cam, image) in ring.cameras().iter().zip(&images) {
            println!(
                "{:<12} depth coverage {:5.1}%  nearest {}",
                cam.name,
                image.coverage() * 100.0,
                image
                    .min_depth()
                    .map_or_else(|| "-".to_string(), |d| format!("{d:.2} m"))
            );
        }
        pass.fuse_depth(&images)
    } else {
        run_frames(&mut pass, &mut scene, &poses, config, opts)
    };

    if let TickOutcome::Skipped(reason) = &outcome {
        println!("fusion skipped: {reason}");
        return Ok(());
    }

    let size = fusion.output_resolution;
    let pixels = readback(pass.backend()).context("fusion output image unavailable")?;
    println!(
        "{} backend, {} frames, {} cameras, {}x{} image",
        label,
        if opts.depth { 1 } else { opts.frames },
        poses.len(),
        size.x,
        size.y
    );
    let map = ascii_map(size.x, size.y, |x, y| {
        pixels
            .get((x + size.x * y) as usize)
            .map_or(0.0, |p| p[0] as f32 / 255.0)
    });
    println!("{map}");
    Ok(())
}

fn run_frames<B: ComputeBackend>(
    pass: &mut FusionPass<B>,
    scene: &mut Scene,
    poses: &[arena_common::Pose],
    config: &RigConfig,
    opts: &FuseOptions,
) -> TickOutcome {
    let fusion = &config.fusion;
    let player = scene.find("Player");
    let mover = Mover::new(1.2);
    let mut clock = FrameClock::new();
    let mut last = TickOutcome::Accumulated { work: 0 };
    let mut dispatches = 0;

    for _ in 0..opts.frames {
        clock.advance(FRAME_DT);
        if opts.walk {
            if let Some(id) = player {
                let heading = clock.elapsed as f32 * 0.8;
                mover.step(scene, id, Vec2::new(heading.cos(), heading.sin()), FRAME_DT);
            }
        }
        let objects =
            scene.tracked_positions(&fusion.tracking, (fusion.grid_min, fusion.grid_max), None);
        let frame = FusionFrame {
            cameras: poses,
            objects: &objects,
        };
        last = pass.accumulate(&frame, &clock);
        dispatches += last.work();
    }
    tracing::info!(dispatches, frames = opts.frames, "fusion run finished");
    last
}

/// Downsample a `width x height` field of `[0, 1]` values to at most
/// [`MAP_COLUMNS`] characters per row. Row 0 is printed first.
fn ascii_map(width: u32, height: u32, value: impl Fn(u32, u32) -> f32) -> String {
    if width == 0 || height == 0 {
        return String::new();
    }
    let step = width.div_ceil(MAP_COLUMNS).max(1);
    // Terminal cells are roughly twice as tall as wide.
    let row_step = step * 2;
    let mut out = String::new();
    for y in (0..height).step_by(row_step as usize) {
        for x in (0..width).step_by(step as usize) {
            out.push(shade(value(x, y)) as char);
        }
        out.push('\n');
    }
    out
}

fn shade(value: f32) -> u8 {
    let v = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
    let i = (v * (SHADES.len() - 1) as f32).round() as usize;
    SHADES[i]
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_common::SkipReason;

    /// CPU kernels with some of them switched off.
    struct PartialBackend {
        inner: CpuFusionBackend,
        disabled: Vec<Kernel>,
    }

    impl ComputeBackend for PartialBackend {
        fn label(&self) -> &'static str {
            "partial"
        }

        fn has_kernel(&self, kernel: Kernel) -> bool {
            !self.disabled.contains(&kernel)
        }

        fn has_resource(&self, resource: arena_fusion::Resource) -> bool {
            self.inner.has_resource(resource)
        }

        fn allocate(&mut self, resolution: glam::UVec3, output_size: glam::UVec2) {
            self.inner.allocate(resolution, output_size)
        }

        fn write_uniforms(&mut self, uniforms: &arena_fusion::FusionUniforms) {
            self.inner.write_uniforms(uniforms)
        }

        fn write_objects(&mut self, objects: &arena_fusion::ObjectSlots) {
            self.inner.write_objects(objects)
        }

        fn bind_depth_images(&mut self, images: &[DepthImage]) {
            self.inner.bind_depth_images(images)
        }

        fn dispatch(&mut self, kernel: Kernel, groups: glam::UVec3) {
            self.inner.dispatch(kernel, groups)
        }
    }

    #[test]
    fn backend_missing_a_volume_kernel_is_not_used() {
        assert_eq!(missing_kernel(&CpuFusionBackend::new(), false), None);
        assert_eq!(missing_kernel(&CpuFusionBackend::new(), true), None);

        let partial = PartialBackend {
            inner: CpuFusionBackend::new(),
            disabled: vec![Kernel::UpdateVoxels],
        };
        assert_eq!(missing_kernel(&partial, false), Some(Kernel::UpdateVoxels));
        // The depth variant never dispatches the volume kernels.
        assert_eq!(missing_kernel(&partial, true), None);
    }

    #[test]
    fn shades_span_blank_to_full() {
        assert_eq!(shade(0.0), b' ');
        assert_eq!(shade(1.0), b'@');
        assert_eq!(shade(7.0), b'@');
        assert_eq!(shade(f32::NAN), b' ');
    }

    #[test]
    fn map_is_downsampled() {
        let map = ascii_map(144, 8, |x, _| x as f32 / 143.0);
        let rows: Vec<&str> = map.lines().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 72);
        assert!(rows[0].starts_with(' '));
        assert!(ascii_map(0, 5, |_, _| 1.0).is_empty());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.yaml");
        std::fs::write(&path, "ring:\n  num_cameras: 6\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.ring.num_cameras, 6);
        assert_eq!(config.fusion, RigConfig::default().fusion);
        assert!(load_config(Some(&dir.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn cpu_sampling_drives_coverage() {
        let config = RigConfig::default();
        let scene = demo_arena(config.ring.arena_width, config.ring.arena_depth);
        let ring = build_ring(&config);
        let mut aggregator: CoverageAggregator = CoverageAggregator::from_config(&config).unwrap();
        for cam in ring.cameras() {
            aggregator
                .register(cam.name.clone(), cam.camera, &config.sampler)
                .unwrap();
        }
        let work = drive(&mut aggregator, &scene, 3);
        assert_eq!(work, 3 * 4 * config.sampler.samples_per_frame as usize);
        assert!(aggregator.grid().total_hits() > 0);
    }

    #[test]
    fn cpu_fusion_run_covers_the_arena() {
        let mut config = RigConfig::default();
        config.fusion.resolution = glam::UVec3::new(16, 8, 16);
        config.fusion.output_resolution = glam::UVec2::new(32, 32);
        let mut scene = demo_arena(5.0, 3.0);
        let ring = build_ring(&config);
        let mut pass = FusionPass::new(CpuFusionBackend::new(), config.fusion.clone());
        let opts = FuseOptions {
            frames: 10,
            depth: false,
            walk: true,
        };
        let outcome = run_frames(&mut pass, &mut scene, &ring.coverage_poses(), &config, &opts);
        assert!(!outcome.is_skipped());
        assert!(pass.backend().volume().iter().any(|v| *v > 0.0));
    }

    #[test]
    fn empty_ring_skips_fusion() {
        let config = RigConfig::default();
        let mut scene = demo_arena(5.0, 3.0);
        let mut pass = FusionPass::new(CpuFusionBackend::new(), config.fusion.clone());
        let opts = FuseOptions {
            frames: 2,
            depth: false,
            walk: false,
        };
        let outcome = run_frames(&mut pass, &mut scene, &[], &config, &opts);
        assert_eq!(outcome, TickOutcome::Skipped(SkipReason::NoSensors));
    }
}
