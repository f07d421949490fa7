//! wgpu render backend for the coverage rig.
//!
//! Draws a floor grid, debug lines (arena bounds, camera frustum rays,
//! tracked-object markers) and coverage voxels as instanced cubes.
//!
//! # Invariants
//! - The renderer never mutates coverage state; it draws what it is handed.
//! - No single instanced draw carries more than `INSTANCE_BATCH_LIMIT` cubes.
//! - The orbit camera is view state only and does not affect sampling.

mod camera;
mod gpu;
mod lines;
mod shaders;

pub use camera::OrbitCamera;
pub use gpu::{CubeInstance, RenderStats, VoxelRenderer};
pub use lines::{DebugLines, LineVertex};
