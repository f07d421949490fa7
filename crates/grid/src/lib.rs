//! Voxel Grid: dense hit counts over an axis-aligned box.
//!
//! # Invariants
//! - Counts are one flat buffer indexed `ix + sx * (iy + sy * iz)`.
//! - The buffer always holds `sx * sy * sz` entries once allocated; a
//!   dimension change reallocates and discards prior contents.
//! - Positions outside the grid are ignored, never an error: sensors
//!   routinely see past the tracked volume.

mod grid;

pub use grid::{GridError, VoxelGrid};
