//! CPU coverage aggregation.
//!
//! A [`CoverageAggregator`] owns one [`arena_grid::VoxelGrid`] and a set of
//! sensors (camera + sampler). Each tick it optionally clears the grid, then
//! drives every sampler once (frame-spread) or through a full pass (blocking).
//!
//! # Invariants
//! - A tick with no sensors, or while disabled, leaves the grid untouched.
//! - Instance batches never exceed [`INSTANCE_BATCH_LIMIT`] transforms.
//! - Visual weight is always in `[0, 1]`.

mod aggregator;
mod visual;

pub use aggregator::{CoverageAggregator, CoverageError, SensorView};
pub use visual::{GizmoCube, INSTANCE_BATCH_LIMIT, VoxelVisual, batches, gizmo_color};
