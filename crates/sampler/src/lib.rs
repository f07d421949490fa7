//! Frustum sampling: turn viewport coordinates into rays and rays into grid hits.
//!
//! # Invariants
//! - The scan cursor stays inside `[0, width) x [0, height)`.
//! - Every viewport cell is visited exactly once per `width * height` samples.
//! - A sampler borrows the grid only for the duration of one step.

mod camera;
mod depth;
mod sampler;

pub use camera::{PinholeCamera, ViewportCamera};
pub use depth::DepthImage;
pub use sampler::{Sampler, SamplerError, StepStats};
