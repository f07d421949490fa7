//! Camera ring around a rectangular arena.
//!
//! [`RingLayout`] is pure placement math. [`CameraRing`] owns the cameras and
//! grows, shrinks and repositions them; [`RebuildScheduler`] coalesces bursts
//! of layout edits into a single rebuild on the next idle frame.

mod ring;
mod scheduler;

pub use ring::{CAMERA_NAME_PREFIX, CameraRing, RingCamera, RingLayout, is_coverage_camera};
pub use scheduler::RebuildScheduler;
