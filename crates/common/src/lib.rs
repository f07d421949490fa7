//! Shared types for the arena coverage rig.
//!
//! # Invariants
//! - Everything here is engine-agnostic: no GPU, no windowing.
//! - World units are meters; axes follow glam's right-handed convention with +Y up.

mod accumulator;
mod clock;
pub mod config;
mod types;

pub use accumulator::{CoverageAccumulator, SkipReason, TickOutcome};
pub use clock::{FixedTick, FrameClock};
pub use config::{ConfigError, RigConfig};
pub use types::{Pose, Ray, SensorId};
