//! Scene intersection: the geometry cameras look at.
//!
//! # Invariants
//! - Queries never mutate the scene.
//! - A ray starting inside a collider does not hit that collider.
//! - Hits are reported only within `[0, max_distance]` along the ray.

mod mover;
mod scene;
mod shape;

pub use mover::Mover;
pub use scene::{LayerMask, ObjectId, RayCaster, RayHit, Scene, SceneObject, demo_arena};
pub use shape::Shape;
