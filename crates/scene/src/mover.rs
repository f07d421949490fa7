use glam::{Vec2, Vec3};

use crate::scene::{ObjectId, Scene};

/// Planar keyboard-style movement for one scene object.
///
/// Input is a direction on the X/Z plane (`x` → +X, `y` → +Z); diagonals
/// are normalized so they are not faster than straight moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mover {
    pub speed: f32,
}

impl Mover {
    pub fn new(speed: f32) -> Self {
        Self { speed }
    }

    /// Move `id` for `dt` seconds. Returns `false` if the object is gone.
    pub fn step(&self, scene: &mut Scene, id: ObjectId, input: Vec2, dt: f32) -> bool {
        let Some(object) = scene.get_mut(id) else {
            return false;
        };
        let dir = Vec3::new(input.x, 0.0, input.y).normalize_or_zero();
        object.shape.translate(dir * self.speed * dt);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_arena;

    #[test]
    fn diagonal_is_normalized() {
        let mut scene = demo_arena(5.0, 3.0);
        let id = scene.find("Player").unwrap();
        let start = scene.get(id).unwrap().shape.center().unwrap();

        assert!(Mover::new(2.0).step(&mut scene, id, Vec2::new(1.0, 1.0), 0.5));
        let moved = scene.get(id).unwrap().shape.center().unwrap() - start;
        assert!((moved.length() - 1.0).abs() < 1e-5);
        assert_eq!(moved.y, 0.0);
    }

    #[test]
    fn no_input_no_motion() {
        let mut scene = demo_arena(5.0, 3.0);
        let id = scene.find("Player").unwrap();
        let start = scene.get(id).unwrap().shape;
        Mover::new(2.0).step(&mut scene, id, Vec2::ZERO, 1.0);
        assert_eq!(scene.get(id).unwrap().shape, start);
    }

    #[test]
    fn missing_object_reports_false() {
        let mut scene = demo_arena(5.0, 3.0);
        assert!(!Mover::new(1.0).step(&mut scene, ObjectId(99), Vec2::X, 1.0));
    }
}
