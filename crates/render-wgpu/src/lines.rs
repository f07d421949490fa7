use arena_sampler::ViewportCamera;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

/// Viewport points probed by the frustum helper: four corners then the centre.
const FRUSTUM_PROBES: [(f32, f32); 5] = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.5, 0.5)];

/// Line-list geometry rebuilt every frame.
#[derive(Debug, Clone, Default)]
pub struct DebugLines {
    vertices: Vec<LineVertex>,
}

impl DebugLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.vertices.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[LineVertex] {
        &self.vertices
    }

    pub fn line(&mut self, a: Vec3, b: Vec3, color: [f32; 4]) {
        self.vertices.push(LineVertex {
            position: a.to_array(),
            color,
        });
        self.vertices.push(LineVertex {
            position: b.to_array(),
            color,
        });
    }

    /// The 12 edges of an axis-aligned box.
    pub fn wire_box(&mut self, min: Vec3, max: Vec3, color: [f32; 4]) {
        let c = |x: bool, y: bool, z: bool| {
            Vec3::new(
                if x { max.x } else { min.x },
                if y { max.y } else { min.y },
                if z { max.z } else { min.z },
            )
        };
        for a in [false, true] {
            for b in [false, true] {
                self.line(c(false, a, b), c(true, a, b), color);
                self.line(c(a, false, b), c(a, true, b), color);
                self.line(c(a, b, false), c(a, b, true), color);
            }
        }
    }

    /// Three axis circles of `segments` segments each.
    pub fn wire_sphere(&mut self, center: Vec3, radius: f32, color: [f32; 4], segments: usize) {
        let segments = segments.max(3);
        let point = |axis: usize, i: usize| {
            let a = i as f32 / segments as f32 * std::f32::consts::TAU;
            let (s, c) = a.sin_cos();
            let offset = match axis {
                0 => Vec3::new(0.0, c, s),
                1 => Vec3::new(c, 0.0, s),
                _ => Vec3::new(c, s, 0.0),
            };
            center + offset * radius
        };
        for axis in 0..3 {
            for i in 0..segments {
                self.line(point(axis, i), point(axis, i + 1), color);
            }
        }
    }

    /// Small three-axis cross at `point`.
    pub fn marker(&mut self, point: Vec3, size: f32, color: [f32; 4]) {
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            self.line(point - axis * size, point + axis * size, color);
        }
    }

    /// Rays from a camera through its viewport corners and centre, `length`
    /// long, with the far ends of the corner rays joined into a rectangle.
    pub fn frustum_rays<C: ViewportCamera + ?Sized>(&mut self, camera: &C, length: f32, color: [f32; 4]) {
        let ends = FRUSTUM_PROBES.map(|(u, v)| {
            let ray = camera.viewport_to_ray(u, v);
            self.line(ray.origin, ray.at(length), color);
            ray.at(length)
        });
        for i in 0..4 {
            self.line(ends[i], ends[(i + 1) % 4], color);
        }
    }

    /// Square grid on the y = 0 plane.
    pub fn floor_grid(&mut self, half_extent: i32, spacing: f32, color: [f32; 4]) {
        let extent = half_extent as f32 * spacing;
        for i in -half_extent..=half_extent {
            let offset = i as f32 * spacing;
            self.line(
                Vec3::new(-extent, 0.0, offset),
                Vec3::new(extent, 0.0, offset),
                color,
            );
            self.line(
                Vec3::new(offset, 0.0, -extent),
                Vec3::new(offset, 0.0, extent),
                color,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_common::Pose;
    use arena_sampler::PinholeCamera;

    const WHITE: [f32; 4] = [1.0; 4];

    #[test]
    fn box_has_twelve_edges_on_its_corners() {
        let mut lines = DebugLines::new();
        lines.wire_box(Vec3::ZERO, Vec3::ONE, WHITE);
        assert_eq!(lines.len(), 12);
        for v in lines.vertices() {
            assert!(v.position.iter().all(|c| *c == 0.0 || *c == 1.0));
        }
    }

    #[test]
    fn sphere_points_lie_on_radius() {
        let mut lines = DebugLines::new();
        let center = Vec3::new(1.0, 2.0, 3.0);
        lines.wire_sphere(center, 0.2, WHITE, 16);
        assert_eq!(lines.len(), 48);
        for v in lines.vertices() {
            assert!((Vec3::from_array(v.position).distance(center) - 0.2).abs() < 1e-5);
        }
    }

    #[test]
    fn frustum_rays_start_at_camera() {
        let cam = PinholeCamera {
            pose: Pose::looking_at(Vec3::new(0.0, 3.0, 0.0), Vec3::ZERO),
            ..PinholeCamera::default()
        };
        let mut lines = DebugLines::new();
        lines.frustum_rays(&cam, 5.0, WHITE);
        assert_eq!(lines.len(), 9);
        // The centre ray points straight down.
        let centre_end = Vec3::from_array(lines.vertices()[9].position);
        assert!((centre_end.x).abs() < 1e-4 && centre_end.y < -1.9);
    }

    #[test]
    fn grid_and_clear() {
        let mut lines = DebugLines::new();
        lines.floor_grid(5, 1.0, WHITE);
        assert_eq!(lines.len(), 22);
        lines.marker(Vec3::ZERO, 0.1, WHITE);
        assert_eq!(lines.len(), 25);
        lines.clear();
        assert!(lines.is_empty());
    }
}
