use arena_common::Ray;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Collider geometry. All shapes are world-space and axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Cuboid { center: Vec3, half_extents: Vec3 },
    Sphere { center: Vec3, radius: f32 },
    /// Infinite plane `dot(normal, p) = distance`; only its front face is solid.
    Plane { normal: Vec3, distance: f32 },
}

impl Shape {
    /// Horizontal ground plane at height `y`, solid from above.
    pub fn ground(y: f32) -> Self {
        Shape::Plane {
            normal: Vec3::Y,
            distance: y,
        }
    }

    /// Centre of the shape's bounds; `None` for unbounded shapes.
    pub fn center(&self) -> Option<Vec3> {
        match *self {
            Shape::Cuboid { center, .. } | Shape::Sphere { center, .. } => Some(center),
            Shape::Plane { .. } => None,
        }
    }

    /// Move the shape by `delta`.
    pub fn translate(&mut self, delta: Vec3) {
        match self {
            Shape::Cuboid { center, .. } | Shape::Sphere { center, .. } => *center += delta,
            Shape::Plane { normal, distance } => *distance += normal.dot(delta),
        }
    }

    /// Nearest entry distance and surface normal along `ray`, if any.
    ///
    /// Entries behind the origin are ignored, so a ray that starts inside a
    /// solid does not report it.
    pub fn intersect(&self, ray: &Ray) -> Option<(f32, Vec3)> {
        match *self {
            Shape::Cuboid {
                center,
                half_extents,
            } => intersect_aabb(ray, center - half_extents, center + half_extents),
            Shape::Sphere { center, radius } => intersect_sphere(ray, center, radius),
            Shape::Plane { normal, distance } => {
                let denom = normal.dot(ray.direction);
                if denom >= -1e-8 {
                    return None; // parallel or hitting the back face
                }
                let t = (distance - normal.dot(ray.origin)) / denom;
                (t >= 0.0).then_some((t, normal))
            }
        }
    }
}

/// Slab test.
fn intersect_aabb(ray: &Ray, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let inv = ray.direction.recip();
    let t0 = (min - ray.origin) * inv;
    let t1 = (max - ray.origin) * inv;
    let near = t0.min(t1);
    let far = t0.max(t1);

    // NaN lanes (zero direction component with origin on a slab plane) are
    // treated as unbounded by max/min_element.
    let t_enter = near.max_element();
    let t_exit = far.min_element();
    if t_enter > t_exit || t_enter < 0.0 || !t_enter.is_finite() {
        return None;
    }

    let axis = if near.x == t_enter {
        0
    } else if near.y == t_enter {
        1
    } else {
        2
    };
    let mut normal = Vec3::ZERO;
    normal[axis] = -ray.direction[axis].signum();
    Some((t_enter, normal))
}

fn intersect_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<(f32, Vec3)> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 || c < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    if t < 0.0 {
        return None;
    }
    let normal = (ray.at(t) - center) / radius;
    Some((t, normal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_front_face() {
        let s = Shape::Cuboid {
            center: Vec3::new(0.0, 0.0, -5.0),
            half_extents: Vec3::splat(1.0),
        };
        let (t, n) = s.intersect(&Ray::new(Vec3::ZERO, Vec3::NEG_Z)).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
        assert_eq!(n, Vec3::Z);
    }

    #[test]
    fn cuboid_miss_and_behind() {
        let s = Shape::Cuboid {
            center: Vec3::new(0.0, 0.0, -5.0),
            half_extents: Vec3::splat(1.0),
        };
        assert!(s.intersect(&Ray::new(Vec3::ZERO, Vec3::Z)).is_none());
        assert!(s.intersect(&Ray::new(Vec3::new(3.0, 0.0, 0.0), Vec3::NEG_Z)).is_none());
    }

    #[test]
    fn ray_inside_cuboid_does_not_hit() {
        let s = Shape::Cuboid {
            center: Vec3::ZERO,
            half_extents: Vec3::splat(1.0),
        };
        assert!(s.intersect(&Ray::new(Vec3::ZERO, Vec3::X)).is_none());
    }

    #[test]
    fn axis_parallel_ray_through_cuboid() {
        let s = Shape::Cuboid {
            center: Vec3::new(0.0, 2.0, 0.0),
            half_extents: Vec3::new(0.5, 0.5, 0.5),
        };
        let (t, n) = s
            .intersect(&Ray::new(Vec3::new(0.2, 0.0, -0.3), Vec3::Y))
            .unwrap();
        assert!((t - 1.5).abs() < 1e-5);
        assert_eq!(n, Vec3::NEG_Y);
    }

    #[test]
    fn sphere_hit_distance_and_normal() {
        let s = Shape::Sphere {
            center: Vec3::new(0.0, 0.0, -10.0),
            radius: 2.0,
        };
        let (t, n) = s.intersect(&Ray::new(Vec3::ZERO, Vec3::NEG_Z)).unwrap();
        assert!((t - 8.0).abs() < 1e-4);
        assert!((n - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn ground_plane_from_above_only() {
        let g = Shape::ground(0.0);
        let (t, n) = g
            .intersect(&Ray::new(Vec3::new(0.0, 3.0, 0.0), Vec3::new(0.0, -1.0, 1.0)))
            .unwrap();
        assert!((t - 3.0 * 2f32.sqrt()).abs() < 1e-4);
        assert_eq!(n, Vec3::Y);
        assert!(g
            .intersect(&Ray::new(Vec3::new(0.0, -1.0, 0.0), Vec3::NEG_Y))
            .is_none());
        assert!(g.intersect(&Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::X)).is_none());
    }

    #[test]
    fn translate_moves_bounds_and_planes() {
        let mut s = Shape::Sphere {
            center: Vec3::ZERO,
            radius: 1.0,
        };
        s.translate(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(s.center(), Some(Vec3::new(1.0, 2.0, 3.0)));

        let mut g = Shape::ground(0.0);
        g.translate(Vec3::new(5.0, 1.5, 0.0));
        assert_eq!(
            g,
            Shape::Plane {
                normal: Vec3::Y,
                distance: 1.5
            }
        );
        assert_eq!(g.center(), None);
    }
}
