use arena_common::config::CameraTemplate;
use arena_common::{Pose, Ray};
use glam::{Mat4, Vec3};

/// Camera collaborator: anything that can turn viewport coordinates into rays.
pub trait ViewportCamera {
    fn pose(&self) -> Pose;

    /// Ray through normalized viewport point `(u, v)`, both in `[0, 1]`,
    /// with `v = 0` at the bottom edge.
    fn viewport_to_ray(&self, u: f32, v: f32) -> Ray;

    /// Far clip distance; samplers never look beyond it.
    fn far_clip(&self) -> f32;
}

/// Ideal perspective camera. Looks down its local -Z axis, +Y up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeCamera {
    pub pose: Pose,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Width over height.
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for PinholeCamera {
    fn default() -> Self {
        Self::from_template(Pose::default(), &CameraTemplate::default())
    }
}

impl PinholeCamera {
    pub fn from_template(pose: Pose, template: &CameraTemplate) -> Self {
        Self {
            pose,
            fov_y: template.fov_y_degrees.to_radians(),
            aspect: template.aspect,
            near: template.near,
            far: template.far,
        }
    }

    /// Camera-space direction through `(u, v)`, on the `z = -1` plane.
    fn local_direction(&self, u: f32, v: f32) -> Vec3 {
        let tan_y = (self.fov_y * 0.5).tan();
        let tan_x = tan_y * self.aspect;
        Vec3::new((2.0 * u - 1.0) * tan_x, (2.0 * v - 1.0) * tan_y, -1.0)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.pose.rotation, self.pose.position).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// World-space corners of the frustum slice at `distance` along the view
    /// axis, counter-clockwise from bottom-left.
    pub fn frustum_corners(&self, distance: f32) -> [Vec3; 4] {
        [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)].map(|(u, v)| {
            self.pose.position + self.pose.rotation * (self.local_direction(u, v) * distance)
        })
    }
}

impl ViewportCamera for PinholeCamera {
    fn pose(&self) -> Pose {
        self.pose
    }

    fn viewport_to_ray(&self, u: f32, v: f32) -> Ray {
        let local = self.local_direction(u, v);
        let origin = self.pose.position + self.pose.rotation * (local * self.near);
        Ray::new(origin, self.pose.rotation * local)
    }

    fn far_clip(&self) -> f32 {
        self.far
    }
}
