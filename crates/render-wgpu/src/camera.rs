use glam::{Mat4, Vec3};

/// Orbit camera circling a target point.
/// View state only; it has no effect on what the coverage cameras see.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub sensitivity: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::new(0.0, 0.5, 0.0),
            distance: 8.0,
            yaw: -90.0_f32.to_radians(),
            pitch: -35.0_f32.to_radians(),
            fov: 60.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.05,
            far: 200.0,
            sensitivity: 0.005,
            zoom_speed: 0.1,
            pan_speed: 0.002,
        }
    }
}

impl OrbitCamera {
    const MIN_DISTANCE: f32 = 0.5;
    const MAX_DISTANCE: f32 = 100.0;

    /// Unit vector from the eye towards the target.
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize()
    }

    pub fn eye(&self) -> Vec3 {
        self.target - self.forward() * self.distance
    }

    /// Rotate around the target by a mouse delta in pixels.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch -= dy * self.sensitivity;
        self.pitch = self.pitch.clamp(-89.0_f32.to_radians(), 89.0_f32.to_radians());
    }

    /// Scroll-wheel zoom; positive `steps` moves closer.
    pub fn zoom(&mut self, steps: f32) {
        let factor = (1.0 - self.zoom_speed).powf(steps);
        self.distance = (self.distance * factor).clamp(Self::MIN_DISTANCE, Self::MAX_DISTANCE);
    }

    /// Slide the target in the view plane by a mouse delta in pixels.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let up = self.right().cross(self.forward());
        let scale = self.pan_speed * self.distance;
        self.target += (-self.right() * dx + up * dy) * scale;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eye_sits_at_distance_from_target() {
        let cam = OrbitCamera::default();
        assert!((cam.eye().distance(cam.target) - cam.distance).abs() < 1e-4);
        assert!(cam.eye().y > cam.target.y);
        assert!(!cam.view_projection().col(0).x.is_nan());
    }

    #[test]
    fn target_projects_to_screen_center() {
        let cam = OrbitCamera::default();
        let clip = cam.view_projection() * cam.target.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = OrbitCamera::default();
        cam.orbit(0.0, -1.0e6);
        assert!(cam.pitch <= 89.0_f32.to_radians());
    }

    #[test]
    fn zoom_stays_in_range() {
        let mut cam = OrbitCamera::default();
        cam.zoom(1000.0);
        assert_eq!(cam.distance, OrbitCamera::MIN_DISTANCE);
        cam.zoom(-1000.0);
        assert_eq!(cam.distance, OrbitCamera::MAX_DISTANCE);
    }

    #[test]
    fn pan_moves_target_not_distance() {
        let mut cam = OrbitCamera::default();
        let start = cam.target;
        cam.pan(100.0, 0.0);
        assert_ne!(cam.target, start);
        assert!((cam.eye().distance(cam.target) - cam.distance).abs() < 1e-4);
    }
}
