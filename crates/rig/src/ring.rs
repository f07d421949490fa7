use arena_common::config::{CameraTemplate, RingConfig};
use arena_common::{Pose, SkipReason, TickOutcome};
use arena_sampler::PinholeCamera;
use glam::{Quat, Vec3};

use crate::scheduler::RebuildScheduler;

/// Name prefix of every camera the ring creates.
pub const CAMERA_NAME_PREFIX: &str = "KinectCam";

/// Whether a camera named `name` takes part in coverage.
pub fn is_coverage_camera(name: &str) -> bool {
    name.starts_with(CAMERA_NAME_PREFIX)
}

/// Placement parameters of a rectangular camera ring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingLayout {
    pub num_cameras: usize,
    pub arena_width: f32,
    pub arena_depth: f32,
    pub camera_height: f32,
    pub face_center: bool,
    /// Ring centre on the ground; poses are placed relative to it.
    pub origin: Vec3,
}

impl Default for RingLayout {
    fn default() -> Self {
        Self::from_config(&RingConfig::default())
    }
}

impl RingLayout {
    pub fn from_config(config: &RingConfig) -> Self {
        Self {
            num_cameras: config.num_cameras,
            arena_width: config.arena_width,
            arena_depth: config.arena_depth,
            camera_height: config.camera_height,
            face_center: config.face_center,
            origin: Vec3::ZERO,
        }
    }

    /// Rectangle corners at camera height, clockwise from `(-w/2, -d/2)`,
    /// relative to the origin.
    pub fn corners(&self) -> [Vec3; 4] {
        let (w, d, h) = (self.arena_width * 0.5, self.arena_depth * 0.5, self.camera_height);
        [
            Vec3::new(-w, h, -d),
            Vec3::new(w, h, -d),
            Vec3::new(w, h, d),
            Vec3::new(-w, h, d),
        ]
    }

    pub fn perimeter(&self) -> f32 {
        2.0 * (self.arena_width.abs() + self.arena_depth.abs())
    }

    /// Point at fraction `t` of the way around the perimeter, relative to the origin.
    pub fn point_on_perimeter(&self, t: f32) -> Vec3 {
        let corners = self.corners();
        let lengths: [f32; 4] =
            std::array::from_fn(|i| corners[i].distance(corners[(i + 1) % 4]));
        let target = t * lengths.iter().sum::<f32>();

        let mut cumulative = 0.0;
        for (i, len) in lengths.iter().enumerate() {
            let next = cumulative + len;
            if target <= next {
                let local = if *len > 0.0 {
                    (target - cumulative) / len
                } else {
                    0.0
                };
                return corners[i].lerp(corners[(i + 1) % 4], local);
            }
            cumulative = next;
        }
        corners[0]
    }

    /// World poses of all cameras, evenly spaced by perimeter distance.
    ///
    /// Cameras face the origin when `face_center` is set; otherwise they keep
    /// an identity orientation.
    pub fn placements(&self) -> Vec<Pose> {
        let n = self.num_cameras;
        (0..n)
            .map(|i| {
                let position = self.origin + self.point_on_perimeter(i as f32 / n as f32);
                if self.face_center {
                    Pose::looking_at(position, self.origin)
                } else {
                    Pose::new(position, Quat::IDENTITY)
                }
            })
            .collect()
    }
}

/// One camera owned by the ring.
#[derive(Debug, Clone, PartialEq)]
pub struct RingCamera {
    pub name: String,
    pub camera: PinholeCamera,
}

/// The set of cameras placed around the arena.
///
/// Cameras are created from a template, so without one the ring cannot
/// grow. Layout edits go through [`CameraRing::configure`] and, with
/// auto-update on, are applied on the next [`CameraRing::idle`].
#[derive(Debug)]
pub struct CameraRing {
    layout: RingLayout,
    template: Option<CameraTemplate>,
    auto_update: bool,
    cameras: Vec<RingCamera>,
    scheduler: RebuildScheduler,
    warned_missing_template: bool,
}

impl CameraRing {
    pub fn new(config: &RingConfig) -> Self {
        Self {
            layout: RingLayout::from_config(config),
            template: config.camera,
            auto_update: config.auto_update,
            cameras: Vec::new(),
            scheduler: RebuildScheduler::new(),
            warned_missing_template: false,
        }
    }

    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }

    pub fn template(&self) -> Option<&CameraTemplate> {
        self.template.as_ref()
    }

    pub fn cameras(&self) -> &[RingCamera] {
        &self.cameras
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Poses of the cameras that take part in coverage.
    pub fn coverage_poses(&self) -> Vec<Pose> {
        self.cameras
            .iter()
            .filter(|c| is_coverage_camera(&c.name))
            .map(|c| c.camera.pose)
            .collect()
    }

    /// A rebuild is waiting for the next idle frame.
    pub fn is_rebuild_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Apply edited settings. Returns whether anything changed; with
    /// auto-update on, a change schedules a rebuild.
    pub fn configure(&mut self, config: &RingConfig) -> bool {
        let layout = RingLayout {
            origin: self.layout.origin,
            ..RingLayout::from_config(config)
        };
        let changed = layout != self.layout || config.camera != self.template;
        self.layout = layout;
        self.template = config.camera;
        if config.camera.is_some() {
            self.warned_missing_template = false;
        }
        self.auto_update = config.auto_update;
        if changed && self.auto_update {
            self.scheduler.request();
        }
        changed
    }

    /// Move the ring centre and schedule a rebuild when auto-updating.
    pub fn set_origin(&mut self, origin: Vec3) {
        if origin != self.layout.origin {
            self.layout.origin = origin;
            if self.auto_update {
                self.scheduler.request();
            }
        }
    }

    /// Run a scheduled rebuild, if any. Call once per frame.
    pub fn idle(&mut self) -> Option<TickOutcome> {
        self.scheduler.take_due().then(|| self.rebuild())
    }

    /// Drop any scheduled rebuild.
    pub fn cancel_pending(&mut self) {
        self.scheduler.cancel();
    }

    /// Bring the camera list to `num_cameras` and place every camera.
    ///
    /// New cameras are named `KinectCam_{index}`; surplus cameras are removed
    /// from the end. Intrinsics are restamped from the template each time.
    pub fn rebuild(&mut self) -> TickOutcome {
        let Some(template) = self.template else {
            if !self.warned_missing_template {
                tracing::warn!("no camera template assigned, camera ring left unchanged");
                self.warned_missing_template = true;
            }
            return TickOutcome::Skipped(SkipReason::MissingCollaborator(
                "camera template".into(),
            ));
        };

        let target = self.layout.num_cameras;
        let before = self.cameras.len();
        while self.cameras.len() < target {
            let name = format!("{CAMERA_NAME_PREFIX}_{}", self.cameras.len());
            self.cameras.push(RingCamera {
                name,
                camera: PinholeCamera::from_template(Pose::default(), &template),
            });
        }
        self.cameras.truncate(target);

        for (cam, pose) in self.cameras.iter_mut().zip(self.layout.placements()) {
            let rotation = if self.layout.face_center {
                pose.rotation
            } else {
                cam.camera.pose.rotation
            };
            cam.camera = PinholeCamera::from_template(Pose::new(pose.position, rotation), &template);
        }

        tracing::debug!(before, after = self.cameras.len(), "camera ring rebuilt");
        TickOutcome::Accumulated {
            work: self.cameras.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn four_cameras_on_default_arena() {
        let layout = RingLayout::default();
        let p: Vec<Vec3> = layout.placements().iter().map(|p| p.position).collect();
        let h = 2.94;
        assert!(close(p[0], Vec3::new(-2.5, h, -1.5)));
        assert!(close(p[1], Vec3::new(1.5, h, -1.5)));
        assert!(close(p[2], Vec3::new(2.5, h, 1.5)));
        assert!(close(p[3], Vec3::new(-1.5, h, 1.5)));
    }

    #[test]
    fn square_ring_is_symmetric() {
        let layout = RingLayout {
            arena_width: 4.0,
            arena_depth: 4.0,
            ..RingLayout::default()
        };
        let poses = layout.placements();
        let sum: Vec3 = poses.iter().map(|p| p.position).sum();
        assert!(close(sum, Vec3::new(0.0, 4.0 * 2.94, 0.0)));
        for p in &poses {
            let flat = Vec3::new(p.position.x, 0.0, p.position.z);
            assert!((flat.length() - 8.0f32.sqrt()).abs() < 1e-4);
        }
    }

    #[test]
    fn cameras_face_the_origin() {
        let layout = RingLayout {
            origin: Vec3::new(1.0, 0.0, 2.0),
            ..RingLayout::default()
        };
        for pose in layout.placements() {
            let to_origin = (layout.origin - pose.position).normalize();
            assert!(pose.forward().dot(to_origin) > 0.9999);
        }
    }

    #[test]
    fn degenerate_layouts() {
        let none = RingLayout {
            num_cameras: 0,
            ..RingLayout::default()
        };
        assert!(none.placements().is_empty());

        let line = RingLayout {
            arena_depth: 0.0,
            num_cameras: 3,
            ..RingLayout::default()
        };
        assert!(line.placements().iter().all(|p| p.position.is_finite()));
    }

    #[test]
    fn rebuild_grows_and_shrinks_with_names() {
        let mut config = RingConfig {
            num_cameras: 6,
            ..RingConfig::default()
        };
        let mut ring = CameraRing::new(&config);
        assert_eq!(ring.rebuild().work(), 6);
        let names: Vec<&str> = ring.cameras().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names[0], "KinectCam_0");
        assert_eq!(names[5], "KinectCam_5");

        config.num_cameras = 2;
        ring.configure(&config);
        ring.rebuild();
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.cameras()[1].name, "KinectCam_1");
        assert_eq!(ring.coverage_poses().len(), 2);
    }

    #[test]
    fn missing_template_leaves_ring_untouched() {
        let config = RingConfig {
            camera: None,
            ..RingConfig::default()
        };
        let mut ring = CameraRing::new(&config);
        for _ in 0..3 {
            assert_eq!(
                ring.rebuild(),
                TickOutcome::Skipped(SkipReason::MissingCollaborator("camera template".into()))
            );
        }
        assert!(ring.is_empty());
        assert!(ring.warned_missing_template);
    }

    #[test]
    fn edits_collapse_into_one_idle_rebuild() {
        let mut config = RingConfig::default();
        let mut ring = CameraRing::new(&config);
        assert!(ring.idle().is_none());

        for n in 3..=7 {
            config.num_cameras = n;
            assert!(ring.configure(&config));
        }
        assert!(ring.is_rebuild_pending());
        assert_eq!(ring.idle().map(|o| o.work()), Some(7));
        assert!(ring.idle().is_none());
        assert!(!ring.configure(&config));
    }

    #[test]
    fn manual_mode_does_not_schedule() {
        let mut config = RingConfig {
            auto_update: false,
            ..RingConfig::default()
        };
        let mut ring = CameraRing::new(&config);
        config.num_cameras = 5;
        assert!(ring.configure(&config));
        assert!(!ring.is_rebuild_pending());
        assert!(ring.idle().is_none());
        assert!(ring.is_empty());
    }

    #[test]
    fn intrinsics_follow_template() {
        let mut config = RingConfig::default();
        let mut ring = CameraRing::new(&config);
        ring.rebuild();
        let mut template = CameraTemplate::default();
        template.far = 10.0;
        config.camera = Some(template);
        ring.configure(&config);
        ring.idle();
        assert!(ring.cameras().iter().all(|c| c.camera.far == 10.0));
    }

    #[test]
    fn coverage_filter_uses_prefix() {
        assert!(is_coverage_camera("KinectCam_3"));
        assert!(!is_coverage_camera("OverviewCam"));
    }
}
