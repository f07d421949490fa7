use std::collections::HashSet;

use arena_common::config::FusionConfig;
use arena_common::{CoverageAccumulator, FrameClock, Pose, SkipReason, TickOutcome};
use arena_sampler::DepthImage;
use glam::Vec3;

use crate::backend::{ComputeBackend, Kernel, Resource};
use crate::depth::DEPTH_SLOTS;
use crate::layout::{CameraSlots, FusionUniforms, ObjectSlots, groups_2d, groups_3d};

/// What the fusion pass reads from the scene each frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionFrame<'a> {
    pub cameras: &'a [Pose],
    pub objects: &'a [Vec3],
}

/// Per-frame driver of the fusion kernels.
///
/// Holds no GPU state of its own: it validates that the backend has every
/// kernel and resource a step needs, packs slots, uploads, and dispatches.
/// Missing pieces skip the step and are warned about once per key.
pub struct FusionPass<B: ComputeBackend> {
    backend: B,
    config: FusionConfig,
    warned: HashSet<String>,
    initialized: bool,
}

impl<B: ComputeBackend> FusionPass<B> {
    /// Take ownership of `backend` and allocate the volume and output image.
    pub fn new(mut backend: B, config: FusionConfig) -> Self {
        backend.allocate(config.resolution, config.output_resolution);
        tracing::info!(
            backend = backend.label(),
            resolution = ?config.resolution,
            output = ?config.output_resolution,
            "fusion pass created"
        );
        Self {
            backend,
            config,
            warned: HashSet::new(),
            initialized: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Replace the configuration. A change of volume or image size
    /// reallocates and forces a fresh clear on the next update.
    pub fn reconfigure(&mut self, config: FusionConfig) {
        if config.resolution != self.config.resolution
            || config.output_resolution != self.config.output_resolution
        {
            self.backend
                .allocate(config.resolution, config.output_resolution);
            self.initialized = false;
        }
        self.config = config;
    }

    /// Zero the volume. Also done automatically before the first update.
    pub fn initialize(&mut self) -> TickOutcome {
        if let Err(reason) = self.require(&[Kernel::ClearVoxels], &[Resource::Volume]) {
            return TickOutcome::Skipped(reason);
        }
        let uniforms = FusionUniforms::from_config(&self.config);
        self.backend.write_uniforms(&uniforms);
        self.backend
            .dispatch(Kernel::ClearVoxels, groups_3d(self.config.resolution));
        self.initialized = true;
        tracing::debug!(backend = self.backend.label(), "fusion volume cleared");
        TickOutcome::Accumulated { work: 1 }
    }

    /// Decay and refresh the volume from `frame`, then redraw the top-down image.
    ///
    /// Cameras beyond 8 and objects beyond 100 are dropped with a one-time
    /// warning. A frame without cameras leaves the volume untouched.
    pub fn update(&mut self, frame: &FusionFrame<'_>, dt: f32) -> TickOutcome {
        if let Err(reason) = self.require(
            &[Kernel::UpdateVoxels, Kernel::VisualizeTopDown],
            &[Resource::Volume, Resource::Output],
        ) {
            return TickOutcome::Skipped(reason);
        }
        let _span = tracing::info_span!("fusion_update", backend = self.backend.label()).entered();

        let mut work = 0;
        if !self.initialized {
            work += self.initialize().work();
        }
        if frame.cameras.is_empty() {
            return TickOutcome::Skipped(SkipReason::NoSensors);
        }

        let cameras = CameraSlots::pack(frame.cameras);
        if cameras.dropped > 0 {
            self.warn_once(
                "camera-capacity",
                &format!("{} cameras beyond capacity ignored", cameras.dropped),
            );
        }
        let objects = ObjectSlots::pack(frame.objects);
        if objects.dropped > 0 {
            self.warn_once(
                "object-capacity",
                &format!("{} tracked objects beyond capacity ignored", objects.dropped),
            );
        }

        let mut uniforms = FusionUniforms::from_config(&self.config)
            .with_cameras(&cameras)
            .with_objects(&objects);
        uniforms.delta_time = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        self.backend.write_uniforms(&uniforms);
        self.backend.write_objects(&objects);
        self.backend
            .dispatch(Kernel::UpdateVoxels, groups_3d(self.config.resolution));
        self.backend.dispatch(
            Kernel::VisualizeTopDown,
            groups_2d(self.config.output_resolution),
        );
        work += 2;
        tracing::trace!(
            cameras = cameras.active,
            objects = objects.active,
            dt = uniforms.delta_time,
            "fusion update dispatched"
        );
        TickOutcome::Accumulated { work }
    }

    /// Fuse up to eight depth images into the output image.
    pub fn fuse_depth(&mut self, images: &[DepthImage]) -> TickOutcome {
        if images.is_empty() {
            return TickOutcome::Skipped(SkipReason::NoSensors);
        }
        if images.len() > DEPTH_SLOTS {
            self.warn_once(
                "depth-capacity",
                &format!("{} depth images beyond capacity ignored", images.len() - DEPTH_SLOTS),
            );
        }
        if let Err(reason) = self.require(&[Kernel::FuseDepth], &[Resource::Output]) {
            return TickOutcome::Skipped(reason);
        }
        self.backend.bind_depth_images(images);
        if let Err(reason) = self.require(&[], &[Resource::DepthSlots]) {
            return TickOutcome::Skipped(reason);
        }
        let mut uniforms = FusionUniforms::from_config(&self.config);
        uniforms.num_cameras = images.len().min(DEPTH_SLOTS) as u32;
        self.backend.write_uniforms(&uniforms);
        self.backend
            .dispatch(Kernel::FuseDepth, groups_2d(self.config.output_resolution));
        TickOutcome::Accumulated { work: 1 }
    }

    /// Paint the animated diagnostic pattern into the output image.
    pub fn test_pattern(&mut self, time: f32) -> TickOutcome {
        if let Err(reason) = self.require(&[Kernel::TestPattern], &[Resource::Output]) {
            return TickOutcome::Skipped(reason);
        }
        let mut uniforms = FusionUniforms::from_config(&self.config);
        uniforms.time = time;
        self.backend.write_uniforms(&uniforms);
        self.backend
            .dispatch(Kernel::TestPattern, groups_2d(self.config.output_resolution));
        TickOutcome::Accumulated { work: 1 }
    }

    fn require(&mut self, kernels: &[Kernel], resources: &[Resource]) -> Result<(), SkipReason> {
        let missing = kernels
            .iter()
            .find(|k| !self.backend.has_kernel(**k))
            .map(|k| format!("kernel {k}"))
            .or_else(|| {
                resources
                    .iter()
                    .find(|r| !self.backend.has_resource(**r))
                    .map(|r| r.to_string())
            });
        match missing {
            None => Ok(()),
            Some(what) => {
                self.warn_once(&what, &format!("{what} unavailable, fusion step skipped"));
                Err(SkipReason::MissingCollaborator(what))
            }
        }
    }

    fn warn_once(&mut self, key: &str, message: &str) {
        if self.warned.insert(key.to_string()) {
            tracing::warn!(backend = self.backend.label(), "{message}");
        }
    }
}

impl<'a, B: ComputeBackend> CoverageAccumulator<FusionFrame<'a>> for FusionPass<B> {
    fn label(&self) -> &'static str {
        "gpu-fusion"
    }

    fn clear(&mut self) {
        if let TickOutcome::Skipped(reason) = self.initialize() {
            tracing::debug!(backend = self.backend.label(), "fusion clear skipped: {reason}");
        }
    }

    fn accumulate(&mut self, input: &FusionFrame<'a>, clock: &FrameClock) -> TickOutcome {
        self.update(input, clock.delta)
    }
}
