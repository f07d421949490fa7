//! CPU mirror of the fusion kernels.
//!
//! Every function here matches the WGSL in `shaders.rs` texel for texel. The
//! CPU backend runs the whole pass without a GPU: tests use it to pin the
//! blend law, and the CLI falls back to it when no adapter is available.

use arena_sampler::DepthImage;
use glam::{UVec2, UVec3, Vec3, Vec4};

use crate::backend::{ComputeBackend, Kernel, Resource};
use crate::depth::DEPTH_SLOTS;
use crate::layout::{FusionUniforms, MAX_CAMERAS, MAX_OBJECTS, ObjectSlots};

const BASE_COLOR: Vec3 = Vec3::new(0.05, 0.05, 0.12);
const HOT_COLOR: Vec3 = Vec3::new(1.0, 0.35, 0.05);

/// Frame rate at which `decay_rate` is defined per frame.
const DECAY_REFERENCE_HZ: f32 = 60.0;

/// New coverage for a voxel at `center` holding `old`.
///
/// Visibility is the fraction of live cameras whose coverage cone contains
/// the voxel; occupancy is a linear falloff around the nearest tracked
/// object. With `decay_rate == 0` coverage only integrates; otherwise the
/// old value is kept at `(1 - decay)^(dt * 60)` and blended towards the
/// contribution.
pub fn update_voxel(old: f32, center: Vec3, u: &FusionUniforms, objects: &[[f32; 4]]) -> f32 {
    let num_cameras = (u.num_cameras as usize).min(MAX_CAMERAS);
    let mut seen = 0u32;
    for i in 0..num_cameras {
        let pos = Vec4::from_array(u.camera_positions[i]).truncate();
        let fwd = Vec4::from_array(u.camera_forwards[i]).truncate();
        let d = center - pos;
        let dist = d.length();
        if dist > 1e-5 && dist <= u.max_range && (d / dist).dot(fwd) >= u.cos_half_fov {
            seen += 1;
        }
    }
    let visibility = if num_cameras > 0 {
        seen as f32 / num_cameras as f32
    } else {
        0.0
    };

    let num_objects = (u.num_objects as usize).min(MAX_OBJECTS).min(objects.len());
    let mut occupancy = 0.0f32;
    if u.object_radius > 0.0 {
        for obj in &objects[..num_objects] {
            let dist = center.distance(Vec4::from_array(*obj).truncate());
            occupancy = occupancy.max((1.0 - dist / u.object_radius).clamp(0.0, 1.0));
        }
    }

    let contribution = visibility * u.ambient_weight.max(occupancy);
    let dt = u.delta_time;
    let decay = u.decay_rate;
    if dt <= 0.0 {
        return old.clamp(0.0, 1.0);
    }
    if decay <= 0.0 {
        return (old + contribution * dt).clamp(0.0, 1.0);
    }
    let keep = if decay >= 1.0 {
        0.0
    } else {
        (1.0 - decay).powf(dt * DECAY_REFERENCE_HZ)
    };
    (old * keep + contribution * (1.0 - keep)).clamp(0.0, 1.0)
}

/// Heat colour of a top-down column maximum.
pub fn top_down_color(value: f32) -> [u8; 4] {
    let c = BASE_COLOR.lerp(HOT_COLOR, value.clamp(0.0, 1.0));
    to_rgba8(c.extend(1.0))
}

/// Combined colour of one output pixel from up to eight depth samples.
///
/// Red is the fraction of live cameras seeing a surface within `max_range`,
/// green how near the nearest such surface is.
pub fn fuse_depth_pixel(depths: &[f32; DEPTH_SLOTS], num_cameras: u32, max_range: f32) -> [u8; 4] {
    let n = (num_cameras as usize).min(DEPTH_SLOTS);
    let mut covered = 0u32;
    let mut nearest = f32::INFINITY;
    for &d in &depths[..n] {
        if d.is_finite() && d <= max_range {
            covered += 1;
            nearest = nearest.min(d);
        }
    }
    let coverage = if n > 0 {
        covered as f32 / n as f32
    } else {
        0.0
    };
    let nearness = if covered > 0 && max_range > 0.0 {
        1.0 - nearest / max_range
    } else {
        0.0
    };
    to_rgba8(Vec4::new(coverage, nearness, 0.1 * (1.0 - coverage), 1.0))
}

fn test_pattern_pixel(x: u32, y: u32, size: UVec2, time: f32) -> [u8; 4] {
    let s = size.max(UVec2::ONE).as_vec2();
    to_rgba8(Vec4::new(
        x as f32 / s.x,
        y as f32 / s.y,
        0.5 + 0.5 * time.sin(),
        1.0,
    ))
}

/// `rgba8unorm` storage conversion.
fn to_rgba8(c: Vec4) -> [u8; 4] {
    c.to_array().map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
}

fn texel_count(resolution: UVec3) -> usize {
    resolution.x as usize * resolution.y as usize * resolution.z as usize
}

/// Runs fusion kernels on the CPU over the same data layout as the GPU.
#[derive(Debug, Clone)]
pub struct CpuFusionBackend {
    resolution: UVec3,
    output_size: UVec2,
    volume: Vec<f32>,
    output: Vec<[u8; 4]>,
    uniforms: FusionUniforms,
    objects: Vec<[f32; 4]>,
    depth_images: Vec<DepthImage>,
    dispatches: usize,
}

impl Default for CpuFusionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuFusionBackend {
    pub fn new() -> Self {
        Self {
            resolution: UVec3::ZERO,
            output_size: UVec2::ZERO,
            volume: Vec::new(),
            output: Vec::new(),
            uniforms: bytemuck::Zeroable::zeroed(),
            objects: ObjectSlots::pack(&[]).positions,
            depth_images: Vec::new(),
            dispatches: 0,
        }
    }

    pub fn resolution(&self) -> UVec3 {
        self.resolution
    }

    pub fn output_size(&self) -> UVec2 {
        self.output_size
    }

    /// Volume texels, X fastest then Y then Z.
    pub fn volume(&self) -> &[f32] {
        &self.volume
    }

    pub fn value(&self, id: UVec3) -> Option<f32> {
        if id.cmpge(self.resolution).any() {
            return None;
        }
        self.volume.get(self.volume_index(id)).copied()
    }

    /// Output pixels, row-major.
    pub fn output(&self) -> &[[u8; 4]] {
        &self.output
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.output_size.x || y >= self.output_size.y {
            return None;
        }
        self.output.get((x + y * self.output_size.x) as usize).copied()
    }

    /// Dispatches executed since creation.
    pub fn dispatch_count(&self) -> usize {
        self.dispatches
    }

    fn volume_index(&self, id: UVec3) -> usize {
        let r = self.resolution;
        (id.x + r.x * (id.y + r.y * id.z)) as usize
    }

    /// Invocation ids covered by `groups`, clipped to `extent`.
    fn invocations(groups: UVec3, wg: UVec3, extent: UVec3) -> impl Iterator<Item = UVec3> {
        let span = (groups * wg).min(extent);
        (0..span.z).flat_map(move |z| {
            (0..span.y).flat_map(move |y| (0..span.x).map(move |x| UVec3::new(x, y, z)))
        })
    }

    fn run_clear(&mut self, groups: UVec3) {
        for id in Self::invocations(groups, Kernel::ClearVoxels.workgroup_size(), self.resolution) {
            let i = self.volume_index(id);
            self.volume[i] = 0.0;
        }
    }

    fn run_update(&mut self, groups: UVec3) {
        let prev = self.volume.clone();
        for id in Self::invocations(groups, Kernel::UpdateVoxels.workgroup_size(), self.resolution) {
            let i = self.volume_index(id);
            let center = self.uniforms.voxel_center(id);
            self.volume[i] = update_voxel(prev[i], center, &self.uniforms, &self.objects);
        }
    }

    fn run_visualize(&mut self, groups: UVec3) {
        let out = self.output_size;
        let res = self.resolution;
        for id in Self::invocations(groups, Kernel::VisualizeTopDown.workgroup_size(), out.extend(1)) {
            let vx = id.x * res.x / out.x;
            let vz = id.y * res.z / out.y;
            let column_max = (0..res.y)
                .map(|vy| self.volume[self.volume_index(UVec3::new(vx, vy, vz))])
                .fold(0.0f32, f32::max);
            self.output[(id.x + id.y * out.x) as usize] = top_down_color(column_max);
        }
    }

    fn run_fuse_depth(&mut self, groups: UVec3) {
        let out = self.output_size;
        let n = self.uniforms.num_cameras;
        for id in Self::invocations(groups, Kernel::FuseDepth.workgroup_size(), out.extend(1)) {
            let mut depths = [f32::INFINITY; DEPTH_SLOTS];
            for (slot, image) in self.depth_images.iter().take(DEPTH_SLOTS).enumerate() {
                let tx = id.x * image.width() / out.x;
                let ty = id.y * image.height() / out.y;
                depths[slot] = image.get(tx, ty).unwrap_or(f32::INFINITY);
            }
            self.output[(id.x + id.y * out.x) as usize] =
                fuse_depth_pixel(&depths, n, self.uniforms.max_range);
        }
    }

    fn run_test_pattern(&mut self, groups: UVec3) {
        let out = self.output_size;
        let time = self.uniforms.time;
        for id in Self::invocations(groups, Kernel::TestPattern.workgroup_size(), out.extend(1)) {
            self.output[(id.x + id.y * out.x) as usize] = test_pattern_pixel(id.x, id.y, out, time);
        }
    }
}

impl ComputeBackend for CpuFusionBackend {
    fn label(&self) -> &'static str {
        "cpu"
    }

    fn has_kernel(&self, _kernel: Kernel) -> bool {
        true
    }

    fn has_resource(&self, resource: Resource) -> bool {
        match resource {
            Resource::Volume => !self.volume.is_empty(),
            Resource::Output => !self.output.is_empty(),
            Resource::DepthSlots => !self.depth_images.is_empty(),
        }
    }

    fn allocate(&mut self, resolution: UVec3, output_size: UVec2) {
        self.resolution = resolution;
        self.output_size = output_size;
        self.volume = vec![0.0; texel_count(resolution)];
        self.output = vec![[0, 0, 0, 0]; output_size.x as usize * output_size.y as usize];
    }

    fn write_uniforms(&mut self, uniforms: &FusionUniforms) {
        self.uniforms = *uniforms;
    }

    fn write_objects(&mut self, objects: &ObjectSlots) {
        self.objects.clone_from(&objects.positions);
    }

    fn bind_depth_images(&mut self, images: &[DepthImage]) {
        self.depth_images = images.iter().take(DEPTH_SLOTS).cloned().collect();
    }

    fn dispatch(&mut self, kernel: Kernel, groups: UVec3) {
        let needs_volume = matches!(
            kernel,
            Kernel::ClearVoxels | Kernel::UpdateVoxels | Kernel::VisualizeTopDown
        );
        let needs_output = !matches!(kernel, Kernel::ClearVoxels | Kernel::UpdateVoxels);
        if (needs_volume && self.volume.is_empty()) || (needs_output && self.output.is_empty()) {
            return;
        }
        self.dispatches += 1;
        match kernel {
            Kernel::ClearVoxels => self.run_clear(groups),
            Kernel::UpdateVoxels => self.run_update(groups),
            Kernel::VisualizeTopDown => self.run_visualize(groups),
            Kernel::FuseDepth => self.run_fuse_depth(groups),
            Kernel::TestPattern => self.run_test_pattern(groups),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{CameraSlots, groups_2d, groups_3d};
    use arena_common::Pose;
    use arena_common::config::FusionConfig;

    fn uniforms(cameras: &[Pose], objects: &[Vec3], dt: f32) -> (FusionUniforms, ObjectSlots) {
        let objects = ObjectSlots::pack(objects);
        let mut u = FusionUniforms::from_config(&FusionConfig::default())
            .with_cameras(&CameraSlots::pack(cameras))
            .with_objects(&objects);
        u.delta_time = dt;
        (u, objects)
    }

    fn overhead() -> Pose {
        Pose::looking_at(Vec3::new(0.0, 3.0, 0.0), Vec3::ZERO)
    }

    #[test]
    fn unseen_voxel_only_decays() {
        let (u, objs) = uniforms(&[overhead()], &[], 1.0 / 60.0);
        // Behind the camera.
        let v = update_voxel(0.5, Vec3::new(0.0, 4.0, 0.0), &u, &objs.positions);
        assert!((v - 0.5 * 0.99).abs() < 1e-6);
    }

    #[test]
    fn seen_voxel_blends_towards_ambient() {
        let (u, objs) = uniforms(&[overhead()], &[], 1.0 / 60.0);
        let v = update_voxel(0.0, Vec3::new(0.0, 1.0, 0.0), &u, &objs.positions);
        assert!((v - 0.15 * 0.01).abs() < 1e-6);
    }

    #[test]
    fn occupied_voxel_uses_falloff() {
        let obj = Vec3::new(0.0, 1.0, 0.0);
        let (mut u, objs) = uniforms(&[overhead()], &[obj], 1.0 / 60.0);
        u.decay_rate = 1.0;
        let at_center = update_voxel(0.0, obj, &u, &objs.positions);
        assert!((at_center - 1.0).abs() < 1e-6);
        let halfway = update_voxel(0.0, obj + Vec3::new(0.175, 0.0, 0.0), &u, &objs.positions);
        assert!((halfway - 0.5).abs() < 1e-4);
    }

    #[test]
    fn visibility_is_fraction_of_cameras() {
        let away = Pose::looking_at(Vec3::new(0.0, 3.0, 0.0), Vec3::new(0.0, 6.0, 0.0));
        let (mut u, objs) = uniforms(&[overhead(), away], &[], 1.0 / 60.0);
        u.decay_rate = 1.0;
        u.ambient_weight = 1.0;
        let v = update_voxel(0.0, Vec3::new(0.0, 1.0, 0.0), &u, &objs.positions);
        assert!((v - 0.5).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_is_unseen() {
        let (mut u, objs) = uniforms(&[overhead()], &[], 1.0 / 60.0);
        u.decay_rate = 1.0;
        u.max_range = 1.0;
        assert_eq!(update_voxel(0.7, Vec3::new(0.0, 1.0, 0.0), &u, &objs.positions), 0.0);
    }

    #[test]
    fn zero_decay_integrates() {
        let (mut u, objs) = uniforms(&[overhead()], &[], 0.5);
        u.decay_rate = 0.0;
        u.ambient_weight = 1.0;
        let c = Vec3::new(0.0, 1.0, 0.0);
        let once = update_voxel(0.0, c, &u, &objs.positions);
        assert!((once - 0.5).abs() < 1e-6);
        assert_eq!(update_voxel(once, c, &u, &objs.positions), 1.0);
    }

    #[test]
    fn zero_dt_keeps_value() {
        let (u, objs) = uniforms(&[overhead()], &[], 0.0);
        assert_eq!(update_voxel(0.3, Vec3::new(0.0, 1.0, 0.0), &u, &objs.positions), 0.3);
    }

    #[test]
    fn sentinel_slots_never_register_coverage() {
        // A voxel right in front of the camera sentinel (origin, looking +Z).
        let probe = Vec3::new(0.0, 0.0, 0.5);
        let (mut u, objs) = uniforms(&[], &[], 1.0 / 60.0);
        u.decay_rate = 1.0;
        u.ambient_weight = 1.0;
        assert_eq!(update_voxel(0.0, probe, &u, &objs.positions), 0.0);

        // Object sentinels are counted only up to num_objects, and are far anyway.
        let (mut u, objs) = uniforms(&[overhead()], &[], 1.0 / 60.0);
        u.decay_rate = 1.0;
        u.ambient_weight = 0.0;
        u.num_objects = MAX_OBJECTS as u32;
        assert_eq!(update_voxel(0.0, Vec3::new(0.0, 1.0, 0.0), &u, &objs.positions), 0.0);
    }

    #[test]
    fn depth_pixel_coverage_and_nearness() {
        let mut d = [f32::INFINITY; DEPTH_SLOTS];
        d[0] = 1.0;
        d[1] = 3.0;
        d[2] = 9.0;
        // Slot 3 is a filler beyond num_cameras and must be ignored.
        d[3] = 0.5;
        let px = fuse_depth_pixel(&d, 3, 4.0);
        assert_eq!(px[0], 170);
        assert_eq!(px[1], 191);
        assert_eq!(px[3], 255);
        assert_eq!(fuse_depth_pixel(&d, 0, 4.0)[0], 0);
    }

    #[test]
    fn colors_are_monotone_in_heat() {
        let cold = top_down_color(0.0);
        let hot = top_down_color(1.0);
        assert!(hot[0] > cold[0]);
        assert_eq!(top_down_color(7.0), hot);
        assert_eq!(cold[3], 255);
    }

    #[test]
    fn cpu_backend_clear_update_visualize() {
        let cfg = FusionConfig {
            resolution: UVec3::new(8, 4, 8),
            output_resolution: UVec2::new(16, 16),
            object_radius: 1.0,
            ..Default::default()
        };
        let mut b = CpuFusionBackend::new();
        b.allocate(cfg.resolution, cfg.output_resolution);
        assert!(b.has_resource(Resource::Volume) && b.has_resource(Resource::Output));
        assert!(!b.has_resource(Resource::DepthSlots));

        let player = Vec3::new(0.0, 0.9, 0.0);
        let objects = ObjectSlots::pack(&[player]);
        let mut u = FusionUniforms::from_config(&cfg)
            .with_cameras(&CameraSlots::pack(&[overhead()]))
            .with_objects(&objects);
        u.delta_time = 1.0 / 60.0;
        u.decay_rate = 1.0;
        b.write_uniforms(&u);
        b.write_objects(&objects);
        b.dispatch(Kernel::ClearVoxels, groups_3d(cfg.resolution));
        b.dispatch(Kernel::UpdateVoxels, groups_3d(cfg.resolution));
        b.dispatch(Kernel::VisualizeTopDown, groups_2d(cfg.output_resolution));
        assert_eq!(b.dispatch_count(), 3);

        // The column under the player is the hottest in the image.
        let centre = b.pixel(8, 8).unwrap();
        let corner = b.pixel(0, 0).unwrap();
        assert!(centre[0] > corner[0], "{centre:?} vs {corner:?}");
        assert!(b.volume().iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(b.value(UVec3::new(8, 0, 0)).is_none());
    }

    #[test]
    fn partial_groups_leave_remaining_texels() {
        let mut b = CpuFusionBackend::new();
        b.allocate(UVec3::new(16, 8, 8), UVec2::new(8, 8));
        let mut u = FusionUniforms::from_config(&FusionConfig::default());
        u.resolution = [16, 8, 8];
        u.ambient_weight = 1.0;
        u.decay_rate = 1.0;
        u.delta_time = 1.0;
        u = u.with_cameras(&CameraSlots::pack(&[Pose::looking_at(
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::ZERO,
        )]));
        u.cos_half_fov = -1.0;
        u.max_range = 100.0;
        b.write_uniforms(&u);
        b.dispatch(Kernel::UpdateVoxels, UVec3::new(1, 1, 1));
        assert_eq!(b.value(UVec3::new(7, 7, 7)), Some(1.0));
        assert_eq!(b.value(UVec3::new(8, 0, 0)), Some(0.0));
    }

    #[test]
    fn fuse_depth_reads_bound_images() {
        let mut b = CpuFusionBackend::new();
        b.allocate(UVec3::ONE, UVec2::new(4, 4));
        b.bind_depth_images(&[DepthImage::empty(2, 2)]);
        let mut u = FusionUniforms::from_config(&FusionConfig::default());
        u.num_cameras = 1;
        u.output_size = [4, 4];
        b.write_uniforms(&u);
        b.dispatch(Kernel::FuseDepth, groups_2d(UVec2::new(4, 4)));
        // Nothing within range: zero coverage everywhere.
        assert!(b.output().iter().all(|p| p[0] == 0));
    }

    #[test]
    fn test_pattern_fills_output() {
        let mut b = CpuFusionBackend::new();
        b.allocate(UVec3::ONE, UVec2::new(8, 8));
        b.dispatch(Kernel::TestPattern, groups_2d(UVec2::new(8, 8)));
        assert_eq!(b.pixel(0, 0).unwrap()[0], 0);
        assert!(b.pixel(7, 0).unwrap()[0] > 200);
        assert!(b.output().iter().all(|p| p[3] == 255));
    }
}
