use arena_common::Pose;
use arena_common::config::FusionConfig;
use bytemuck::{Pod, Zeroable};
use glam::{UVec2, UVec3, Vec3};

/// Camera slots in the update kernel.
pub const MAX_CAMERAS: usize = 8;
/// Tracked-object slots in the update kernel.
pub const MAX_OBJECTS: usize = 100;

pub const CAMERA_SENTINEL_POSITION: Vec3 = Vec3::ZERO;
pub const CAMERA_SENTINEL_FORWARD: Vec3 = Vec3::Z;
/// Far outside any arena, so it never contributes occupancy.
pub const OBJECT_SENTINEL: Vec3 = Vec3::splat(9999.0);

/// Workgroup size of the volume kernels.
pub const WORKGROUP_3D: UVec3 = UVec3::new(8, 8, 8);
/// Workgroup size of the image kernels.
pub const WORKGROUP_2D: UVec3 = UVec3::new(8, 8, 1);

/// Workgroups covering a volume of `resolution` texels.
pub fn groups_3d(resolution: UVec3) -> UVec3 {
    UVec3::new(
        resolution.x.div_ceil(WORKGROUP_3D.x),
        resolution.y.div_ceil(WORKGROUP_3D.y),
        resolution.z.div_ceil(WORKGROUP_3D.z),
    )
}

/// Workgroups covering an image of `size` pixels.
pub fn groups_2d(size: UVec2) -> UVec3 {
    UVec3::new(
        size.x.div_ceil(WORKGROUP_2D.x),
        size.y.div_ceil(WORKGROUP_2D.y),
        1,
    )
}

/// Camera positions and forwards, padded to [`MAX_CAMERAS`] with sentinels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSlots {
    pub positions: [[f32; 4]; MAX_CAMERAS],
    pub forwards: [[f32; 4]; MAX_CAMERAS],
    /// Live slots, `min(cameras, MAX_CAMERAS)`.
    pub active: u32,
    /// Cameras that did not fit.
    pub dropped: usize,
}

impl CameraSlots {
    pub fn pack(cameras: &[Pose]) -> Self {
        let mut positions = [CAMERA_SENTINEL_POSITION.extend(0.0).to_array(); MAX_CAMERAS];
        let mut forwards = [CAMERA_SENTINEL_FORWARD.extend(0.0).to_array(); MAX_CAMERAS];
        for (slot, pose) in cameras.iter().take(MAX_CAMERAS).enumerate() {
            positions[slot] = pose.position.extend(1.0).to_array();
            forwards[slot] = pose.forward().extend(0.0).to_array();
        }
        let active = cameras.len().min(MAX_CAMERAS);
        Self {
            positions,
            forwards,
            active: active as u32,
            dropped: cameras.len() - active,
        }
    }
}

/// Tracked-object positions, padded to [`MAX_OBJECTS`] with [`OBJECT_SENTINEL`].
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSlots {
    pub positions: Vec<[f32; 4]>,
    pub active: u32,
    pub dropped: usize,
}

impl ObjectSlots {
    pub fn pack(objects: &[Vec3]) -> Self {
        let mut positions = vec![OBJECT_SENTINEL.extend(0.0).to_array(); MAX_OBJECTS];
        for (slot, p) in objects.iter().take(MAX_OBJECTS).enumerate() {
            positions[slot] = p.extend(1.0).to_array();
        }
        let active = objects.len().min(MAX_OBJECTS);
        Self {
            positions,
            active: active as u32,
            dropped: objects.len() - active,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }
}

/// Uniform block shared by every fusion kernel.
///
/// Field order matches the `Params` struct in the WGSL source; vec3 members
/// are followed by a scalar that fills their 16-byte slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FusionUniforms {
    pub grid_min: [f32; 3],
    pub num_cameras: u32,
    pub grid_max: [f32; 3],
    pub num_objects: u32,
    pub resolution: [u32; 3],
    pub decay_rate: f32,
    pub output_size: [u32; 2],
    pub delta_time: f32,
    pub cos_half_fov: f32,
    pub max_range: f32,
    pub object_radius: f32,
    pub ambient_weight: f32,
    /// Seconds, for the diagnostic pattern kernel.
    pub time: f32,
    pub camera_positions: [[f32; 4]; MAX_CAMERAS],
    pub camera_forwards: [[f32; 4]; MAX_CAMERAS],
}

impl FusionUniforms {
    /// Uniforms for `config` with no cameras or objects.
    pub fn from_config(config: &FusionConfig) -> Self {
        let empty = CameraSlots::pack(&[]);
        Self {
            grid_min: config.grid_min.to_array(),
            num_cameras: 0,
            grid_max: config.grid_max.to_array(),
            num_objects: 0,
            resolution: config.resolution.to_array(),
            decay_rate: if config.enable_persistence {
                config.decay_rate.clamp(0.0, 1.0)
            } else {
                1.0
            },
            output_size: config.output_resolution.to_array(),
            delta_time: 0.0,
            cos_half_fov: config.half_fov_degrees.to_radians().cos(),
            max_range: config.max_range,
            object_radius: config.object_radius,
            ambient_weight: config.ambient_weight,
            time: 0.0,
            camera_positions: empty.positions,
            camera_forwards: empty.forwards,
        }
    }

    pub fn with_cameras(mut self, slots: &CameraSlots) -> Self {
        self.camera_positions = slots.positions;
        self.camera_forwards = slots.forwards;
        self.num_cameras = slots.active;
        self
    }

    pub fn with_objects(mut self, slots: &ObjectSlots) -> Self {
        self.num_objects = slots.active;
        self
    }

    /// World-space centre of volume texel `id`.
    pub fn voxel_center(&self, id: UVec3) -> Vec3 {
        let min = Vec3::from_array(self.grid_min);
        let max = Vec3::from_array(self.grid_max);
        let res = UVec3::from_array(self.resolution).max(UVec3::ONE).as_vec3();
        min + (id.as_vec3() + Vec3::splat(0.5)) * (max - min) / res
    }
}
