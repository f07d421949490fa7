//! GPU coverage fusion.
//!
//! Camera transforms and tracked-object positions are packed into fixed-size
//! slot arrays and handed to a compute backend that decays and refreshes a 3D
//! coverage volume, then renders it top-down into an RGBA image. A second
//! variant fuses up to eight raw depth images into one 2D image.
//!
//! [`FusionPass`] owns the per-frame protocol and is backend-agnostic; the
//! wgpu implementation lives in [`WgpuFusionBackend`] and a CPU mirror of the
//! kernels in [`CpuFusionBackend`].
//!
//! # Invariants
//! - Slot counts handed to kernels never exceed [`MAX_CAMERAS`] / [`MAX_OBJECTS`].
//! - Unused slots hold inert sentinels.
//! - A frame with a missing kernel or resource does no work at all.
//! - Volume values stay in `[0, 1]`.

mod backend;
mod depth;
mod gpu;
mod layout;
mod pass;
mod reference;
mod shaders;

pub use backend::{ComputeBackend, Kernel, Resource};
pub use depth::{DEPTH_SLOTS, DepthTarget, bind_slots};
pub use gpu::{FusionError, GpuContext, WgpuFusionBackend, fusion_limits};
pub use layout::{
    CAMERA_SENTINEL_FORWARD, CAMERA_SENTINEL_POSITION, CameraSlots, FusionUniforms, MAX_CAMERAS,
    MAX_OBJECTS, OBJECT_SENTINEL, ObjectSlots, WORKGROUP_2D, WORKGROUP_3D, groups_2d, groups_3d,
};
pub use pass::{FusionFrame, FusionPass};
pub use reference::{CpuFusionBackend, fuse_depth_pixel, top_down_color, update_voxel};
