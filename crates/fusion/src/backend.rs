use std::fmt;

use arena_sampler::DepthImage;
use glam::{UVec2, UVec3};

use crate::layout::{FusionUniforms, ObjectSlots, WORKGROUP_2D, WORKGROUP_3D};

/// Compute kernels of the fusion shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kernel {
    /// Zero the coverage volume.
    ClearVoxels,
    /// Decay and refresh every volume texel from cameras and objects.
    UpdateVoxels,
    /// Column-max projection of the volume into the output image.
    VisualizeTopDown,
    /// Combine up to eight depth images into the output image.
    FuseDepth,
    /// Animated diagnostic pattern in the output image.
    TestPattern,
}

impl Kernel {
    pub const ALL: [Kernel; 5] = [
        Kernel::ClearVoxels,
        Kernel::UpdateVoxels,
        Kernel::VisualizeTopDown,
        Kernel::FuseDepth,
        Kernel::TestPattern,
    ];

    /// Name used in logs and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Kernel::ClearVoxels => "ClearVoxels",
            Kernel::UpdateVoxels => "UpdateVoxels",
            Kernel::VisualizeTopDown => "VisualizeTopDown",
            Kernel::FuseDepth => "FuseDepth",
            Kernel::TestPattern => "TestPattern",
        }
    }

    /// WGSL entry point.
    pub fn entry_point(self) -> &'static str {
        match self {
            Kernel::ClearVoxels => "clear_voxels",
            Kernel::UpdateVoxels => "update_voxels",
            Kernel::VisualizeTopDown => "visualize_top_down",
            Kernel::FuseDepth => "fuse_depth",
            Kernel::TestPattern => "test_pattern",
        }
    }

    pub fn workgroup_size(self) -> UVec3 {
        match self {
            Kernel::ClearVoxels | Kernel::UpdateVoxels => WORKGROUP_3D,
            _ => WORKGROUP_2D,
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resources a kernel may need bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    /// The 3D coverage volume.
    Volume,
    /// The 2D RGBA output image.
    Output,
    /// Eight depth images bound for [`Kernel::FuseDepth`].
    DepthSlots,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Volume => "coverage volume",
            Resource::Output => "output image",
            Resource::DepthSlots => "depth textures",
        })
    }
}

/// Where fusion kernels run.
///
/// Backends own their textures and buffers. Uploads take effect for every
/// dispatch that follows; dispatches are enqueued, not awaited.
pub trait ComputeBackend {
    fn label(&self) -> &'static str;

    fn has_kernel(&self, kernel: Kernel) -> bool;

    fn has_resource(&self, resource: Resource) -> bool;

    /// (Re)create the volume and output image. Prior contents are lost.
    fn allocate(&mut self, resolution: UVec3, output_size: UVec2);

    fn write_uniforms(&mut self, uniforms: &FusionUniforms);

    fn write_objects(&mut self, objects: &ObjectSlots);

    /// Bind depth images for [`Kernel::FuseDepth`]; only the first
    /// [`DEPTH_SLOTS`](crate::DEPTH_SLOTS) are used.
    fn bind_depth_images(&mut self, images: &[DepthImage]);

    fn dispatch(&mut self, kernel: Kernel, groups: UVec3);
}

impl<B: ComputeBackend + ?Sized> ComputeBackend for Box<B> {
    fn label(&self) -> &'static str {
        (**self).label()
    }

    fn has_kernel(&self, kernel: Kernel) -> bool {
        (**self).has_kernel(kernel)
    }

    fn has_resource(&self, resource: Resource) -> bool {
        (**self).has_resource(resource)
    }

    fn allocate(&mut self, resolution: UVec3, output_size: UVec2) {
        (**self).allocate(resolution, output_size)
    }

    fn write_uniforms(&mut self, uniforms: &FusionUniforms) {
        (**self).write_uniforms(uniforms)
    }

    fn write_objects(&mut self, objects: &ObjectSlots) {
        (**self).write_objects(objects)
    }

    fn bind_depth_images(&mut self, images: &[DepthImage]) {
        (**self).bind_depth_images(images)
    }

    fn dispatch(&mut self, kernel: Kernel, groups: UVec3) {
        (**self).dispatch(kernel, groups)
    }
}
