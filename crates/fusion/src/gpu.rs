use std::collections::BTreeMap;
use std::sync::Arc;

use arena_sampler::DepthImage;
use glam::{UVec2, UVec3};
use wgpu::util::DeviceExt;

use crate::backend::{ComputeBackend, Kernel, Resource};
use crate::depth::{DEPTH_SLOTS, DepthTarget, bind_slots};
use crate::layout::{FusionUniforms, MAX_OBJECTS, ObjectSlots, WORKGROUP_2D, WORKGROUP_3D};
use crate::shaders;

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Errors from setting up GPU fusion.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("fusion shader failed to compile: {0}")]
    ShaderCompilation(String),
    #[error("device limit {limit} is {available}, fusion kernels need {required}")]
    UnsupportedLimits {
        limit: &'static str,
        required: u32,
        available: u32,
    },
}

/// wgpu defaults raised to fit the fusion workgroups.
fn required_limits() -> wgpu::Limits {
    let base = wgpu::Limits::default();
    let largest = WORKGROUP_3D.max(WORKGROUP_2D);
    let invocations = WORKGROUP_3D
        .element_product()
        .max(WORKGROUP_2D.element_product());
    wgpu::Limits {
        max_compute_invocations_per_workgroup: base
            .max_compute_invocations_per_workgroup
            .max(invocations),
        max_compute_workgroup_size_x: base.max_compute_workgroup_size_x.max(largest.x),
        max_compute_workgroup_size_y: base.max_compute_workgroup_size_y.max(largest.y),
        max_compute_workgroup_size_z: base.max_compute_workgroup_size_z.max(largest.z),
        ..base
    }
}

fn check_compute_limits(required: &wgpu::Limits, available: &wgpu::Limits) -> Result<(), FusionError> {
    let checks = [
        (
            "max_compute_invocations_per_workgroup",
            required.max_compute_invocations_per_workgroup,
            available.max_compute_invocations_per_workgroup,
        ),
        (
            "max_compute_workgroup_size_x",
            required.max_compute_workgroup_size_x,
            available.max_compute_workgroup_size_x,
        ),
        (
            "max_compute_workgroup_size_y",
            required.max_compute_workgroup_size_y,
            available.max_compute_workgroup_size_y,
        ),
        (
            "max_compute_workgroup_size_z",
            required.max_compute_workgroup_size_z,
            available.max_compute_workgroup_size_z,
        ),
    ];
    for (limit, required, available) in checks {
        if available < required {
            return Err(FusionError::UnsupportedLimits {
                limit,
                required,
                available,
            });
        }
    }
    Ok(())
}

/// Limits to request from `adapter` for a device that runs fusion.
///
/// The 8x8x8 volume kernels need 512 invocations per workgroup, above the
/// wgpu default of 256. Any device that fusion shares, including a window's
/// render device, must be requested with these limits.
pub fn fusion_limits(adapter: &wgpu::Limits) -> Result<wgpu::Limits, FusionError> {
    let required = required_limits();
    check_compute_limits(&required, adapter)?;
    Ok(required)
}

/// A device/queue pair shared between fusion and rendering.
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
}

impl GpuContext {
    /// Wrap a device created elsewhere, e.g. by a windowed app.
    pub fn from_parts(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, adapter_name: String) -> Self {
        Self {
            device,
            queue,
            adapter_name,
        }
    }

    /// Create a device with no surface, for tools and tests.
    pub fn headless() -> Result<Self, FusionError> {
        pollster::block_on(Self::headless_async())
    }

    async fn headless_async() -> Result<Self, FusionError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(FusionError::NoAdapter)?;
        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "headless GPU adapter");
        let limits = fusion_limits(&adapter.limits())?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("arena_fusion_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name: info.name,
        })
    }
}

struct BoundTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Fusion kernels on a wgpu device.
///
/// The coverage volume is double-buffered: the update kernel reads the front
/// texture and writes the back one, after which they swap. All kernels share
/// one bind group layout; unbound depth slots point at a 1x1 placeholder.
pub struct WgpuFusionBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    layout: wgpu::BindGroupLayout,
    pipelines: BTreeMap<Kernel, wgpu::ComputePipeline>,
    uniform_buffer: wgpu::Buffer,
    object_buffer: wgpu::Buffer,
    placeholder_depth: DepthTarget,
    depth_targets: Vec<DepthTarget>,
    volumes: Option<[BoundTexture; 2]>,
    output: Option<BoundTexture>,
    /// `bind_groups[k]` reads volume `k` and writes volume `1 - k`.
    bind_groups: Option<[wgpu::BindGroup; 2]>,
    front: usize,
    resolution: UVec3,
    output_size: UVec2,
    generation: u64,
}

impl WgpuFusionBackend {
    /// Compile the fusion shader and build one pipeline per kernel.
    ///
    /// A kernel whose pipeline fails validation is left out and reported
    /// through [`ComputeBackend::has_kernel`]; only a shader that fails to
    /// compile at all is an error, as is a device requested without
    /// [`fusion_limits`].
    pub fn new(ctx: &GpuContext) -> Result<Self, FusionError> {
        let device = ctx.device.clone();
        check_compute_limits(&required_limits(), &device.limits())?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fusion_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::FUSION_SHADER.into()),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(FusionError::ShaderCompilation(err.to_string()));
        }

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fusion_bind_group_layout"),
            entries: &layout_entries(),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fusion_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let mut pipelines = BTreeMap::new();
        for kernel in Kernel::ALL {
            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(kernel.name()),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(kernel.entry_point()),
                compilation_options: Default::default(),
                cache: None,
            });
            match pollster::block_on(device.pop_error_scope()) {
                None => {
                    pipelines.insert(kernel, pipeline);
                }
                Some(err) => {
                    tracing::warn!(kernel = %kernel, error = %err, "fusion kernel unavailable");
                }
            }
        }

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fusion_uniforms"),
            contents: bytemuck::bytes_of(&<FusionUniforms as bytemuck::Zeroable>::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let object_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fusion_objects"),
            contents: ObjectSlots::pack(&[]).as_bytes(),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let placeholder_depth = DepthTarget::create(&device, 1, 1);

        tracing::debug!(
            adapter = %ctx.adapter_name,
            kernels = pipelines.len(),
            "fusion backend ready"
        );

        Ok(Self {
            device,
            queue: ctx.queue.clone(),
            layout,
            pipelines,
            uniform_buffer,
            object_buffer,
            placeholder_depth,
            depth_targets: Vec::new(),
            volumes: None,
            output: None,
            bind_groups: None,
            front: 0,
            resolution: UVec3::ZERO,
            output_size: UVec2::ZERO,
            generation: 0,
        })
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// View of the RGBA output image, for display.
    pub fn output_view(&self) -> Option<&wgpu::TextureView> {
        self.output.as_ref().map(|o| &o.view)
    }

    /// Bumped whenever the output texture is recreated.
    pub fn output_generation(&self) -> u64 {
        self.generation
    }

    /// Destroy every texture. The backend stays usable after a new `allocate`.
    pub fn release(&mut self) {
        self.bind_groups = None;
        if let Some(volumes) = self.volumes.take() {
            for v in volumes {
                v.texture.destroy();
            }
        }
        if let Some(output) = self.output.take() {
            output.texture.destroy();
        }
        for target in self.depth_targets.drain(..) {
            target.texture.destroy();
        }
    }

    /// Copy the current volume back to the CPU, X fastest then Y then Z.
    ///
    /// Blocks until the GPU has finished all submitted work.
    pub fn read_volume(&self) -> Option<Vec<f32>> {
        let volumes = self.volumes.as_ref()?;
        let bytes = self.readback(&volumes[self.front].texture, self.resolution, 4)?;
        Some(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    /// Copy the output image back to the CPU, row-major.
    pub fn read_output(&self) -> Option<Vec<[u8; 4]>> {
        let output = self.output.as_ref()?;
        let bytes = self.readback(&output.texture, self.output_size.extend(1), 4)?;
        Some(bytes.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]).collect())
    }

    fn readback(&self, texture: &wgpu::Texture, extent: UVec3, texel_bytes: u32) -> Option<Vec<u8>> {
        let row_bytes = extent.x * texel_bytes;
        let padded_row = row_bytes.div_ceil(COPY_ALIGNMENT) * COPY_ALIGNMENT;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fusion_readback"),
            size: padded_row as u64 * extent.y as u64 * extent.z as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fusion_readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(extent.y),
                },
            },
            extent3d(extent),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "fusion readback map failed");
                return None;
            }
            Err(_) => {
                tracing::warn!("fusion readback callback dropped");
                return None;
            }
        }

        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity((row_bytes * extent.y * extent.z) as usize);
        for row in mapped.chunks_exact(padded_row as usize) {
            out.extend_from_slice(&row[..row_bytes as usize]);
        }
        drop(mapped);
        buffer.unmap();
        Some(out)
    }

    fn rebuild_bind_groups(&mut self) {
        let (Some(volumes), Some(output)) = (&self.volumes, &self.output) else {
            self.bind_groups = None;
            return;
        };
        let depth = bind_slots(&self.depth_targets).unwrap_or([&self.placeholder_depth; DEPTH_SLOTS]);
        let make = |read: usize| {
            let mut entries = vec![
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&volumes[read].view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&volumes[1 - read].view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.object_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&output.view),
                },
            ];
            for (slot, target) in depth.iter().enumerate() {
                entries.push(wgpu::BindGroupEntry {
                    binding: 5 + slot as u32,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                });
            }
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("fusion_bind_group"),
                layout: &self.layout,
                entries: &entries,
            })
        };
        self.bind_groups = Some([make(0), make(1)]);
    }
}

impl Drop for WgpuFusionBackend {
    fn drop(&mut self) {
        self.release();
    }
}

impl ComputeBackend for WgpuFusionBackend {
    fn label(&self) -> &'static str {
        "wgpu"
    }

    fn has_kernel(&self, kernel: Kernel) -> bool {
        self.pipelines.contains_key(&kernel)
    }

    fn has_resource(&self, resource: Resource) -> bool {
        match resource {
            Resource::Volume => self.volumes.is_some(),
            Resource::Output => self.output.is_some(),
            Resource::DepthSlots => !self.depth_targets.is_empty(),
        }
    }

    fn allocate(&mut self, resolution: UVec3, output_size: UVec2) {
        self.bind_groups = None;
        if let Some(volumes) = self.volumes.take() {
            for v in volumes {
                v.texture.destroy();
            }
        }
        if let Some(output) = self.output.take() {
            output.texture.destroy();
        }

        let resolution = resolution.max(UVec3::ONE);
        let output_size = output_size.max(UVec2::ONE);
        let volume = |label: &'static str| {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: extent3d(resolution),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D3,
                format: wgpu::TextureFormat::R32Float,
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&Default::default());
            BoundTexture { texture, view }
        };
        self.volumes = Some([volume("coverage_volume_a"), volume("coverage_volume_b")]);

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("fusion_output"),
            size: extent3d(output_size.extend(1)),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());
        self.output = Some(BoundTexture { texture, view });

        self.front = 0;
        self.resolution = resolution;
        self.output_size = output_size;
        self.generation += 1;
        self.rebuild_bind_groups();
        tracing::debug!(?resolution, ?output_size, "fusion textures allocated");
    }

    fn write_uniforms(&mut self, uniforms: &FusionUniforms) {
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    fn write_objects(&mut self, objects: &ObjectSlots) {
        debug_assert_eq!(objects.positions.len(), MAX_OBJECTS);
        self.queue
            .write_buffer(&self.object_buffer, 0, objects.as_bytes());
    }

    fn bind_depth_images(&mut self, images: &[DepthImage]) {
        let images = &images[..images.len().min(DEPTH_SLOTS)];
        let reusable = self.depth_targets.len() == images.len()
            && self
                .depth_targets
                .iter()
                .zip(images)
                .all(|(t, i)| t.width == i.width().max(1) && t.height == i.height().max(1));
        if !reusable {
            for target in self.depth_targets.drain(..) {
                target.texture.destroy();
            }
            self.depth_targets = images
                .iter()
                .map(|i| DepthTarget::create(&self.device, i.width(), i.height()))
                .collect();
            self.rebuild_bind_groups();
        }
        for (target, image) in self.depth_targets.iter().zip(images) {
            target.upload(&self.queue, image);
        }
    }

    fn dispatch(&mut self, kernel: Kernel, groups: UVec3) {
        let (Some(pipeline), Some(bind_groups)) = (self.pipelines.get(&kernel), &self.bind_groups)
        else {
            return;
        };
        let group = match kernel {
            // Clearing writes the front volume, so bind the group that writes it.
            Kernel::ClearVoxels => &bind_groups[1 - self.front],
            _ => &bind_groups[self.front],
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(kernel.name()),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, group, &[]);
            pass.dispatch_workgroups(groups.x, groups.y, groups.z);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if kernel == Kernel::UpdateVoxels {
            self.front = 1 - self.front;
        }
    }
}

fn extent3d(size: UVec3) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.x,
        height: size.y,
        depth_or_array_layers: size.z,
    }
}

fn layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let compute = wgpu::ShaderStages::COMPUTE;
    let sampled = |binding, view_dimension| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: compute,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension,
            multisampled: false,
        },
        count: None,
    };
    let storage = |binding, format, view_dimension| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: compute,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension,
        },
        count: None,
    };

    let mut entries = vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: compute,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        sampled(1, wgpu::TextureViewDimension::D3),
        storage(2, wgpu::TextureFormat::R32Float, wgpu::TextureViewDimension::D3),
        wgpu::BindGroupLayoutEntry {
            binding: 3,
            visibility: compute,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        storage(4, wgpu::TextureFormat::Rgba8Unorm, wgpu::TextureViewDimension::D2),
    ];
    for slot in 0..DEPTH_SLOTS as u32 {
        entries.push(sampled(5 + slot, wgpu::TextureViewDimension::D2));
    }
    entries
}
