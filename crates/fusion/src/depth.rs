use arena_sampler::DepthImage;

/// Depth texture slots in the depth-fusion kernel.
pub const DEPTH_SLOTS: usize = 8;

/// Fill all [`DEPTH_SLOTS`] bindings from `items`.
///
/// Slots past `items.len()` repeat the first item so every binding is valid;
/// the kernel only reads the first `num_cameras` of them. Returns `None` when
/// there is nothing to bind.
pub fn bind_slots<T>(items: &[T]) -> Option<[&T; DEPTH_SLOTS]> {
    let first = items.first()?;
    Some(std::array::from_fn(|i| items.get(i).unwrap_or(first)))
}

/// A single-channel float texture holding one camera's depth image.
pub struct DepthTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl DepthTarget {
    pub fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Upload `image`. Mismatched sizes are logged and skipped.
    pub fn upload(&self, queue: &wgpu::Queue, image: &DepthImage) {
        if image.width() != self.width || image.height() != self.height {
            tracing::warn!(
                target_size = ?(self.width, self.height),
                image_size = ?(image.width(), image.height()),
                "depth image size mismatch, upload skipped"
            );
            return;
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(image.as_slice()),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.width),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_repeat_first_item() {
        let items = ["a", "b", "c"];
        let slots = bind_slots(&items).unwrap();
        assert_eq!(*slots[0], "a");
        assert_eq!(*slots[2], "c");
        assert!(slots[3..].iter().all(|s| **s == "a"));
    }

    #[test]
    fn slots_truncate_extra_items() {
        let items: Vec<u32> = (0..12).collect();
        let slots = bind_slots(&items).unwrap();
        assert_eq!(*slots[7], 7);
    }

    #[test]
    fn no_items_no_slots() {
        assert!(bind_slots::<u32>(&[]).is_none());
    }
}
