use glam::{IVec3, Vec3};

/// Most instance transforms a single instanced draw may carry.
pub const INSTANCE_BATCH_LIMIT: usize = 1023;

/// A voxel that passed the display threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelVisual {
    pub indices: IVec3,
    pub center: Vec3,
    pub count: u32,
    /// `count / reference_max`, clamped to `[0, 1]`.
    pub weight: f32,
}

impl VoxelVisual {
    pub fn weight_for(count: u32, reference_max: f32) -> f32 {
        if reference_max <= 0.0 {
            return 1.0;
        }
        (count as f32 / reference_max).clamp(0.0, 1.0)
    }
}

/// Solid debug cube.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GizmoCube {
    pub center: Vec3,
    pub size: f32,
    pub color: [f32; 4],
}

/// Yellow at weight 0, red at weight 1.
pub fn gizmo_color(weight: f32) -> [f32; 4] {
    [1.0, 1.0 - weight.clamp(0.0, 1.0), 0.0, 1.0]
}

/// Split `items` into consecutive draw batches of at most `limit` elements.
///
/// A `limit` of zero is treated as one.
pub fn batches<T>(items: &[T], limit: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(limit.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_is_clamped() {
        assert_eq!(VoxelVisual::weight_for(0, 4.0), 0.0);
        assert_eq!(VoxelVisual::weight_for(2, 4.0), 0.5);
        assert_eq!(VoxelVisual::weight_for(40, 4.0), 1.0);
        assert_eq!(VoxelVisual::weight_for(1, 0.0), 1.0);
    }

    #[test]
    fn colors_run_yellow_to_red() {
        assert_eq!(gizmo_color(0.0), [1.0, 1.0, 0.0, 1.0]);
        assert_eq!(gizmo_color(0.5), [1.0, 0.5, 0.0, 1.0]);
        assert_eq!(gizmo_color(3.0), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn batch_sizes() {
        let items: Vec<u32> = (0..2500).collect();
        let sizes: Vec<usize> = batches(&items, INSTANCE_BATCH_LIMIT).map(<[u32]>::len).collect();
        assert_eq!(sizes, vec![1023, 1023, 454]);

        let exact: Vec<u32> = (0..1023).collect();
        assert_eq!(batches(&exact, INSTANCE_BATCH_LIMIT).count(), 1);
        assert_eq!(batches::<u32>(&[], INSTANCE_BATCH_LIMIT).count(), 0);
        assert_eq!(batches(&items[..3], 0).count(), 3);
    }
}
