use arena_common::config::{GridAnchor, GridConfig};
use glam::{IVec3, Vec3};

/// Errors from grid configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("invalid grid dimensions {0}: every size must be positive")]
    InvalidDimension(IVec3),
    #[error("invalid voxel size {0}: must be positive and finite")]
    InvalidVoxelSize(f32),
}

/// Dense 3D grid of hit counts.
///
/// `origin` is the minimum corner; axes are aligned with world axes.
/// Starts unallocated: call [`VoxelGrid::allocate`] (or [`VoxelGrid::clear`],
/// which allocates on demand) before sampling. Reads on an unallocated grid
/// return zero and writes are dropped.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    origin: Vec3,
    dims: IVec3,
    voxel_size: f32,
    counts: Vec<u32>,
}

impl VoxelGrid {
    /// Describe a grid without allocating it.
    pub fn new(origin: Vec3, dims: IVec3, voxel_size: f32) -> Self {
        Self {
            origin,
            dims,
            voxel_size,
            counts: Vec::new(),
        }
    }

    /// Build and allocate a grid from configuration.
    pub fn from_config(config: &GridConfig) -> Result<Self, GridError> {
        let mut grid = Self::new(Vec3::ZERO, config.size, config.voxel_size);
        match config.anchor {
            GridAnchor::Origin { origin } => grid.set_origin(origin),
            GridAnchor::GroundCentered { center } => grid.center_on_ground(center),
        }
        grid.allocate()?;
        Ok(grid)
    }

    /// (Re)create the count buffer for the current dimensions, zeroed.
    pub fn allocate(&mut self) -> Result<(), GridError> {
        if self.dims.min_element() <= 0 {
            return Err(GridError::InvalidDimension(self.dims));
        }
        if !(self.voxel_size.is_finite() && self.voxel_size > 0.0) {
            return Err(GridError::InvalidVoxelSize(self.voxel_size));
        }
        let len = self.dims.x as usize * self.dims.y as usize * self.dims.z as usize;
        self.counts = vec![0; len];
        tracing::debug!(dims = ?self.dims, voxels = len, "voxel grid allocated");
        Ok(())
    }

    /// Reset every count to zero, allocating first if needed.
    pub fn clear(&mut self) -> Result<(), GridError> {
        if !self.is_allocated() {
            return self.allocate();
        }
        self.counts.fill(0);
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        !self.counts.is_empty()
    }

    /// Change dimensions and reallocate. Prior counts are discarded.
    ///
    /// On error the previous dimensions and counts are kept.
    pub fn set_dimensions(&mut self, dims: IVec3) -> Result<(), GridError> {
        let previous = std::mem::replace(&mut self.dims, dims);
        if let Err(e) = self.allocate() {
            self.dims = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    /// Place the grid centred on `center` in X/Z with its floor at y = 0.
    pub fn center_on_ground(&mut self, center: Vec3) {
        let size = self.world_size();
        self.origin = Vec3::new(center.x - size.x / 2.0, 0.0, center.z - size.z / 2.0);
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn dimensions(&self) -> IVec3 {
        self.dims
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    /// Number of voxels (zero before allocation).
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Extent of the grid in world units.
    pub fn world_size(&self) -> Vec3 {
        self.dims.as_vec3() * self.voxel_size
    }

    /// Minimum and maximum corners in world space.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        (self.origin, self.origin + self.world_size())
    }

    /// Map a world position to voxel indices, or `None` when outside the grid.
    pub fn world_to_indices(&self, pos: Vec3) -> Option<IVec3> {
        if !pos.is_finite() {
            return None;
        }
        let idx = ((pos - self.origin) / self.voxel_size).floor().as_ivec3();
        self.in_range(idx).then_some(idx)
    }

    /// Record `increment` hits at `pos`. Returns `false` when `pos` is out of bounds.
    pub fn add_hit(&mut self, pos: Vec3, increment: u32) -> bool {
        let Some(idx) = self.world_to_indices(pos) else {
            return false;
        };
        match self.linear(idx).and_then(|i| self.counts.get_mut(i)) {
            Some(c) => {
                *c = c.saturating_add(increment);
                true
            }
            None => false,
        }
    }

    /// Count at voxel `idx`; zero for any out-of-range index.
    pub fn count(&self, idx: IVec3) -> u32 {
        self.linear(idx)
            .and_then(|i| self.counts.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// Count of the voxel containing `pos`; zero outside the grid.
    pub fn count_at_world(&self, pos: Vec3) -> u32 {
        self.world_to_indices(pos).map_or(0, |idx| self.count(idx))
    }

    /// World-space centre of voxel `idx`. Defined for any index, in range or not.
    pub fn voxel_center_world(&self, idx: IVec3) -> Vec3 {
        self.origin + (idx.as_vec3() + Vec3::splat(0.5)) * self.voxel_size
    }

    /// Iterate `(indices, count)` over every voxel, X fastest.
    pub fn iter(&self) -> impl Iterator<Item = (IVec3, u32)> + '_ {
        let (sx, sy) = (self.dims.x.max(1), self.dims.y.max(1));
        self.counts.iter().enumerate().map(move |(i, &c)| {
            let i = i as i32;
            (IVec3::new(i % sx, (i / sx) % sy, i / (sx * sy)), c)
        })
    }

    /// Sum of all counts.
    pub fn total_hits(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// Number of voxels with at least one hit.
    pub fn occupied_voxels(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    pub fn max_count(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Order-sensitive FNV-1a digest of the counts, for change detection.
    pub fn checksum(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for c in &self.counts {
            for b in c.to_le_bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x0100_0000_01b3);
            }
        }
        h
    }

    fn in_range(&self, idx: IVec3) -> bool {
        idx.cmpge(IVec3::ZERO).all() && idx.cmplt(self.dims).all()
    }

    fn linear(&self, idx: IVec3) -> Option<usize> {
        if !self.in_range(idx) {
            return None;
        }
        let (sx, sy) = (self.dims.x as usize, self.dims.y as usize);
        Some(idx.x as usize + sx * (idx.y as usize + sy * idx.z as usize))
    }
}
