use std::ops::AddAssign;

use arena_common::config::{SampleMode, SamplerConfig};
use arena_grid::VoxelGrid;
use arena_scene::{LayerMask, RayCaster};
use glam::UVec2;

use crate::camera::ViewportCamera;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SamplerError {
    #[error("invalid sampling resolution {width}x{height}: both sizes must be positive")]
    InvalidResolution { width: u32, height: u32 },
}

/// What one or more sampling steps did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Ray evaluations performed.
    pub rays: usize,
    /// Rays that hit scene geometry.
    pub hits: usize,
    /// Points that landed inside the grid and were counted.
    pub recorded: usize,
}

impl AddAssign for StepStats {
    fn add_assign(&mut self, rhs: Self) {
        self.rays += rhs.rays;
        self.hits += rhs.hits;
        self.recorded += rhs.recorded;
    }
}

/// Incremental row-major scan of a camera viewport.
///
/// Each step evaluates a fixed budget of rays starting at the cursor and
/// leaves the cursor where it stopped, so a full pass is spread over
/// [`Sampler::full_pass_steps`] steps. The cursor wraps to `(0, 0)` after the
/// last cell, mid-step if needed.
#[derive(Debug, Clone)]
pub struct Sampler {
    width: u32,
    height: u32,
    samples_per_frame: u32,
    max_distance: f32,
    mask: LayerMask,
    mode: SampleMode,
    cursor: UVec2,
}

impl Sampler {
    pub fn new(config: &SamplerConfig) -> Result<Self, SamplerError> {
        if config.sample_width == 0 || config.sample_height == 0 {
            return Err(SamplerError::InvalidResolution {
                width: config.sample_width,
                height: config.sample_height,
            });
        }
        Ok(Self {
            width: config.sample_width,
            height: config.sample_height,
            samples_per_frame: config.samples_per_frame,
            max_distance: config.max_distance,
            mask: LayerMask(config.layer_mask),
            mode: config.mode,
            cursor: UVec2::ZERO,
        })
    }

    pub fn resolution(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn mode(&self) -> SampleMode {
        self.mode
    }

    /// Next viewport cell to be sampled.
    pub fn cursor(&self) -> UVec2 {
        self.cursor
    }

    /// Rays evaluated per step; never zero.
    pub fn budget(&self) -> usize {
        self.samples_per_frame.max(1) as usize
    }

    pub fn samples_per_pass(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Steps needed to cover every cell once.
    pub fn full_pass_steps(&self) -> usize {
        self.samples_per_pass().div_ceil(self.budget())
    }

    /// Restart the scan at `(0, 0)`. The grid is not touched.
    pub fn reset(&mut self) {
        self.cursor = UVec2::ZERO;
    }

    /// Evaluate one budget of rays and record the resulting points in `grid`.
    pub fn sample_step<C, S>(&mut self, camera: &C, scene: &S, grid: &mut VoxelGrid) -> StepStats
    where
        C: ViewportCamera + ?Sized,
        S: RayCaster + ?Sized,
    {
        let range = self.max_distance.min(camera.far_clip());
        let mut stats = StepStats::default();

        for _ in 0..self.budget() {
            let u = (self.cursor.x as f32 + 0.5) / self.width as f32;
            let v = (self.cursor.y as f32 + 0.5) / self.height as f32;
            let ray = camera.viewport_to_ray(u, v);
            stats.rays += 1;

            let point = match self.mode {
                SampleMode::Raycast => scene.raycast(&ray, range, self.mask).map(|hit| {
                    stats.hits += 1;
                    hit.point
                }),
                SampleMode::ApproximateDepth => Some(ray.at(range)),
            };
            if let Some(p) = point {
                if grid.add_hit(p, 1) {
                    stats.recorded += 1;
                }
            }
            self.advance();
        }

        tracing::trace!(
            rays = stats.rays,
            hits = stats.hits,
            recorded = stats.recorded,
            cursor = ?self.cursor,
            "sample step"
        );
        stats
    }

    fn advance(&mut self) {
        self.cursor.x += 1;
        if self.cursor.x >= self.width {
            self.cursor.x = 0;
            self.cursor.y += 1;
            if self.cursor.y >= self.height {
                self.cursor.y = 0;
            }
        }
    }
}
