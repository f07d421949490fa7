use arena_scene::{LayerMask, RayCaster};

use crate::camera::ViewportCamera;

/// Single-channel linear depth image, one ray per pixel.
///
/// Row 0 is the bottom edge of the viewport, matching the sampler's `v`.
/// Depth is the distance along the pixel ray from the near plane; pixels
/// whose ray hits nothing within the far clip hold `f32::INFINITY`.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    width: u32,
    height: u32,
    depths: Vec<f32>,
}

impl DepthImage {
    /// Image filled with "no hit".
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depths: vec![f32::INFINITY; width as usize * height as usize],
        }
    }

    /// Render `scene` through `camera` at `width x height`.
    pub fn capture<C, S>(camera: &C, scene: &S, width: u32, height: u32, mask: LayerMask) -> Self
    where
        C: ViewportCamera + ?Sized,
        S: RayCaster + ?Sized,
    {
        let mut image = Self::empty(width, height);
        let far = camera.far_clip();
        for y in 0..height {
            let v = (y as f32 + 0.5) / height as f32;
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                let ray = camera.viewport_to_ray(u, v);
                if let Some(hit) = scene.raycast(&ray, far, mask) {
                    image.depths[(x + width * y) as usize] = hit.distance;
                }
            }
        }
        tracing::trace!(width, height, coverage = image.coverage(), "depth captured");
        image
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Depth at pixel `(x, y)`; `None` outside the image.
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.depths.get((x + self.width * y) as usize).copied()
    }

    /// Row-major texel data, ready for an R32Float upload.
    pub fn as_slice(&self) -> &[f32] {
        &self.depths
    }

    /// Fraction of pixels that hit something.
    pub fn coverage(&self) -> f32 {
        if self.depths.is_empty() {
            return 0.0;
        }
        let hits = self.depths.iter().filter(|d| d.is_finite()).count();
        hits as f32 / self.depths.len() as f32
    }

    /// Nearest finite depth, if any pixel hit.
    pub fn min_depth(&self) -> Option<f32> {
        self.depths
            .iter()
            .copied()
            .filter(|d| d.is_finite())
            .min_by(f32::total_cmp)
    }
}
