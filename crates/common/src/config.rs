//! Rig configuration.
//!
//! Every section carries `#[serde(default)]`, so a config file only needs the
//! keys it overrides. Files are YAML (`.yaml`/`.yml`) or JSON (`.json`).
//! Capacities (8 cameras, 100 tracked objects) are fixed by the fusion kernel
//! and are not part of the file; counts beyond them are truncated at runtime.

use glam::{IVec3, UVec2, UVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format: {0:?} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(String),
}

/// Top-level configuration for the whole rig.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub grid: GridConfig,
    pub sampler: SamplerConfig,
    pub aggregator: AggregatorConfig,
    pub visual: VisualConfig,
    pub fusion: FusionConfig,
    pub ring: RingConfig,
}

impl RigConfig {
    /// Load from a YAML or JSON file, chosen by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = match extension(path).as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)?,
            "json" => serde_json::from_str(&text)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        tracing::debug!(path = %path.display(), "loaded rig config");
        Ok(config)
    }

    /// Write to a YAML or JSON file, chosen by extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = match extension(path).as_str() {
            "yaml" | "yml" => serde_yaml::to_string(self)?,
            "json" => serde_json::to_string_pretty(self)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        std::fs::write(path, text)?;
        Ok(())
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Where the CPU voxel grid sits in the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridAnchor {
    /// Minimum corner given explicitly.
    Origin { origin: Vec3 },
    /// Centred on `center` in X/Z with the grid floor at y = 0.
    GroundCentered { center: Vec3 },
}

impl Default for GridAnchor {
    fn default() -> Self {
        GridAnchor::GroundCentered { center: Vec3::ZERO }
    }
}

/// CPU occupancy grid settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub anchor: GridAnchor,
    /// Voxel counts along X, Y, Z. Must all be positive.
    pub size: IVec3,
    /// Voxel edge length in meters.
    pub voxel_size: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            anchor: GridAnchor::default(),
            size: IVec3::new(100, 20, 60),
            voxel_size: 0.1,
        }
    }
}

/// How a sampler turns a ray into a grid point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    /// Record the exact scene intersection; misses record nothing.
    #[default]
    Raycast,
    /// Record the point at maximum range, hit or not.
    ApproximateDepth,
}

/// Per-camera viewport sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Viewport sampling resolution. Lower is faster and coarser.
    pub sample_width: u32,
    pub sample_height: u32,
    /// Rays cast per step; spreads a full pass over several frames.
    pub samples_per_frame: u32,
    /// Maximum sampling distance, further capped by the camera far plane.
    pub max_distance: f32,
    /// Scene layers considered by ray casts.
    pub layer_mask: u32,
    pub mode: SampleMode,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sample_width: 160,
            sample_height: 120,
            samples_per_frame: 2000,
            max_distance: 2.21,
            layer_mask: u32::MAX,
            mode: SampleMode::Raycast,
        }
    }
}

/// How the aggregator schedules samplers within a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// One sampling step per sensor per tick.
    #[default]
    FrameSpread,
    /// A complete viewport pass per sensor per tick.
    Blocking,
}

/// CPU aggregator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub enabled: bool,
    /// Clear the grid at the start of every tick (no persistence).
    pub clear_before_sampling: bool,
    pub sweep: SweepMode,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            clear_before_sampling: true,
            sweep: SweepMode::FrameSpread,
        }
    }
}

/// Visualization thresholds and scales for the CPU grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    /// Minimum hit count for a voxel to be drawn.
    pub min_count_to_show: u32,
    /// Count mapped to full visual weight.
    pub reference_max: f32,
    /// Gizmo cube edge as a fraction of the voxel size.
    pub gizmo_scale: f32,
    /// Instanced cube edge as a fraction of the voxel size.
    pub instance_scale: f32,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            min_count_to_show: 1,
            reference_max: 4.0,
            gizmo_scale: 0.95,
            instance_scale: 0.9,
        }
    }
}

/// Which scene objects the fusion pass tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackingMode {
    /// Every collider whose centre lies inside the fusion bounds.
    #[default]
    AllObjects,
    /// Only objects carrying this tag, wherever they are.
    Tagged { tag: String },
}

/// GPU fusion volume settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub grid_min: Vec3,
    pub grid_max: Vec3,
    /// Volume texels along X, Y, Z.
    pub resolution: UVec3,
    /// Top-down visualization image size.
    pub output_resolution: UVec2,
    /// Fraction of coverage lost per reference frame (1/60 s) when persistent.
    pub decay_rate: f32,
    pub enable_persistence: bool,
    /// Half-angle of each camera's coverage cone.
    pub half_fov_degrees: f32,
    /// Maximum distance at which a camera covers a voxel.
    pub max_range: f32,
    /// Radius around a tracked object that counts as occupied.
    pub object_radius: f32,
    /// Contribution of covered but unoccupied voxels.
    pub ambient_weight: f32,
    pub tracking: TrackingMode,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            grid_min: Vec3::new(-2.5, 0.0, -1.5),
            grid_max: Vec3::new(2.5, 3.0, 1.5),
            resolution: UVec3::new(64, 32, 64),
            output_resolution: UVec2::new(512, 512),
            decay_rate: 0.01,
            enable_persistence: true,
            half_fov_degrees: 35.0,
            max_range: 4.5,
            object_radius: 0.35,
            ambient_weight: 0.15,
            tracking: TrackingMode::AllObjects,
        }
    }
}

/// Intrinsics stamped onto every camera the ring creates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraTemplate {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraTemplate {
    fn default() -> Self {
        Self {
            fov_y_degrees: 60.0,
            aspect: 70.6 / 60.0,
            near: 0.05,
            far: 4.5,
        }
    }
}

/// Rectangular camera ring around the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub num_cameras: usize,
    pub arena_width: f32,
    pub arena_depth: f32,
    pub camera_height: f32,
    pub face_center: bool,
    /// Rebuild the ring whenever the layout changes.
    pub auto_update: bool,
    /// `None` means no camera template is available; the ring stays empty.
    pub camera: Option<CameraTemplate>,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            num_cameras: 4,
            arena_width: 5.0,
            arena_depth: 3.0,
            camera_height: 2.94,
            face_center: true,
            auto_update: true,
            camera: Some(CameraTemplate::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_rig_layout() {
        let c = RigConfig::default();
        assert_eq!(c.grid.size, IVec3::new(100, 20, 60));
        assert_eq!(c.sampler.sample_width, 160);
        assert_eq!(c.sampler.samples_per_frame, 2000);
        assert_eq!(c.fusion.resolution, UVec3::new(64, 32, 64));
        assert_eq!(c.ring.num_cameras, 4);
        assert!(c.fusion.enable_persistence);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "sampler:\n  samples_per_frame: 64\nring:\n  num_cameras: 6\n";
        let c: RigConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.sampler.samples_per_frame, 64);
        assert_eq!(c.sampler.sample_width, 160);
        assert_eq!(c.ring.num_cameras, 6);
        assert_eq!(c.grid, GridConfig::default());
    }

    #[test]
    fn anchor_and_modes_parse_from_yaml() {
        let yaml = r#"
grid:
  anchor:
    kind: origin
    origin: [1.0, 0.0, -2.0]
  size: [10, 1, 10]
  voxel_size: 1.0
sampler:
  mode: approximate_depth
aggregator:
  sweep: blocking
fusion:
  tracking:
    kind: tagged
    tag: Player
"#;
        let c: RigConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            c.grid.anchor,
            GridAnchor::Origin {
                origin: Vec3::new(1.0, 0.0, -2.0)
            }
        );
        assert_eq!(c.sampler.mode, SampleMode::ApproximateDepth);
        assert_eq!(c.aggregator.sweep, SweepMode::Blocking);
        assert_eq!(
            c.fusion.tracking,
            TrackingMode::Tagged {
                tag: "Player".into()
            }
        );
    }

    #[test]
    fn save_and_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = RigConfig::default();
        c.fusion.decay_rate = 0.5;
        c.ring.camera = None;

        for name in ["rig.yaml", "rig.json"] {
            let path = dir.path().join(name);
            c.save(&path).unwrap();
            let loaded = RigConfig::load(&path).unwrap();
            assert_eq!(loaded, c);
        }
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.toml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            RigConfig::load(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            RigConfig::load("/definitely/not/here.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
