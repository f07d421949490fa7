use arena_common::config::{AggregatorConfig, RigConfig, SamplerConfig, SweepMode, VisualConfig};
use arena_common::{CoverageAccumulator, FrameClock, SensorId, SkipReason, TickOutcome};
use arena_grid::{GridError, VoxelGrid};
use arena_sampler::{PinholeCamera, Sampler, SamplerError, StepStats, ViewportCamera};
use arena_scene::RayCaster;
use glam::{IVec3, Mat4, Vec3};

use crate::visual::{GizmoCube, VoxelVisual, gizmo_color};

#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Sampler(#[from] SamplerError),
}

struct Sensor<C> {
    id: SensorId,
    name: String,
    camera: C,
    sampler: Sampler,
}

/// Read-only view of a registered sensor.
#[derive(Debug, Clone, Copy)]
pub struct SensorView<'a, C> {
    pub id: SensorId,
    pub name: &'a str,
    pub camera: &'a C,
    pub sampler: &'a Sampler,
}

/// Drives registered samplers into one shared voxel grid.
pub struct CoverageAggregator<C: ViewportCamera = PinholeCamera> {
    grid: VoxelGrid,
    sensors: Vec<Sensor<C>>,
    config: AggregatorConfig,
    visual: VisualConfig,
    last_stats: StepStats,
}

impl<C: ViewportCamera> CoverageAggregator<C> {
    pub fn new(grid: VoxelGrid, config: AggregatorConfig, visual: VisualConfig) -> Self {
        Self {
            grid,
            sensors: Vec::new(),
            config,
            visual,
            last_stats: StepStats::default(),
        }
    }

    /// Aggregator with an allocated grid and no sensors.
    pub fn from_config(config: &RigConfig) -> Result<Self, CoverageError> {
        let grid = VoxelGrid::from_config(&config.grid)?;
        Ok(Self::new(
            grid,
            config.aggregator.clone(),
            config.visual.clone(),
        ))
    }

    /// Add a sensor. Its sampler starts at cursor `(0, 0)`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        camera: C,
        sampler: &SamplerConfig,
    ) -> Result<SensorId, SamplerError> {
        let sampler = Sampler::new(sampler)?;
        let id = SensorId::new();
        let name = name.into();
        tracing::debug!(sensor = %id.short(), %name, "sensor registered");
        self.sensors.push(Sensor {
            id,
            name,
            camera,
            sampler,
        });
        Ok(id)
    }

    /// Remove a sensor and return its camera.
    pub fn unregister(&mut self, id: SensorId) -> Option<C> {
        let pos = self.sensors.iter().position(|s| s.id == id)?;
        tracing::debug!(sensor = %id.short(), "sensor unregistered");
        Some(self.sensors.remove(pos).camera)
    }

    /// Remove every sensor.
    pub fn clear_sensors(&mut self) {
        self.sensors.clear();
    }

    pub fn camera_mut(&mut self, id: SensorId) -> Option<&mut C> {
        self.sensors
            .iter_mut()
            .find(|s| s.id == id)
            .map(|s| &mut s.camera)
    }

    pub fn sensors(&self) -> impl Iterator<Item = SensorView<'_, C>> {
        self.sensors.iter().map(|s| SensorView {
            id: s.id,
            name: &s.name,
            camera: &s.camera,
            sampler: &s.sampler,
        })
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// Rewind every sampler cursor. Counts are kept.
    pub fn reset_samplers(&mut self) {
        for s in &mut self.sensors {
            s.sampler.reset();
        }
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Resize the grid; existing counts are discarded.
    pub fn set_grid_dimensions(&mut self, dims: IVec3) -> Result<(), GridError> {
        self.grid.set_dimensions(dims)
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AggregatorConfig {
        &mut self.config
    }

    pub fn visual(&self) -> &VisualConfig {
        &self.visual
    }

    pub fn visual_mut(&mut self) -> &mut VisualConfig {
        &mut self.visual
    }

    /// Stats summed over all sensors in the most recent productive tick.
    pub fn last_stats(&self) -> StepStats {
        self.last_stats
    }

    /// Zero every count.
    pub fn clear_grid(&mut self) {
        if let Err(e) = self.grid.clear() {
            tracing::warn!(error = %e, "coverage grid clear failed");
        }
    }

    /// Run one sampling cycle against `scene`.
    pub fn tick<S: RayCaster + ?Sized>(&mut self, scene: &S) -> TickOutcome {
        if !self.config.enabled {
            return TickOutcome::Skipped(SkipReason::Disabled);
        }
        if self.sensors.is_empty() {
            return TickOutcome::Skipped(SkipReason::NoSensors);
        }

        let _span = tracing::info_span!("coverage_tick", sensors = self.sensors.len()).entered();

        if self.config.clear_before_sampling {
            self.clear_grid();
        }

        let mut total = StepStats::default();
        for sensor in &mut self.sensors {
            let steps = match self.config.sweep {
                SweepMode::FrameSpread => 1,
                SweepMode::Blocking => sensor.sampler.full_pass_steps(),
            };
            for _ in 0..steps {
                total += sensor
                    .sampler
                    .sample_step(&sensor.camera, scene, &mut self.grid);
            }
        }

        tracing::debug!(
            rays = total.rays,
            hits = total.hits,
            recorded = total.recorded,
            "coverage tick"
        );
        self.last_stats = total;
        TickOutcome::Accumulated { work: total.rays }
    }

    /// Voxels at or above the display threshold, X fastest.
    pub fn visible_voxels(&self) -> impl Iterator<Item = VoxelVisual> + '_ {
        let threshold = self.visual.min_count_to_show;
        let reference = self.visual.reference_max;
        self.grid
            .iter()
            .filter(move |(_, count)| *count >= threshold)
            .map(move |(indices, count)| VoxelVisual {
                indices,
                center: self.grid.voxel_center_world(indices),
                count,
                weight: VoxelVisual::weight_for(count, reference),
            })
    }

    /// Solid debug cubes for every visible voxel.
    pub fn gizmo_cubes(&self) -> Vec<GizmoCube> {
        let size = self.grid.voxel_size() * self.visual.gizmo_scale;
        self.visible_voxels()
            .map(|v| GizmoCube {
                center: v.center,
                size,
                color: gizmo_color(v.weight),
            })
            .collect()
    }

    /// Instance transforms for every visible voxel, unbatched.
    ///
    /// Feed through [`crate::batches`] before drawing.
    pub fn instance_transforms(&self) -> Vec<Mat4> {
        let scale = Vec3::splat(self.grid.voxel_size() * self.visual.instance_scale);
        self.visible_voxels()
            .map(|v| Mat4::from_scale_rotation_translation(scale, glam::Quat::IDENTITY, v.center))
            .collect()
    }
}

impl<C, S> CoverageAccumulator<S> for CoverageAggregator<C>
where
    C: ViewportCamera,
    S: RayCaster + ?Sized,
{
    fn label(&self) -> &'static str {
        "cpu-raycast"
    }

    fn clear(&mut self) {
        self.clear_grid();
    }

    fn accumulate(&mut self, scene: &S, _clock: &FrameClock) -> TickOutcome {
        self.tick(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{INSTANCE_BATCH_LIMIT, batches};
    use arena_common::Pose;
    use arena_scene::{Scene, SceneObject, Shape};

    fn looking_down() -> PinholeCamera {
        PinholeCamera {
            pose: Pose::looking_at(Vec3::new(0.5, 2.0, 0.5), Vec3::new(0.5, 0.0, 0.5)),
            fov_y: 20f32.to_radians(),
            aspect: 1.0,
            near: 0.05,
            far: 5.0,
        }
    }

    fn aggregator(config: AggregatorConfig) -> CoverageAggregator {
        let mut grid = VoxelGrid::new(Vec3::ZERO, IVec3::new(10, 10, 10), 0.1);
        grid.allocate().unwrap();
        CoverageAggregator::new(grid, config, VisualConfig::default())
    }

    fn sampler(spf: u32) -> SamplerConfig {
        SamplerConfig {
            sample_width: 8,
            sample_height: 8,
            samples_per_frame: spf,
            max_distance: 5.0,
            ..Default::default()
        }
    }

    fn floor() -> Scene {
        let mut s = Scene::new();
        s.add(SceneObject::new("floor", Shape::ground(0.05)));
        s
    }

    #[test]
    fn no_sensors_skips_and_keeps_grid() {
        let mut agg = aggregator(AggregatorConfig::default());
        let before = agg.grid().checksum();
        let outcome = agg.tick(&floor());
        assert_eq!(outcome, TickOutcome::Skipped(SkipReason::NoSensors));
        assert_eq!(agg.grid().checksum(), before);
    }

    #[test]
    fn disabled_skips() {
        let mut agg = aggregator(AggregatorConfig {
            enabled: false,
            ..Default::default()
        });
        agg.register("cam", looking_down(), &sampler(16)).unwrap();
        assert_eq!(agg.tick(&floor()), TickOutcome::Skipped(SkipReason::Disabled));
        assert_eq!(agg.grid().total_hits(), 0);
    }

    #[test]
    fn frame_spread_runs_one_step_per_sensor() {
        let mut agg = aggregator(AggregatorConfig {
            clear_before_sampling: false,
            ..Default::default()
        });
        agg.register("a", looking_down(), &sampler(16)).unwrap();
        agg.register("b", looking_down(), &sampler(16)).unwrap();
        let outcome = agg.tick(&floor());
        assert_eq!(outcome.work(), 32);
        assert_eq!(agg.grid().total_hits(), 32);
        assert!(agg.sensors().all(|s| s.sampler.cursor() == glam::UVec2::new(0, 2)));
    }

    #[test]
    fn blocking_sweep_covers_full_viewport() {
        let mut agg = aggregator(AggregatorConfig {
            sweep: SweepMode::Blocking,
            ..Default::default()
        });
        agg.register("cam", looking_down(), &sampler(10)).unwrap();
        // 64 cells at 10 per step: 7 steps, 70 rays, cursor wraps to 6.
        let outcome = agg.tick(&floor());
        assert_eq!(outcome.work(), 70);
        assert_eq!(agg.last_stats().rays, 70);
        let cursor = agg.sensors().next().unwrap().sampler.cursor();
        assert_eq!(cursor, glam::UVec2::new(6, 0));
    }

    #[test]
    fn clear_before_sampling_bounds_counts() {
        let mut agg = aggregator(AggregatorConfig {
            sweep: SweepMode::Blocking,
            ..Default::default()
        });
        agg.register("cam", looking_down(), &sampler(64)).unwrap();
        agg.tick(&floor());
        let first = agg.grid().total_hits();
        agg.tick(&floor());
        assert_eq!(agg.grid().total_hits(), first);

        agg.config_mut().clear_before_sampling = false;
        agg.tick(&floor());
        assert_eq!(agg.grid().total_hits(), first * 2);
    }

    #[test]
    fn unregister_and_camera_mut() {
        let mut agg = aggregator(AggregatorConfig::default());
        let id = agg.register("cam", looking_down(), &sampler(4)).unwrap();
        agg.camera_mut(id).unwrap().far = 1.0;
        assert_eq!(agg.sensors().next().unwrap().camera.far, 1.0);
        assert!(agg.unregister(id).is_some());
        assert!(agg.unregister(id).is_none());
        assert_eq!(agg.sensor_count(), 0);
    }

    #[test]
    fn invalid_sampler_is_rejected() {
        let mut agg = aggregator(AggregatorConfig::default());
        let bad = SamplerConfig {
            sample_width: 0,
            ..Default::default()
        };
        assert!(agg.register("cam", looking_down(), &bad).is_err());
        assert_eq!(agg.sensor_count(), 0);
    }

    #[test]
    fn resizing_discards_counts() {
        let mut agg = aggregator(AggregatorConfig::default());
        agg.register("cam", looking_down(), &sampler(64)).unwrap();
        agg.tick(&floor());
        assert!(agg.grid().total_hits() > 0);
        agg.set_grid_dimensions(IVec3::new(5, 5, 5)).unwrap();
        assert_eq!(agg.grid().len(), 125);
        assert_eq!(agg.grid().total_hits(), 0);
        assert!(agg.set_grid_dimensions(IVec3::new(0, 5, 5)).is_err());
        assert_eq!(agg.grid().len(), 125);
    }

    #[test]
    fn visible_voxels_respect_threshold_and_weight() {
        let mut agg = aggregator(AggregatorConfig::default());
        let mut grid = VoxelGrid::new(Vec3::ZERO, IVec3::new(2, 1, 1), 1.0);
        grid.allocate().unwrap();
        grid.add_hit(Vec3::new(0.5, 0.5, 0.5), 2);
        grid.add_hit(Vec3::new(1.5, 0.5, 0.5), 9);
        agg.grid = grid;
        agg.visual_mut().min_count_to_show = 3;

        let visible: Vec<_> = agg.visible_voxels().collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].indices, IVec3::new(1, 0, 0));
        assert_eq!(visible[0].center, Vec3::new(1.5, 0.5, 0.5));
        assert_eq!(visible[0].weight, 1.0);

        let cubes = agg.gizmo_cubes();
        assert!((cubes[0].size - 0.95).abs() < 1e-6);
        assert_eq!(cubes[0].color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn instance_transforms_batch_at_limit() {
        let mut agg = aggregator(AggregatorConfig::default());
        let mut grid = VoxelGrid::new(Vec3::ZERO, IVec3::new(50, 50, 1), 0.1);
        grid.allocate().unwrap();
        let cells: Vec<IVec3> = grid.iter().map(|(i, _)| i).take(2500).collect();
        for idx in cells {
            let p = grid.voxel_center_world(idx);
            grid.add_hit(p, 1);
        }
        agg.grid = grid;

        let transforms = agg.instance_transforms();
        assert_eq!(transforms.len(), 2500);
        let sizes: Vec<usize> = batches(&transforms, INSTANCE_BATCH_LIMIT)
            .map(<[Mat4]>::len)
            .collect();
        assert_eq!(sizes, vec![1023, 1023, 454]);

        let (scale, _, translation) = transforms[0].to_scale_rotation_translation();
        assert!((scale.x - 0.09).abs() < 1e-6);
        assert!((translation - Vec3::new(0.05, 0.05, 0.05)).length() < 1e-6);
    }

    #[test]
    fn accumulator_trait_drives_tick() {
        let mut agg = aggregator(AggregatorConfig::default());
        agg.register("cam", looking_down(), &sampler(8)).unwrap();
        let scene = floor();
        let acc: &mut dyn CoverageAccumulator<Scene> = &mut agg;
        assert_eq!(acc.label(), "cpu-raycast");
        assert_eq!(acc.accumulate(&scene, &FrameClock::new()).work(), 8);
        acc.clear();
        assert_eq!(agg.grid().total_hits(), 0);
    }
}
