use anyhow::{Context, Result};
use arena_common::config::{RingConfig, SweepMode};
use arena_common::{FixedTick, FrameClock, RigConfig, TickOutcome};
use arena_coverage::CoverageAggregator;
use arena_fusion::{FusionFrame, FusionPass, GpuContext, WgpuFusionBackend};
use arena_render_wgpu::{CubeInstance, DebugLines, OrbitCamera, VoxelRenderer};
use arena_rig::CameraRing;
use arena_sampler::DepthImage;
use arena_scene::{LayerMask, Mover, ObjectId, Scene, demo_arena};
use clap::Parser;
use egui::Context as EguiContext;
use glam::Vec2;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

const BOUNDS_COLOR: [f32; 4] = [0.35, 0.75, 1.0, 1.0];
const FUSION_BOUNDS_COLOR: [f32; 4] = [0.9, 0.4, 1.0, 1.0];
const FRUSTUM_COLOR: [f32; 4] = [0.2, 1.0, 0.4, 1.0];
const TRACKED_COLOR: [f32; 4] = [1.0, 0.85, 0.2, 1.0];
/// Simulation rate of sampling, fusion and player movement.
const TICK_HZ: f64 = 60.0;
/// Most fixed ticks run for one rendered frame.
const MAX_CATCH_UP: u32 = 4;
/// Depth capture size in the depth-fusion view; kept small, capture is CPU ray casts.
const DEPTH_SIZE: (u32, u32) = (64, 48);

#[derive(Parser)]
#[command(name = "arena-desktop", about = "Arena coverage rig viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Rig configuration file (.yaml, .yml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// What the fusion image shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FusionView {
    Volume,
    Depth,
    TestPattern,
}

impl FusionView {
    fn next(self) -> Self {
        match self {
            FusionView::Volume => FusionView::Depth,
            FusionView::Depth => FusionView::TestPattern,
            FusionView::TestPattern => FusionView::Volume,
        }
    }

    fn label(self) -> &'static str {
        match self {
            FusionView::Volume => "Coverage volume",
            FusionView::Depth => "Depth fusion",
            FusionView::TestPattern => "Test pattern",
        }
    }
}

/// Application state.
struct AppState {
    config: RigConfig,
    /// Ring settings as edited in the panel; applied through `CameraRing::configure`.
    ring_edit: RingConfig,
    scene: Scene,
    player: Option<ObjectId>,
    mover: Mover,
    ring: CameraRing,
    aggregator: CoverageAggregator,
    camera: OrbitCamera,
    clock: FrameClock,
    ticker: FixedTick,
    lines: DebugLines,
    cubes: Vec<CubeInstance>,
    show_panel: bool,
    show_voxels: bool,
    show_frustums: bool,
    fusion_view: FusionView,
    fusion_dirty: bool,
    last_cpu: TickOutcome,
    last_fusion: TickOutcome,
    // Input state
    keys_held: HashSet<KeyCode>,
    orbiting: bool,
    panning: bool,
    last_frame: Instant,
}

impl AppState {
    fn new(config: RigConfig) -> Result<Self> {
        let scene = demo_arena(config.ring.arena_width, config.ring.arena_depth);
        let player = scene.find("Player");
        let mut ring = CameraRing::new(&config.ring);
        ring.rebuild();
        let aggregator = CoverageAggregator::from_config(&config)?;

        let mut state = Self {
            ring_edit: config.ring.clone(),
            config,
            scene,
            player,
            mover: Mover::new(1.5),
            ring,
            aggregator,
            camera: OrbitCamera::default(),
            clock: FrameClock::new(),
            ticker: FixedTick::new(TICK_HZ, MAX_CATCH_UP),
            lines: DebugLines::new(),
            cubes: Vec::new(),
            show_panel: true,
            show_voxels: true,
            show_frustums: true,
            fusion_view: FusionView::Volume,
            fusion_dirty: false,
            last_cpu: TickOutcome::Accumulated { work: 0 },
            last_fusion: TickOutcome::Accumulated { work: 0 },
            keys_held: HashSet::new(),
            orbiting: false,
            panning: false,
            last_frame: Instant::now(),
        };
        state.sync_sensors();
        Ok(state)
    }

    /// Re-register one CPU sensor per ring camera.
    fn sync_sensors(&mut self) {
        self.aggregator.clear_sensors();
        for cam in self.ring.cameras() {
            if let Err(e) = self
                .aggregator
                .register(cam.name.clone(), cam.camera, &self.config.sampler)
            {
                tracing::error!("failed to register {}: {e}", cam.name);
            }
        }
    }

    /// Run the fixed ticks due after `dt` seconds of wall time; returns how many ran.
    fn update(&mut self, dt: f32) -> u32 {
        let steps = self.ticker.advance(dt);
        let step = self.ticker.step_seconds();
        for _ in 0..steps {
            self.fixed_step(step);
        }
        if steps > 0 {
            self.rebuild_geometry();
        }
        steps
    }

    fn fixed_step(&mut self, dt: f32) {
        self.clock.advance(dt);

        let mut input = Vec2::ZERO;
        if self.keys_held.contains(&KeyCode::KeyW) {
            input.y -= 1.0;
        }
        if self.keys_held.contains(&KeyCode::KeyS) {
            input.y += 1.0;
        }
        if self.keys_held.contains(&KeyCode::KeyA) {
            input.x -= 1.0;
        }
        if self.keys_held.contains(&KeyCode::KeyD) {
            input.x += 1.0;
        }
        if input != Vec2::ZERO {
            if let Some(id) = self.player {
                self.mover.step(&mut self.scene, id, input, dt);
            }
        }

        self.ring.configure(&self.ring_edit);
        if let Some(outcome) = self.ring.idle() {
            if !outcome.is_skipped() {
                self.sync_sensors();
            }
        }

        self.last_cpu = self.aggregator.tick(&self.scene);
    }

    fn rebuild_geometry(&mut self) {
        self.cubes.clear();
        if self.show_voxels {
            self.cubes.extend(
                self.aggregator
                    .gizmo_cubes()
                    .iter()
                    .map(CubeInstance::from_gizmo),
            );
        }

        self.lines.clear();
        let (min, max) = self.aggregator.grid().bounds();
        self.lines.wire_box(min, max, BOUNDS_COLOR);
        let fusion = &self.config.fusion;
        self.lines
            .wire_box(fusion.grid_min, fusion.grid_max, FUSION_BOUNDS_COLOR);
        if self.show_frustums {
            for cam in self.ring.cameras() {
                self.lines
                    .frustum_rays(&cam.camera, self.config.sampler.max_distance, FRUSTUM_COLOR);
            }
        }
        for p in self.tracked_objects() {
            self.lines.marker(p, 0.1, TRACKED_COLOR);
            self.lines
                .wire_sphere(p, fusion.object_radius, TRACKED_COLOR, 24);
        }
    }

    fn tracked_objects(&self) -> Vec<glam::Vec3> {
        let fusion = &self.config.fusion;
        self.scene
            .tracked_positions(&fusion.tracking, (fusion.grid_min, fusion.grid_max), None)
    }

    /// One fusion step for the current view mode.
    fn step_fusion(&mut self, fusion: &mut FusionPass<WgpuFusionBackend>) {
        if self.fusion_dirty {
            fusion.reconfigure(self.config.fusion.clone());
            self.fusion_dirty = false;
        }
        self.last_fusion = match self.fusion_view {
            FusionView::Volume => {
                let poses = self.ring.coverage_poses();
                let objects = self.tracked_objects();
                let frame = FusionFrame {
                    cameras: &poses,
                    objects: &objects,
                };
                fusion.update(&frame, self.clock.delta)
            }
            FusionView::Depth => {
                let mask = LayerMask(self.config.sampler.layer_mask);
                let images: Vec<DepthImage> = self
                    .ring
                    .cameras()
                    .iter()
                    .map(|c| {
                        DepthImage::capture(&c.camera, &self.scene, DEPTH_SIZE.0, DEPTH_SIZE.1, mask)
                    })
                    .collect();
                fusion.fuse_depth(&images)
            }
            FusionView::TestPattern => fusion.test_pattern(self.clock.elapsed as f32),
        };
    }

    fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.keys_held.insert(key);
        } else {
            self.keys_held.remove(&key);
        }

        if !pressed {
            return;
        }

        match key {
            KeyCode::F1 => {
                self.show_panel = !self.show_panel;
            }
            KeyCode::Tab => {
                self.fusion_view = self.fusion_view.next();
                tracing::info!("fusion view: {}", self.fusion_view.label());
            }
            KeyCode::KeyR => {
                if !self.ring.rebuild().is_skipped() {
                    self.sync_sensors();
                }
            }
            KeyCode::KeyC => {
                self.aggregator.clear_grid();
            }
            KeyCode::KeyV => {
                self.show_voxels = !self.show_voxels;
            }
            _ => {}
        }
    }

    fn draw_ui(
        &mut self,
        ctx: &EguiContext,
        mut fusion: Option<&mut FusionPass<WgpuFusionBackend>>,
        fusion_texture: Option<egui::TextureId>,
    ) {
        if !self.show_panel {
            return;
        }

        egui::SidePanel::left("rig")
            .default_width(300.0)
            .show(ctx, |ui| {
                ui.heading("Arena Coverage");
                ui.separator();
                ui.label(format!(
                    "Frame {}  ({:.1} ms)",
                    self.clock.frame,
                    self.clock.delta * 1000.0
                ));

                egui::CollapsingHeader::new("Camera ring")
                    .default_open(true)
                    .show(ui, |ui| {
                        let r = &mut self.ring_edit;
                        ui.add(egui::Slider::new(&mut r.num_cameras, 0..=12).text("cameras"));
                        ui.add(egui::Slider::new(&mut r.arena_width, 0.5..=20.0).text("width"));
                        ui.add(egui::Slider::new(&mut r.arena_depth, 0.5..=20.0).text("depth"));
                        ui.add(
                            egui::Slider::new(&mut r.camera_height, 0.0..=6.0).text("height"),
                        );
                        ui.checkbox(&mut r.face_center, "Face centre");
                        ui.checkbox(&mut r.auto_update, "Auto update");
                        ui.horizontal(|ui| {
                            if ui.button("Rebuild (R)").clicked() {
                                self.ring.configure(&self.ring_edit);
                                if !self.ring.rebuild().is_skipped() {
                                    self.sync_sensors();
                                }
                            }
                            if self.ring.is_rebuild_pending() {
                                ui.label("pending");
                            }
                        });
                        for cam in self.ring.cameras() {
                            let p = cam.camera.pose.position;
                            ui.small(format!(
                                "{}  ({:.2}, {:.2}, {:.2})",
                                cam.name, p.x, p.y, p.z
                            ));
                        }
                    });

                egui::CollapsingHeader::new("CPU sampling")
                    .default_open(true)
                    .show(ui, |ui| {
                        let cfg = self.aggregator.config_mut();
                        ui.checkbox(&mut cfg.enabled, "Enabled");
                        ui.checkbox(&mut cfg.clear_before_sampling, "Clear every tick");
                        ui.horizontal(|ui| {
                            ui.radio_value(&mut cfg.sweep, SweepMode::FrameSpread, "Spread");
                            ui.radio_value(&mut cfg.sweep, SweepMode::Blocking, "Blocking");
                        });
                        let vis = self.aggregator.visual_mut();
                        ui.add(
                            egui::Slider::new(&mut vis.min_count_to_show, 1..=32).text("min count"),
                        );
                        ui.add(
                            egui::Slider::new(&mut vis.reference_max, 1.0..=64.0)
                                .text("reference max"),
                        );
                        ui.checkbox(&mut self.show_voxels, "Show voxels (V)");
                        ui.checkbox(&mut self.show_frustums, "Show frustums");
                        ui.horizontal(|ui| {
                            if ui.button("Clear grid (C)").clicked() {
                                self.aggregator.clear_grid();
                            }
                            if ui.button("Reset cursors").clicked() {
                                self.aggregator.reset_samplers();
                            }
                        });
                        let stats = self.aggregator.last_stats();
                        let grid = self.aggregator.grid();
                        ui.label(format!(
                            "rays {}  hits {}  recorded {}",
                            stats.rays, stats.hits, stats.recorded
                        ));
                        ui.label(format!(
                            "occupied {}  max {}",
                            grid.occupied_voxels(),
                            grid.max_count()
                        ));
                        if let TickOutcome::Skipped(reason) = &self.last_cpu {
                            ui.colored_label(egui::Color32::YELLOW, format!("skipped: {reason}"));
                        }
                    });

                egui::CollapsingHeader::new("GPU fusion")
                    .default_open(true)
                    .show(ui, |ui| {
                        let Some(fusion) = fusion.as_deref_mut() else {
                            ui.label("unavailable");
                            return;
                        };
                        egui::ComboBox::from_label("view (Tab)")
                            .selected_text(self.fusion_view.label())
                            .show_ui(ui, |ui| {
                                for v in [FusionView::Volume, FusionView::Depth, FusionView::TestPattern] {
                                    ui.selectable_value(&mut self.fusion_view, v, v.label());
                                }
                            });
                        let f = &mut self.config.fusion;
                        let before = f.clone();
                        ui.checkbox(&mut f.enable_persistence, "Persistence");
                        ui.add(
                            egui::Slider::new(&mut f.decay_rate, 0.0..=1.0)
                                .logarithmic(true)
                                .text("decay"),
                        );
                        ui.add(egui::Slider::new(&mut f.ambient_weight, 0.0..=1.0).text("ambient"));
                        ui.add(
                            egui::Slider::new(&mut f.object_radius, 0.05..=2.0).text("object radius"),
                        );
                        ui.add(
                            egui::Slider::new(&mut f.half_fov_degrees, 1.0..=89.0).text("half fov"),
                        );
                        ui.add(egui::Slider::new(&mut f.max_range, 0.5..=20.0).text("range"));
                        if *f != before {
                            self.fusion_dirty = true;
                        }
                        if ui.button("Clear volume").clicked() {
                            fusion.initialize();
                        }
                        if let TickOutcome::Skipped(reason) = &self.last_fusion {
                            ui.colored_label(egui::Color32::YELLOW, format!("skipped: {reason}"));
                        }
                        if let Some(id) = fusion_texture {
                            let width = ui.available_width().min(280.0);
                            ui.image((id, egui::vec2(width, width)));
                        }
                    });

                ui.separator();
                ui.small("F1: Panel | LMB: Orbit | RMB: Pan | Wheel: Zoom | WASD: Move player");
            });
    }
}

/// Window, surface and GPU objects, created on `resumed`.
struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    renderer: VoxelRenderer,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
    fusion: Option<FusionPass<WgpuFusionBackend>>,
    /// egui handle of the fusion output and the backend generation it was made from.
    fusion_texture: Option<(egui::TextureId, u64)>,
}

struct GpuApp {
    state: AppState,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
}

impl GpuApp {
    fn new(state: AppState) -> Self {
        Self {
            state,
            gpu: None,
            egui_ctx: EguiContext::default(),
        }
    }

    fn init_gpu(&mut self, event_loop: &ActiveEventLoop) -> Result<Gpu> {
        let attrs = Window::default_attributes()
            .with_title("Arena Coverage")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no suitable GPU adapter")?;

        // Fusion shares this device, so ask for its limits up front.
        let fusion_limits = arena_fusion::fusion_limits(&adapter.limits());
        let required_limits = match &fusion_limits {
            Ok(limits) => limits.clone(),
            Err(e) => {
                tracing::warn!("GPU fusion disabled: {e}");
                wgpu::Limits::default()
            }
        };

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("arena_device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: Default::default(),
            },
            None,
        ))?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        self.state.camera.aspect = size.width as f32 / size.height.max(1) as f32;

        let renderer = VoxelRenderer::new(&device, surface_format, size.width, size.height);

        let info = adapter.get_info();
        let ctx = GpuContext::from_parts(device.clone(), queue.clone(), info.name.clone());
        let fusion = match fusion_limits.and_then(|_| WgpuFusionBackend::new(&ctx)) {
            Ok(backend) => Some(FusionPass::new(backend, self.state.config.fusion.clone())),
            Err(e) => {
                tracing::error!("fusion backend unavailable: {e}");
                None
            }
        };

        let egui_winit = egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        tracing::info!(
            "GPU initialized with {} backend on {}",
            info.backend.to_str(),
            info.name
        );

        Ok(Gpu {
            window,
            surface,
            device,
            queue,
            config,
            renderer,
            egui_winit,
            egui_renderer,
            fusion,
            fusion_texture: None,
        })
    }

    fn redraw(&mut self) {
        let now = Instant::now();
        let dt = (now - self.state.last_frame).as_secs_f32().min(0.1);
        self.state.last_frame = now;
        let steps = self.state.update(dt);

        let Some(gpu) = &mut self.gpu else {
            return;
        };

        if let Some(fusion) = &mut gpu.fusion {
            for _ in 0..steps {
                self.state.step_fusion(fusion);
            }
            sync_fusion_texture(
                &mut gpu.egui_renderer,
                &gpu.device,
                fusion.backend(),
                &mut gpu.fusion_texture,
            );
        }

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(&gpu.device, &gpu.config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        gpu.renderer.render(
            &gpu.device,
            &gpu.queue,
            &view,
            &self.state.camera,
            &self.state.cubes,
            &self.state.lines,
        );

        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let state = &mut self.state;
        let mut fusion = gpu.fusion.as_mut();
        let texture = gpu.fusion_texture.map(|(id, _)| id);
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            state.draw_ui(ctx, fusion.as_deref_mut(), texture);
        });

        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        for (id, image_delta) in &full_output.textures_delta.set {
            gpu.egui_renderer
                .update_texture(&gpu.device, &gpu.queue, *id, image_delta);
        }
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("egui_encoder"),
            });
        gpu.egui_renderer.update_buffers(
            &gpu.device,
            &gpu.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            gpu.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }

        output.present();
        gpu.window.request_redraw();
    }
}

/// Keep the egui texture pointing at the current fusion output image.
///
/// The backend bumps its generation whenever it recreates the image, so the
/// egui binding is refreshed only then.
fn sync_fusion_texture(
    egui_renderer: &mut egui_wgpu::Renderer,
    device: &wgpu::Device,
    backend: &WgpuFusionBackend,
    slot: &mut Option<(egui::TextureId, u64)>,
) {
    let Some(view) = backend.output_view() else {
        return;
    };
    let generation = backend.output_generation();
    match slot {
        Some((_, seen)) if *seen == generation => {}
        Some((id, seen)) => {
            egui_renderer.update_egui_texture_from_wgpu_texture(
                device,
                view,
                wgpu::FilterMode::Nearest,
                *id,
            );
            *seen = generation;
        }
        None => {
            let id = egui_renderer.register_native_texture(device, view, wgpu::FilterMode::Nearest);
            *slot = Some((id, generation));
        }
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match self.init_gpu(event_loop) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => {
                tracing::error!("failed to initialize GPU: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(gpu) = &mut self.gpu {
            let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                if let Some(gpu) = &mut self.gpu {
                    if let Some(fusion) = &mut gpu.fusion {
                        fusion.backend_mut().release();
                    }
                }
                self.state.ring.cancel_pending();
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.config.width = new_size.width.max(1);
                    gpu.config.height = new_size.height.max(1);
                    gpu.surface.configure(&gpu.device, &gpu.config);
                    self.state.camera.aspect =
                        gpu.config.width as f32 / gpu.config.height.max(1) as f32;
                    gpu.renderer
                        .resize(&gpu.device, gpu.config.width, gpu.config.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: key_state,
                        ..
                    },
                ..
            } => {
                self.state
                    .handle_key(key, key_state == ElementState::Pressed);
            }
            WindowEvent::MouseInput {
                button,
                state: btn_state,
                ..
            } => {
                let pressed = btn_state == ElementState::Pressed;
                match button {
                    MouseButton::Left => self.state.orbiting = pressed,
                    MouseButton::Right | MouseButton::Middle => self.state.panning = pressed,
                    _ => {}
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 50.0,
                };
                self.state.camera.zoom(steps);
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            let (dx, dy) = (delta.0 as f32, delta.1 as f32);
            if self.state.orbiting {
                self.state.camera.orbit(dx, dy);
            } else if self.state.panning {
                self.state.camera.pan(dx, dy);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("arena-desktop starting");

    let config = match &cli.config {
        Some(path) => {
            RigConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => RigConfig::default(),
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(AppState::new(config)?);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_runs_at_fixed_rate() {
        let mut state = AppState::new(RigConfig::default()).unwrap();
        let step = state.ticker.step_seconds();

        assert_eq!(state.update(step * 0.25), 0);
        assert_eq!(state.clock.frame, 0);

        assert_eq!(state.update(step * 2.0), 2);
        assert_eq!(state.clock.frame, 2);
        assert_eq!(state.clock.delta, step);
        assert!(!state.last_cpu.is_skipped());
    }

    #[test]
    fn long_stall_is_capped() {
        let mut state = AppState::new(RigConfig::default()).unwrap();
        assert_eq!(state.update(5.0), MAX_CATCH_UP);
        assert_eq!(state.clock.frame, MAX_CATCH_UP as u64);
    }
}
