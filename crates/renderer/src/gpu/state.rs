use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use camarray::CameraPose;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, warn};
use winit::dpi::PhysicalSize;

use crate::chain::ChainPlan;
use crate::reconfigure::{PipelineBackend, ResourceError};
use crate::scene::{SceneRenderer, SceneTargets};
use crate::types::{AdapterProfile, ColorSpaceMode, GpuPowerPreference};

use super::context::{GpuContext, SurfaceColorSpace};
use super::pipeline::SharedLayouts;
use super::stages::{StageChain, StageContext, SurfaceInfo};
use super::targets::{TileTarget, DEPTH_FORMAT, HDR_FORMAT};

/// wgpu implementation of [`PipelineBackend`].
pub(crate) struct GpuState {
    context: GpuContext,
    layouts: SharedLayouts,
    scene: Box<dyn SceneRenderer>,
    frames_per_second: f32,
    last_fps_update: Instant,
    frames_since_last_update: u32,
    frame_count: u64,
}

impl GpuState {
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        color_space: ColorSpaceMode,
        gpu_power: GpuPowerPreference,
        mut scene: Box<dyn SceneRenderer>,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, initial_size, color_space, gpu_power)?;
        let layouts = SharedLayouts::new(&context.device);

        let targets = SceneTargets {
            color_format: HDR_FORMAT,
            depth_format: DEPTH_FORMAT,
            camera_layout: &layouts.camera_layout,
        };
        let device = &context.device;
        let queue = &context.queue;
        let prepared = scoped(device, "scene", || scene.prepare(device, queue, &targets))
            .map_err(|err| anyhow!("{err}"))?;
        prepared?;

        Ok(Self {
            context,
            layouts,
            scene,
            frames_per_second: 60.0,
            last_fps_update: Instant::now(),
            frames_since_last_update: 0,
            frame_count: 0,
        })
    }

    pub(crate) fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    /// Recovers from a lost or outdated swapchain without touching the chain.
    pub(crate) fn reconfigure_surface(&mut self) {
        self.context.reconfigure();
    }

    fn surface_info(&self) -> SurfaceInfo {
        SurfaceInfo {
            format: self.context.surface_format,
            encode_gamma: self.context.color_space == SurfaceColorSpace::Gamma,
        }
    }

    fn record_frame(&mut self) {
        let now = Instant::now();
        self.frame_count += 1;
        self.frames_since_last_update += 1;
        let elapsed = now.saturating_duration_since(self.last_fps_update);
        if elapsed >= Duration::from_secs(1) {
            self.frames_per_second = self.frames_since_last_update as f32 / elapsed.as_secs_f32();
            self.frames_since_last_update = 0;
            self.last_fps_update = now;
            debug!(
                fps = self.frames_per_second.round(),
                frame_count = self.frame_count,
                "render stats"
            );
        }
    }
}

impl PipelineBackend for GpuState {
    type TileTarget = TileTarget;
    type Chain = StageChain;
    type RenderError = wgpu::SurfaceError;

    fn max_texture_dimension(&self) -> u32 {
        self.context.device.limits().max_texture_dimension_2d
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.context.resize(PhysicalSize::new(width, height));
    }

    fn allocate_tile_target(&mut self, resolution: u32) -> Result<TileTarget, ResourceError> {
        let device = &self.context.device;
        scoped(device, "tile texture", || TileTarget::new(device, resolution))
    }

    fn assemble_chain(
        &mut self,
        plan: &ChainPlan,
        tiles: &TileTarget,
        cameras: usize,
    ) -> Result<StageChain, ResourceError> {
        let surface = self.surface_info();
        let device = &self.context.device;
        let layouts = &self.layouts;
        scoped(device, "compositor chain", || {
            StageChain::build(device, layouts, plan, tiles, cameras, surface)
        })
    }

    fn release_chain(&mut self, chain: StageChain) {
        chain.release();
    }

    fn release_tile_target(&mut self, tiles: TileTarget) {
        tiles.release();
    }

    fn render(
        &mut self,
        tiles: &TileTarget,
        chain: &StageChain,
        poses: &[CameraPose],
        elapsed: f32,
    ) -> Result<(), wgpu::SurfaceError> {
        let acquisition_start = Instant::now();
        let frame = self.context.surface.get_current_texture()?;
        let acquisition = acquisition_start.elapsed();
        let budget = Duration::from_secs_f32(1.0 / self.frames_per_second.max(1.0));
        if acquisition > budget {
            warn!(
                "acquiring frame took {}ms, which is over the frame budget of {}ms",
                acquisition.as_millis(),
                budget.as_millis(),
            );
        }

        self.scene.update(&self.context.queue, elapsed);

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("light field encoder"),
                });
        {
            let mut ctx = StageContext {
                encoder: &mut encoder,
                queue: &self.context.queue,
                surface_view: &view,
                tiles,
                intermediate: chain.intermediate(),
                scene: self.scene.as_ref(),
                poses,
            };
            chain.execute(&mut ctx);
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.record_frame();
        Ok(())
    }
}

/// Runs `build` inside out-of-memory and validation error scopes.
///
/// Anything `build` produced is dropped again when a scope reports an error.
fn scoped<T>(
    device: &wgpu::Device,
    what: &'static str,
    build: impl FnOnce() -> T,
) -> Result<T, ResourceError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    let validation = pollster::block_on(device.pop_error_scope());
    let memory = pollster::block_on(device.pop_error_scope());
    match memory.or(validation) {
        None => Ok(value),
        Some(err) => {
            warn!(what, error = %err, "GPU allocation failed");
            Err(ResourceError::Allocation {
                what,
                message: err.to_string(),
            })
        }
    }
}
