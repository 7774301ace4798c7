use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use tracing::{error, info, warn};

use crate::controls::{action_for_key, ControlAction, OrbitController};
use crate::gpu::GpuState;
use crate::reconfigure::{FrameOutcome, PipelineReconfigurator, PipelineState};
use crate::runtime::{FrameScheduler, SystemTimeSource, TimeSource};
use crate::scene::DemoScene;
use crate::types::RendererConfig;

const SOFTWARE_FPS_CAP: f32 = 15.0;

/// Pixels of touchpad scroll treated as one wheel line.
const PIXELS_PER_LINE: f64 = 40.0;

/// Everything the preview window owns between events.
struct WindowState {
    pipeline: PipelineReconfigurator<GpuState>,
    window: Arc<Window>,
    orbit: OrbitController,
    mouse: MouseState,
    clock: SystemTimeSource,
    title: String,
}

impl WindowState {
    fn window(&self) -> &Window {
        self.window.as_ref()
    }

    fn sync_pose(&mut self) {
        self.pipeline.set_base_pose(self.orbit.pose());
        self.window.request_redraw();
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        let Key::Character(ref text) = event.logical_key else {
            return;
        };
        let Some(action) = action_for_key(text.as_str(), &self.pipeline.config().array) else {
            return;
        };
        match action {
            ControlAction::ResetView => {
                self.orbit = OrbitController::default();
                self.sync_pose();
            }
            ControlAction::Change(change) => {
                let applied = self.pipeline.apply_change(change).and_then(|()| {
                    // A failed first build leaves nothing to rebuild from.
                    if self.pipeline.state() == PipelineState::Uninitialized {
                        self.pipeline.initialize()
                    } else {
                        Ok(())
                    }
                });
                if let Err(err) = applied {
                    warn!(%change, error = %err, "parameter change rejected");
                }
                self.refresh_title();
                self.window.request_redraw();
            }
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if let Err(err) = self.pipeline.resize(size.width, size.height) {
            warn!(width = size.width, height = size.height, error = %err, "resize failed");
        }
        self.refresh_title();
        self.window.request_redraw();
    }

    fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        if let Some((dx, dy)) = self.mouse.moved(position) {
            self.orbit.drag(dx, dy);
            self.sync_pose();
        }
    }

    fn handle_wheel(&mut self, delta: MouseScrollDelta) {
        let lines = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(position) => (position.y / PIXELS_PER_LINE) as f32,
        };
        self.orbit.zoom(lines);
        self.sync_pose();
    }

    /// Shows the live parameters and the last rebuild error in the title bar.
    fn refresh_title(&self) {
        let array = &self.pipeline.config().array;
        let mut title = format!(
            "{} | {}x{} views | {}px | aperture {:.2} | focus {:.2}",
            self.title,
            array.views,
            array.views,
            array.resolution,
            array.aperture,
            array.focal_distance,
        );
        let state = self.pipeline.state();
        if state != PipelineState::Ready {
            title.push_str(&format!(" | {state}"));
        }
        if let Some(err) = self.pipeline.last_error() {
            title.push_str(&format!(" | error: {err}"));
        }
        self.window.set_title(&title);
    }

    /// Returns false when the surface is gone for good.
    fn render_frame(&mut self) -> bool {
        let sample = self.clock.sample();
        match self.pipeline.render(sample.seconds) {
            Ok(FrameOutcome::Rendered) => true,
            Ok(FrameOutcome::Skipped(state)) => {
                tracing::trace!(%state, "frame skipped");
                true
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.pipeline.backend_mut().reconfigure_surface();
                true
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("surface out of memory; closing window");
                false
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout; retrying next frame");
                true
            }
            Err(other) => {
                warn!("surface error: {other:?}; retrying next frame");
                true
            }
        }
    }
}

pub(crate) fn run_window(config: RendererConfig) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title(&config.title)
        .with_inner_size(window_size)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let size = window.inner_size();
    let gpu = GpuState::new(
        window.as_ref(),
        size,
        config.color_space,
        config.gpu_power,
        Box::new(DemoScene::new()),
    )
    .map_err(|err| anyhow!("failed to initialise renderer: {err}"))?;

    let profile = gpu.adapter_profile().clone();
    let surface = gpu.size();
    let mut target_fps = config.target_fps;
    if profile.is_software() && target_fps.is_none() {
        target_fps = Some(SOFTWARE_FPS_CAP);
        warn!(
            adapter = %profile.name,
            backend = ?profile.backend,
            cap = SOFTWARE_FPS_CAP,
            "software rasterizer detected; capping preview to {} FPS (override with --fps)",
            SOFTWARE_FPS_CAP
        );
    }
    let mut scheduler = FrameScheduler::new(target_fps);

    let mut pipeline = PipelineReconfigurator::new(
        gpu,
        config.light_field.clone(),
        (surface.width, surface.height),
    );
    let orbit = OrbitController::default();
    pipeline.set_base_pose(orbit.pose());
    if let Err(err) = pipeline.initialize() {
        error!(error = %err, "failed to build the camera array; adjust the parameters to retry");
    } else {
        info!(
            cameras = pipeline.config().camera_count(),
            resolution = pipeline.config().array.resolution,
            adapter = %profile.name,
            "camera array ready"
        );
    }

    let mut state = WindowState {
        pipeline,
        window,
        orbit,
        mouse: MouseState::default(),
        clock: SystemTimeSource::new(),
        title: config.title.clone(),
    };
    state.refresh_title();
    state.window().request_redraw();

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
            match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state != ElementState::Pressed {
                        return;
                    }
                    if matches!(event.logical_key, Key::Named(NamedKey::Escape)) {
                        elwt.exit();
                        return;
                    }
                    state.handle_key(&event);
                }
                WindowEvent::CursorMoved { position, .. } => {
                    state.handle_cursor_moved(position);
                }
                WindowEvent::MouseInput {
                    state: button_state,
                    button: MouseButton::Left,
                    ..
                } => {
                    state.mouse.handle_button(button_state);
                }
                WindowEvent::MouseWheel { delta, .. } => {
                    state.handle_wheel(delta);
                }
                WindowEvent::Resized(new_size) => {
                    state.resize(new_size);
                }
                WindowEvent::ScaleFactorChanged {
                    mut inner_size_writer,
                    ..
                } => {
                    let _ = inner_size_writer.request_inner_size(state.window().inner_size());
                }
                WindowEvent::RedrawRequested => {
                    if state.render_frame() {
                        scheduler.mark_rendered(Instant::now());
                    } else {
                        elwt.exit();
                    }
                }
                _ => {}
            }
        }
        Event::AboutToWait => {
            let now = Instant::now();
            if scheduler.ready_for_frame(now) {
                tracing::trace!("scheduler: issuing redraw now");
                state.window().request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else if let Some(deadline) = scheduler.next_deadline() {
                elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
            } else {
                elwt.set_control_flow(ControlFlow::Wait);
            }
        }
        Event::LoopExiting => {
            state.pipeline.dispose();
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

#[derive(Default)]
struct MouseState {
    position: Option<PhysicalPosition<f64>>,
    is_pressed: bool,
}

impl MouseState {
    /// Returns the drag delta while the button is held.
    fn moved(&mut self, position: PhysicalPosition<f64>) -> Option<(f64, f64)> {
        let previous = self.position.replace(position);
        if !self.is_pressed {
            return None;
        }
        previous.map(|previous| (position.x - previous.x, position.y - previous.y))
    }

    fn handle_button(&mut self, state: ElementState) {
        self.is_pressed = state == ElementState::Pressed;
    }
}
