//! Renderer crate for dofcam, a light field depth-of-field camera.
//!
//! A square grid of off-axis sub-cameras renders the scene into tiles of one
//! large texture; a full-screen pass then averages the tiles into the final
//! image, so everything off the shared focal plane blurs by parallax.
//!
//! ```text
//!   CLI / dofcam
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ window loop ──▶ PipelineReconfigurator ──▶ GpuState
//!          ▲                │ keys, drag, resize   │ rebuild     │
//!          │                └──────────────────────┘             ▼
//!          │                                  scene ─▶ average ─▶ output ─▶ surface
//! ```
//!
//! [`PipelineReconfigurator`] owns the camera rig and decides when GPU
//! resources are released and rebuilt; the wgpu backend behind it only knows
//! how. The state machine is generic over [`PipelineBackend`] so it runs
//! without a GPU in tests.

mod chain;
mod compile;
mod controls;
mod gpu;
mod reconfigure;
mod runtime;
mod scene;
mod types;
mod window;

use anyhow::Result;

pub use chain::{ChainPlan, StageKind, StagePlan, StageTarget};
pub use controls::{action_for_key, ControlAction, OrbitController};
pub use gpu::TileTarget;
pub use reconfigure::{
    FrameOutcome, Generation, PipelineBackend, PipelineError, PipelineReconfigurator,
    PipelineState, ResourceError,
};
pub use runtime::{FrameScheduler, SystemTimeSource, TimeSample, TimeSource};
pub use scene::{DemoScene, SceneRenderer, SceneTargets};
pub use types::{AdapterProfile, ColorSpaceMode, GpuPowerPreference, RendererConfig};

/// High-level entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Opens the preview window and blocks until it closes.
    ///
    /// Fails when no window or GPU adapter can be created.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!(
            size = ?self.config.surface_size,
            views = self.config.light_field.array.views,
            resolution = self.config.light_field.array.resolution,
            "starting dofcam preview"
        );
        window::run_window(self.config.clone())
    }
}
