//! Lifecycle of the camera array and its compositor chain.
//!
//! ```text
//!   Uninitialized ──initialize──▶ Ready ◀──────────────┐
//!                                  │ change / resize    │ success
//!                                  ▼                    │
//!                              Rebuilding ──────────────┘
//!                                  │ allocation failure
//!                                  ▼
//!                               Degraded  (no frames until the next rebuild succeeds)
//!
//!   any state ──dispose──▶ Disposed
//! ```
//!
//! Everything that can fail without touching GPU memory (validation, focal
//! frame, camera array, texture limits) runs before the previous generation is
//! released, so those failures leave the old generation rendering.

use std::fmt;

use camarray::{
    ArrayAttachment, CameraArray, CameraArrayBuilder, CameraPose, CameraRig, FocalPlaneFrame,
    GeometryError,
};
use dofconfig::{ConfigError, LightFieldConfig, ParameterChange};
use glam::Mat4;

use crate::chain::ChainPlan;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("{what} of {size}x{size} exceeds the device limit of {limit}")]
    TextureTooLarge {
        what: &'static str,
        size: u32,
        limit: u32,
    },
    #[error("failed to allocate {what}: {message}")]
    Allocation { what: &'static str, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("degenerate camera geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("pipeline has been disposed")]
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Rebuilding,
    /// A rebuild failed after the previous generation was released.
    Degraded,
    Disposed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Ready => "ready",
            PipelineState::Rebuilding => "rebuilding",
            PipelineState::Degraded => "degraded",
            PipelineState::Disposed => "disposed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered,
    Skipped(PipelineState),
}

/// GPU side of the pipeline. The reconfigurator decides when resources are
/// created and released; the backend only knows how.
pub trait PipelineBackend {
    type TileTarget;
    type Chain;
    type RenderError;

    fn max_texture_dimension(&self) -> u32;

    fn resize_surface(&mut self, width: u32, height: u32);

    fn allocate_tile_target(&mut self, resolution: u32) -> Result<Self::TileTarget, ResourceError>;

    fn assemble_chain(
        &mut self,
        plan: &ChainPlan,
        tiles: &Self::TileTarget,
        cameras: usize,
    ) -> Result<Self::Chain, ResourceError>;

    fn release_chain(&mut self, chain: Self::Chain);

    fn release_tile_target(&mut self, tiles: Self::TileTarget);

    fn render(
        &mut self,
        tiles: &Self::TileTarget,
        chain: &Self::Chain,
        poses: &[CameraPose],
        elapsed: f32,
    ) -> Result<(), Self::RenderError>;
}

/// Everything built for one configuration.
pub struct Generation<B: PipelineBackend> {
    pub id: u64,
    pub config: LightFieldConfig,
    pub array: CameraArray,
    pub attachment: ArrayAttachment,
    pub plan: ChainPlan,
    pub tiles: B::TileTarget,
    pub chain: B::Chain,
}

pub struct PipelineReconfigurator<B: PipelineBackend> {
    backend: B,
    config: LightFieldConfig,
    surface_size: (u32, u32),
    rig: CameraRig,
    state: PipelineState,
    generation: Option<Generation<B>>,
    next_generation: u64,
    last_error: Option<String>,
}

impl<B: PipelineBackend> PipelineReconfigurator<B> {
    pub fn new(backend: B, config: LightFieldConfig, surface_size: (u32, u32)) -> Self {
        Self {
            backend,
            config,
            surface_size,
            rig: CameraRig::default(),
            state: PipelineState::Uninitialized,
            generation: None,
            next_generation: 1,
            last_error: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &LightFieldConfig {
        &self.config
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    pub fn generation(&self) -> Option<&Generation<B>> {
        self.generation.as_ref()
    }

    pub fn rig(&self) -> &CameraRig {
        &self.rig
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Message of the most recent failed rebuild, cleared on success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Builds the first generation. A `Degraded` pipeline, e.g. after a failed
    /// first allocation, is rebuilt too.
    pub fn initialize(&mut self) -> Result<(), PipelineError> {
        match self.state {
            PipelineState::Disposed => Err(PipelineError::Disposed),
            PipelineState::Uninitialized | PipelineState::Degraded => {
                self.rebuild_with(self.config.clone())
            }
            PipelineState::Ready | PipelineState::Rebuilding => Ok(()),
        }
    }

    /// Validates `change` against the current configuration and rebuilds.
    ///
    /// Invalid changes are rejected before any resource is touched.
    pub fn apply_change(&mut self, change: ParameterChange) -> Result<(), PipelineError> {
        self.ensure_live()?;
        let next = self.config.with_change(change)?;
        tracing::info!(%change, "applying parameter change");
        self.reconfigure(next)
    }

    /// Replaces the whole configuration and rebuilds.
    pub fn reconfigure(&mut self, config: LightFieldConfig) -> Result<(), PipelineError> {
        self.ensure_live()?;
        config.validate()?;
        if self.state == PipelineState::Uninitialized {
            self.config = config;
            return Ok(());
        }
        self.rebuild_with(config)
    }

    /// Zero-sized surfaces (minimised windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), PipelineError> {
        self.ensure_live()?;
        if width == 0 || height == 0 || (width, height) == self.surface_size {
            return Ok(());
        }
        self.surface_size = (width, height);
        self.backend.resize_surface(width, height);
        if self.state == PipelineState::Uninitialized {
            return Ok(());
        }
        self.rebuild_with(self.config.clone())
    }

    /// Rebuilds the current configuration, e.g. to recover from `Degraded`.
    pub fn rebuild(&mut self) -> Result<(), PipelineError> {
        self.ensure_live()?;
        self.rebuild_with(self.config.clone())
    }

    pub fn set_base_pose(&mut self, pose: Mat4) {
        self.rig.set_base_pose(pose);
    }

    /// World-space matrices of every sub-camera in the live generation.
    pub fn camera_poses(&self) -> Vec<CameraPose> {
        match &self.generation {
            Some(generation) => self.rig.poses(&generation.attachment, &generation.array),
            None => Vec::new(),
        }
    }

    pub fn render(&mut self, elapsed: f32) -> Result<FrameOutcome, B::RenderError> {
        if self.state != PipelineState::Ready {
            return Ok(FrameOutcome::Skipped(self.state));
        }
        let Some(generation) = self.generation.as_ref() else {
            return Ok(FrameOutcome::Skipped(self.state));
        };
        let poses = self.rig.poses(&generation.attachment, &generation.array);
        self.backend
            .render(&generation.tiles, &generation.chain, &poses, elapsed)?;
        Ok(FrameOutcome::Rendered)
    }

    pub fn dispose(&mut self) {
        if self.state == PipelineState::Disposed {
            return;
        }
        self.release_generation();
        self.state = PipelineState::Disposed;
        tracing::debug!("pipeline disposed");
    }

    fn ensure_live(&self) -> Result<(), PipelineError> {
        if self.state == PipelineState::Disposed {
            Err(PipelineError::Disposed)
        } else {
            Ok(())
        }
    }

    fn rebuild_with(&mut self, config: LightFieldConfig) -> Result<(), PipelineError> {
        let (width, height) = self.surface_size;
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let frame = FocalPlaneFrame::new(
            aspect,
            config.array.focal_distance,
            config.lens.frame_half_extent,
        );

        let array = match CameraArrayBuilder::from_config(&config).build(&frame) {
            Ok(array) => array,
            Err(err) => return Err(self.reject(err.into())),
        };

        let limit = self.backend.max_texture_dimension();
        if config.array.resolution > limit {
            return Err(self.reject(
                ResourceError::TextureTooLarge {
                    what: "tile texture",
                    size: config.array.resolution,
                    limit,
                }
                .into(),
            ));
        }

        let plan = ChainPlan::assemble(&config, self.surface_size);

        self.state = PipelineState::Rebuilding;
        self.release_generation();

        let tiles = match self.backend.allocate_tile_target(config.array.resolution) {
            Ok(tiles) => tiles,
            Err(err) => return Err(self.degrade(config, err)),
        };
        let chain = match self.backend.assemble_chain(&plan, &tiles, array.len()) {
            Ok(chain) => chain,
            Err(err) => {
                self.backend.release_tile_target(tiles);
                return Err(self.degrade(config, err));
            }
        };

        let attachment = self.rig.attach_array(&array);
        let id = self.next_generation;
        self.next_generation += 1;
        tracing::info!(
            generation = id,
            views = config.array.views,
            resolution = config.array.resolution,
            aperture = config.array.aperture,
            focal_distance = config.array.focal_distance,
            surface = ?self.surface_size,
            "pipeline ready"
        );

        self.config = config.clone();
        self.generation = Some(Generation {
            id,
            config,
            array,
            attachment,
            plan,
            tiles,
            chain,
        });
        self.state = PipelineState::Ready;
        self.last_error = None;
        Ok(())
    }

    fn release_generation(&mut self) {
        if let Some(old) = self.generation.take() {
            let removed = self.rig.detach(old.attachment.root);
            tracing::debug!(generation = old.id, nodes = removed, "releasing pipeline generation");
            self.backend.release_chain(old.chain);
            self.backend.release_tile_target(old.tiles);
        }
    }

    fn reject(&mut self, err: PipelineError) -> PipelineError {
        tracing::warn!(error = %err, state = %self.state, "rebuild rejected; keeping current pipeline");
        self.last_error = Some(err.to_string());
        err
    }

    fn degrade(&mut self, config: LightFieldConfig, err: ResourceError) -> PipelineError {
        tracing::error!(error = %err, "rebuild failed after release; rendering disabled");
        self.config = config;
        self.state = PipelineState::Degraded;
        self.last_error = Some(err.to_string());
        err.into()
    }
}

impl<B: PipelineBackend> Drop for PipelineReconfigurator<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StageKind;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        AllocateTiles(u32),
        AssembleChain { tiles: u32, cameras: usize },
        ReleaseChain(u32),
        ReleaseTiles(u32),
        Render(usize),
        ResizeSurface(u32, u32),
    }

    #[derive(Default)]
    struct FakeBackend {
        events: Vec<Event>,
        live_tiles: Vec<u32>,
        fail_next_allocation: bool,
        fail_next_chain: bool,
    }

    struct FakeTiles(u32);

    struct FakeChain {
        tiles: u32,
        surface_writer: Option<StageKind>,
    }

    impl PipelineBackend for FakeBackend {
        type TileTarget = FakeTiles;
        type Chain = FakeChain;
        type RenderError = ();

        fn max_texture_dimension(&self) -> u32 {
            4096
        }

        fn resize_surface(&mut self, width: u32, height: u32) {
            self.events.push(Event::ResizeSurface(width, height));
        }

        fn allocate_tile_target(&mut self, resolution: u32) -> Result<FakeTiles, ResourceError> {
            self.events.push(Event::AllocateTiles(resolution));
            if std::mem::take(&mut self.fail_next_allocation) {
                return Err(ResourceError::Allocation {
                    what: "tile texture",
                    message: "out of memory".into(),
                });
            }
            self.live_tiles.push(resolution);
            Ok(FakeTiles(resolution))
        }

        fn assemble_chain(
            &mut self,
            plan: &ChainPlan,
            tiles: &FakeTiles,
            cameras: usize,
        ) -> Result<FakeChain, ResourceError> {
            self.events.push(Event::AssembleChain {
                tiles: tiles.0,
                cameras,
            });
            if std::mem::take(&mut self.fail_next_chain) {
                return Err(ResourceError::Allocation {
                    what: "averaging pipeline",
                    message: "shader rejected".into(),
                });
            }
            Ok(FakeChain {
                tiles: tiles.0,
                surface_writer: plan.surface_writer(),
            })
        }

        fn release_chain(&mut self, chain: FakeChain) {
            self.events.push(Event::ReleaseChain(chain.tiles));
        }

        fn release_tile_target(&mut self, tiles: FakeTiles) {
            self.events.push(Event::ReleaseTiles(tiles.0));
            self.live_tiles.retain(|&size| size != tiles.0);
        }

        fn render(
            &mut self,
            _tiles: &FakeTiles,
            _chain: &FakeChain,
            poses: &[CameraPose],
            _elapsed: f32,
        ) -> Result<(), ()> {
            self.events.push(Event::Render(poses.len()));
            Ok(())
        }
    }

    fn ready_pipeline() -> PipelineReconfigurator<FakeBackend> {
        let mut pipeline = PipelineReconfigurator::new(
            FakeBackend::default(),
            LightFieldConfig::default(),
            (1600, 900),
        );
        pipeline.initialize().expect("initial build");
        pipeline.backend_mut().events.clear();
        pipeline
    }

    #[test]
    fn starts_uninitialized_and_skips_frames() {
        let mut pipeline = PipelineReconfigurator::new(
            FakeBackend::default(),
            LightFieldConfig::default(),
            (640, 480),
        );
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        assert_eq!(
            pipeline.render(0.0),
            Ok(FrameOutcome::Skipped(PipelineState::Uninitialized))
        );
        assert!(pipeline.backend().events.is_empty());
    }

    #[test]
    fn initialize_builds_the_default_generation() {
        let mut pipeline = ready_pipeline();
        assert_eq!(pipeline.state(), PipelineState::Ready);
        let generation = pipeline.generation().expect("generation");
        assert_eq!(generation.array.len(), 16);
        assert_eq!(generation.chain.surface_writer, Some(StageKind::Output));
        assert_eq!(pipeline.render(0.5), Ok(FrameOutcome::Rendered));
        assert_eq!(pipeline.backend().events, vec![Event::Render(16)]);
    }

    #[test]
    fn resolution_change_releases_before_allocating() {
        let mut pipeline = ready_pipeline();
        pipeline
            .apply_change(ParameterChange::Resolution(1024))
            .expect("rebuild");

        assert_eq!(
            pipeline.backend().events,
            vec![
                Event::ReleaseChain(4096),
                Event::ReleaseTiles(4096),
                Event::AllocateTiles(1024),
                Event::AssembleChain {
                    tiles: 1024,
                    cameras: 16
                },
            ]
        );
        assert_eq!(pipeline.backend().live_tiles, vec![1024]);

        let generation = pipeline.generation().expect("generation");
        assert_eq!(generation.array.resolution(), 1024);
        assert_eq!(generation.array.len(), 16);
        for camera in &generation.array {
            assert_eq!(camera.viewport.width, 256);
            assert_eq!(camera.viewport.height, 256);
        }
        assert_eq!(pipeline.rig().live_nodes(), 1 + 1 + 16);
    }

    #[test]
    fn invalid_change_is_rejected_without_touching_resources() {
        let mut pipeline = ready_pipeline();
        let err = pipeline
            .apply_change(ParameterChange::Views(0))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(pipeline.backend().events.is_empty());
        assert_eq!(pipeline.config().array.views, 4);
        assert_eq!(pipeline.state(), PipelineState::Ready);
    }

    #[test]
    fn oversized_texture_keeps_previous_generation() {
        let mut pipeline = ready_pipeline();
        let previous_id = pipeline.generation().map(|g| g.id);
        let mut huge = pipeline.config().clone();
        huge.array.resolution = 8192;
        // Bypasses range validation to exercise the device limit check.
        let err = pipeline.rebuild_with(huge).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Resource(ResourceError::TextureTooLarge { .. })
        ));
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.generation().map(|g| g.id), previous_id);
        assert!(pipeline.backend().events.is_empty());
        assert!(pipeline.last_error().is_some());
    }

    #[test]
    fn allocation_failure_degrades_until_next_rebuild() {
        let mut pipeline = ready_pipeline();
        pipeline.backend_mut().fail_next_allocation = true;
        let err = pipeline
            .apply_change(ParameterChange::Aperture(0.1))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Resource(_)));
        assert_eq!(pipeline.state(), PipelineState::Degraded);
        assert!(pipeline.generation().is_none());
        assert!(pipeline.backend().live_tiles.is_empty());
        assert_eq!(
            pipeline.render(1.0),
            Ok(FrameOutcome::Skipped(PipelineState::Degraded))
        );

        pipeline.rebuild().expect("recovery");
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.config().array.aperture, 0.1);
        assert!(pipeline.last_error().is_none());
    }

    #[test]
    fn failed_first_allocation_is_retried_by_initialize() {
        let mut pipeline = PipelineReconfigurator::new(
            FakeBackend::default(),
            LightFieldConfig::default(),
            (800, 600),
        );
        pipeline.backend_mut().fail_next_allocation = true;
        assert!(pipeline.initialize().is_err());
        assert_eq!(pipeline.state(), PipelineState::Degraded);
        assert!(pipeline.generation().is_none());

        pipeline.initialize().expect("second attempt");
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(
            pipeline.backend().events,
            vec![
                Event::AllocateTiles(4096),
                Event::AllocateTiles(4096),
                Event::AssembleChain {
                    tiles: 4096,
                    cameras: 16
                },
            ]
        );

        pipeline.backend_mut().events.clear();
        pipeline.initialize().expect("already ready");
        assert!(pipeline.backend().events.is_empty());
    }

    #[test]
    fn chain_failure_releases_fresh_tiles() {
        let mut pipeline = ready_pipeline();
        pipeline.backend_mut().fail_next_chain = true;
        assert!(pipeline.apply_change(ParameterChange::Views(2)).is_err());
        assert_eq!(pipeline.state(), PipelineState::Degraded);
        assert!(pipeline.backend().live_tiles.is_empty());
        assert_eq!(
            pipeline.backend().events.last(),
            Some(&Event::ReleaseTiles(4096))
        );
        assert_eq!(pipeline.rig().live_nodes(), 1);
    }

    #[test]
    fn resize_rebuilds_with_new_aspect() {
        let mut pipeline = ready_pipeline();
        let before = *pipeline.generation().expect("generation").array.frame();
        pipeline.resize(900, 900).expect("resize");
        let after = *pipeline.generation().expect("generation").array.frame();
        assert_eq!(pipeline.backend().events[0], Event::ResizeSurface(900, 900));
        assert!(after.bottom_right.x < before.bottom_right.x);
        assert_eq!(after.top_left.y, before.top_left.y);

        pipeline.backend_mut().events.clear();
        pipeline.resize(0, 0).expect("minimise");
        assert!(pipeline.backend().events.is_empty());
    }

    #[test]
    fn dispose_releases_everything() {
        let mut pipeline = ready_pipeline();
        pipeline.dispose();
        assert_eq!(pipeline.state(), PipelineState::Disposed);
        assert!(pipeline.backend().live_tiles.is_empty());
        assert_eq!(pipeline.rig().live_nodes(), 1);
        assert!(matches!(
            pipeline.apply_change(ParameterChange::Views(2)),
            Err(PipelineError::Disposed)
        ));
        assert_eq!(
            pipeline.render(0.0),
            Ok(FrameOutcome::Skipped(PipelineState::Disposed))
        );
    }

    #[test]
    fn base_pose_moves_every_sub_camera() {
        let mut pipeline = ready_pipeline();
        let before = pipeline.camera_poses();
        pipeline.set_base_pose(Mat4::from_translation(glam::Vec3::new(0.0, 0.0, 5.0)));
        let after = pipeline.camera_poses();
        assert_eq!(before.len(), 16);
        for (old, new) in before.iter().zip(&after) {
            assert!((new.eye.z - old.eye.z - 5.0).abs() < 1e-5);
        }
    }
}
