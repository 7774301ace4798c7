//! The ordered passes of one pipeline generation.

use camarray::CameraPose;
use wgpu::naga::ShaderStage;
use wgpu::util::DeviceExt;

use crate::chain::{ChainPlan, StageKind, StageTarget};
use crate::compile::{compile_glsl, AVERAGE_FRAGMENT_GLSL, OUTPUT_FRAGMENT_GLSL};
use crate::scene::SceneRenderer;

use super::pipeline::{create_fullscreen_pipeline, create_source_bind_group, SharedLayouts};
use super::targets::{ColorTarget, TileTarget, HDR_FORMAT};
use super::uniforms::{
    camera_stride, gamma_flag, pack_cameras, AverageUniforms, CameraUniforms, OutputUniforms,
};

/// Borrowed view of everything a stage may touch while recording a frame.
pub(crate) struct StageContext<'a> {
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub queue: &'a wgpu::Queue,
    pub surface_view: &'a wgpu::TextureView,
    pub tiles: &'a TileTarget,
    pub intermediate: Option<&'a ColorTarget>,
    pub scene: &'a dyn SceneRenderer,
    pub poses: &'a [CameraPose],
}

impl<'a> StageContext<'a> {
    fn color_view(&self, target: StageTarget) -> Option<&'a wgpu::TextureView> {
        match target {
            StageTarget::Tiles => Some(&self.tiles.color.view),
            StageTarget::Intermediate => self.intermediate.map(|target| &target.view),
            StageTarget::Surface => Some(self.surface_view),
        }
    }
}

/// Formats and flags the chain needs from the surface.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SurfaceInfo {
    pub format: wgpu::TextureFormat,
    /// The swapchain does not encode sRGB itself.
    pub encode_gamma: bool,
}

pub(crate) struct SceneStage {
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    stride: u64,
    capacity: usize,
}

impl SceneStage {
    fn new(device: &wgpu::Device, layouts: &SharedLayouts, cameras: usize) -> Self {
        let stride = camera_stride(device.limits().min_uniform_buffer_offset_alignment);
        let capacity = cameras.max(1);
        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sub-camera uniforms"),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sub-camera bind group"),
            layout: &layouts.camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &camera_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<CameraUniforms>() as u64),
                }),
            }],
        });
        Self {
            camera_buffer,
            camera_bind_group,
            stride,
            capacity,
        }
    }

    fn execute(&self, ctx: &mut StageContext<'_>) {
        let poses = &ctx.poses[..ctx.poses.len().min(self.capacity)];
        if poses.len() < ctx.poses.len() {
            tracing::warn!(
                poses = ctx.poses.len(),
                capacity = self.capacity,
                "more sub-cameras than the uniform buffer holds; extra views skipped"
            );
        }
        ctx.queue
            .write_buffer(&self.camera_buffer, 0, &pack_cameras(poses, self.stride));

        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tiled scene pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &ctx.tiles.color.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(ctx.scene.clear_color()),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &ctx.tiles.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        for (index, pose) in poses.iter().enumerate() {
            let viewport = pose.viewport;
            if viewport.width == 0 || viewport.height == 0 {
                continue;
            }
            let [x, y, width, height] = viewport.to_f32();
            pass.set_viewport(x, y, width, height, 0.0, 1.0);
            pass.set_scissor_rect(viewport.x, viewport.y, viewport.width, viewport.height);
            let offset = (index as u64 * self.stride) as u32;
            pass.set_bind_group(0, &self.camera_bind_group, &[offset]);
            ctx.scene.draw(&mut pass);
        }
    }

    fn dispose(self) {
        self.camera_buffer.destroy();
    }
}

/// A full-screen triangle sampling one texture into one target.
pub(crate) struct FullscreenStage {
    label: &'static str,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    params: wgpu::Buffer,
    target: StageTarget,
}

impl FullscreenStage {
    #[allow(clippy::too_many_arguments)]
    fn new(
        device: &wgpu::Device,
        layouts: &SharedLayouts,
        label: &'static str,
        fragment: &'static str,
        params: &[u8],
        source: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        target: StageTarget,
        format: wgpu::TextureFormat,
    ) -> Self {
        let module = compile_glsl(device, label, fragment, ShaderStage::Fragment);
        let pipeline = create_fullscreen_pipeline(device, layouts, label, &module, format);
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: params,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = create_source_bind_group(device, layouts, label, source, sampler, &params);
        Self {
            label,
            pipeline,
            bind_group,
            params,
            target,
        }
    }

    /// Box filter over the `views x views` tiles of `source`.
    #[allow(clippy::too_many_arguments)]
    fn averaging(
        device: &wgpu::Device,
        layouts: &SharedLayouts,
        views: u32,
        encode_gamma: bool,
        source: &wgpu::TextureView,
        target: StageTarget,
        format: wgpu::TextureFormat,
    ) -> Self {
        let params = AverageUniforms {
            views: views as i32,
            encode_gamma: gamma_flag(encode_gamma),
            _padding: [0.0; 2],
        };
        Self::new(
            device,
            layouts,
            "averaging pass",
            AVERAGE_FRAGMENT_GLSL,
            bytemuck::bytes_of(&params),
            source,
            &layouts.nearest_sampler,
            target,
            format,
        )
    }

    fn execute(&self, ctx: &mut StageContext<'_>) {
        let Some(view) = ctx.color_view(self.target) else {
            tracing::warn!(stage = self.label, target = ?self.target, "stage target missing; pass skipped");
            return;
        };
        self.record(ctx.encoder, view);
    }

    fn record(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(self.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    fn dispose(self) {
        self.params.destroy();
    }
}

pub(crate) enum PipelineStage {
    Scene(SceneStage),
    Average(FullscreenStage),
    Output(FullscreenStage),
}

impl PipelineStage {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Scene(_) => StageKind::Scene,
            Self::Average(_) => StageKind::Average,
            Self::Output(_) => StageKind::Output,
        }
    }

    pub fn execute(&self, ctx: &mut StageContext<'_>) {
        match self {
            Self::Scene(stage) => stage.execute(ctx),
            Self::Average(stage) | Self::Output(stage) => stage.execute(ctx),
        }
    }

    pub fn dispose(self) {
        match self {
            Self::Scene(stage) => stage.dispose(),
            Self::Average(stage) | Self::Output(stage) => stage.dispose(),
        }
    }
}

/// Every pass of one generation plus the averaged image between them.
pub(crate) struct StageChain {
    stages: Vec<PipelineStage>,
    intermediate: Option<ColorTarget>,
}

impl StageChain {
    pub(crate) fn build(
        device: &wgpu::Device,
        layouts: &SharedLayouts,
        plan: &ChainPlan,
        tiles: &TileTarget,
        cameras: usize,
        surface: SurfaceInfo,
    ) -> Self {
        let intermediate = plan.needs_intermediate().then(|| {
            ColorTarget::new(device, "averaged color", plan.resolution, plan.resolution)
        });
        let format_for = |target: StageTarget| match target {
            StageTarget::Surface => surface.format,
            StageTarget::Tiles | StageTarget::Intermediate => HDR_FORMAT,
        };
        let encode_for = |target: StageTarget| target == StageTarget::Surface && surface.encode_gamma;

        let mut stages = Vec::with_capacity(plan.stages.len());
        for stage in &plan.stages {
            match stage.kind {
                StageKind::Scene => {
                    stages.push(PipelineStage::Scene(SceneStage::new(device, layouts, cameras)));
                }
                StageKind::Average => {
                    stages.push(PipelineStage::Average(FullscreenStage::averaging(
                        device,
                        layouts,
                        plan.views,
                        encode_for(stage.target),
                        &tiles.color.view,
                        stage.target,
                        format_for(stage.target),
                    )));
                }
                StageKind::Output => {
                    let Some(source) = intermediate.as_ref() else {
                        tracing::warn!("output stage planned without an averaged image; skipped");
                        continue;
                    };
                    let params = OutputUniforms {
                        exposure: plan.exposure,
                        encode_gamma: gamma_flag(encode_for(stage.target)),
                        _padding: [0.0; 2],
                    };
                    stages.push(PipelineStage::Output(FullscreenStage::new(
                        device,
                        layouts,
                        "output pass",
                        OUTPUT_FRAGMENT_GLSL,
                        bytemuck::bytes_of(&params),
                        &source.view,
                        &layouts.linear_sampler,
                        stage.target,
                        format_for(stage.target),
                    )));
                }
            }
        }

        tracing::debug!(
            stages = ?stages.iter().map(PipelineStage::kind).collect::<Vec<_>>(),
            intermediate = intermediate.is_some(),
            "assembled stage chain"
        );
        Self {
            stages,
            intermediate,
        }
    }

    pub(crate) fn intermediate(&self) -> Option<&ColorTarget> {
        self.intermediate.as_ref()
    }

    pub(crate) fn execute(&self, ctx: &mut StageContext<'_>) {
        for stage in &self.stages {
            stage.execute(ctx);
        }
    }

    pub(crate) fn release(self) {
        for stage in self.stages {
            stage.dispose();
        }
        if let Some(intermediate) = self.intermediate {
            intermediate.release();
        }
    }
}
