//! wgpu side of the light field pipeline.
//!
//! - `context` owns the instance, device and swapchain and reconfigures the
//!   surface on resize.
//! - `targets` holds the square tile texture and the averaged image.
//! - `pipeline` builds the shared bind group layouts, samplers and full-screen
//!   pipelines.
//! - `uniforms` mirrors the GLSL blocks and packs sub-camera matrices at the
//!   device's dynamic offset alignment.
//! - `stages` records the scene, averaging and output passes in plan order.
//! - `state` glues everything together as the `PipelineBackend` driven by the
//!   reconfigurator.

mod context;
mod pipeline;
mod stages;
mod state;
mod targets;
pub(crate) mod uniforms;

pub(crate) use state::GpuState;
pub use targets::TileTarget;
