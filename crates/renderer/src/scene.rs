//! Scene collaborator drawn once per sub-camera by the tiled render stage.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use wgpu::naga::ShaderStage;
use wgpu::util::DeviceExt;

use crate::compile::{compile_glsl, SCENE_FRAGMENT_GLSL, SCENE_VERTEX_GLSL};
use crate::gpu::uniforms::SceneUniforms;

/// Formats and layouts a scene must build its pipelines against.
pub struct SceneTargets<'a> {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    /// Bind group 0: the current sub-camera (`mat4 view_projection; vec4 eye;`).
    pub camera_layout: &'a wgpu::BindGroupLayout,
}

/// Anything that can be drawn into the tile texture.
///
/// `draw` is called once per sub-camera with the viewport, scissor and camera
/// bind group already set; it must not touch bind group 0.
pub trait SceneRenderer {
    fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        targets: &SceneTargets<'_>,
    ) -> Result<()>;

    /// Called once per frame before any sub-camera is drawn.
    fn update(&mut self, queue: &wgpu::Queue, elapsed: f32);

    fn clear_color(&self) -> wgpu::Color {
        wgpu::Color {
            r: 0.02,
            g: 0.02,
            b: 0.025,
            a: 1.0,
        }
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>);
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct SceneVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct CubeInstance {
    /// xyz centre, w edge half-length.
    pub placement: [f32; 4],
    /// rgb albedo, a spin in radians per second.
    pub color: [f32; 4],
}

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![2 => Float32x4, 3 => Float32x4];

struct DemoResources {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    instance_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    params_bind_group: wgpu::BindGroup,
    vertex_count: u32,
    instance_count: u32,
}

/// A field of spinning cubes spread in depth around the origin.
pub struct DemoScene {
    light_direction: [f32; 4],
    resources: Option<DemoResources>,
}

impl DemoScene {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for DemoScene {
    fn default() -> Self {
        Self {
            light_direction: [-0.4, -1.0, -0.6, 1.2],
            resources: None,
        }
    }
}

impl SceneRenderer for DemoScene {
    fn prepare(
        &mut self,
        device: &wgpu::Device,
        _queue: &wgpu::Queue,
        targets: &SceneTargets<'_>,
    ) -> Result<()> {
        let vertices = cube_vertices();
        let instances = demo_instances();

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("demo cube vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("demo cube instances"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let params = SceneUniforms {
            light_direction: self.light_direction,
            time: [0.0; 4],
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("demo scene params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("demo scene layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("demo scene bind group"),
            layout: &params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        let vertex_module = compile_glsl(
            device,
            "demo scene vertex",
            SCENE_VERTEX_GLSL,
            ShaderStage::Vertex,
        );
        let fragment_module = compile_glsl(
            device,
            "demo scene fragment",
            SCENE_FRAGMENT_GLSL,
            ShaderStage::Fragment,
        );
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("demo scene pipeline layout"),
            bind_group_layouts: &[targets.camera_layout, &params_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("demo scene pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<SceneVertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<CubeInstance>() as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &INSTANCE_ATTRIBUTES,
                    },
                ],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: targets.depth_format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: targets.color_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        tracing::debug!(
            vertices = vertices.len(),
            instances = instances.len(),
            "prepared demo scene"
        );

        self.resources = Some(DemoResources {
            pipeline,
            vertex_buffer,
            instance_buffer,
            params_buffer,
            params_bind_group,
            vertex_count: vertices.len() as u32,
            instance_count: instances.len() as u32,
        });
        Ok(())
    }

    fn update(&mut self, queue: &wgpu::Queue, elapsed: f32) {
        if let Some(resources) = &self.resources {
            let params = SceneUniforms {
                light_direction: self.light_direction,
                time: [elapsed, 0.0, 0.0, 0.0],
            };
            queue.write_buffer(&resources.params_buffer, 0, bytemuck::bytes_of(&params));
        }
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        let Some(resources) = &self.resources else {
            return;
        };
        pass.set_pipeline(&resources.pipeline);
        pass.set_bind_group(1, &resources.params_bind_group, &[]);
        pass.set_vertex_buffer(0, resources.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, resources.instance_buffer.slice(..));
        pass.draw(0..resources.vertex_count, 0..resources.instance_count);
    }
}

/// Unit cube (`-1..1`) as 12 triangles with flat normals.
pub(crate) fn cube_vertices() -> Vec<SceneVertex> {
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
    ];
    let mut vertices = Vec::with_capacity(36);
    for (normal, u, v) in FACES {
        let corner = |su: f32, sv: f32| SceneVertex {
            position: std::array::from_fn(|axis| normal[axis] + u[axis] * su + v[axis] * sv),
            normal,
        };
        let quad = [
            corner(-1.0, -1.0),
            corner(1.0, -1.0),
            corner(1.0, 1.0),
            corner(-1.0, 1.0),
        ];
        vertices.extend_from_slice(&[quad[0], quad[1], quad[2], quad[0], quad[2], quad[3]]);
    }
    vertices
}

/// A 7x7 grid of small cubes on the ground plane plus a larger one at the origin.
pub(crate) fn demo_instances() -> Vec<CubeInstance> {
    let mut instances = vec![CubeInstance {
        placement: [0.0, 0.0, 0.0, 0.22],
        color: [0.9, 0.9, 0.85, 0.4],
    }];
    for row in -3i32..=3 {
        for column in -3i32..=3 {
            if row == 0 && column == 0 {
                continue;
            }
            let hue = ((row + 3) * 7 + (column + 3)) as f32 / 49.0;
            instances.push(CubeInstance {
                placement: [
                    column as f32 * 0.7,
                    -0.25 + 0.08 * ((row * column) % 3) as f32,
                    row as f32 * 0.7,
                    0.12,
                ],
                color: [
                    0.5 + 0.5 * (hue * std::f32::consts::TAU).cos(),
                    0.5 + 0.5 * ((hue + 1.0 / 3.0) * std::f32::consts::TAU).cos(),
                    0.5 + 0.5 * ((hue + 2.0 / 3.0) * std::f32::consts::TAU).cos(),
                    0.2 + 0.1 * (row - column).rem_euclid(4) as f32,
                ],
            });
        }
    }
    instances
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_twelve_triangles_on_its_surface() {
        let vertices = cube_vertices();
        assert_eq!(vertices.len(), 36);
        for vertex in &vertices {
            let on_face = vertex
                .position
                .iter()
                .zip(vertex.normal)
                .any(|(p, n)| n != 0.0 && *p == n);
            assert!(on_face, "{vertex:?}");
            assert!(vertex.position.iter().all(|p| p.abs() == 1.0));
        }
    }

    #[test]
    fn demo_field_surrounds_the_focal_point() {
        let instances = demo_instances();
        assert_eq!(instances.len(), 49);
        assert_eq!(instances[0].placement[..3], [0.0, 0.0, 0.0]);
        assert!(instances
            .iter()
            .all(|instance| instance.color[..3].iter().all(|c| (0.0..=1.0).contains(c))));
    }
}
