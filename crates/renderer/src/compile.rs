use std::borrow::Cow;

use wgpu::naga::ShaderStage;

pub(crate) fn compile_glsl(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
    stage: ShaderStage,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage,
            defines: &[],
        },
    })
}

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    compile_glsl(
        device,
        "fullscreen triangle vertex",
        FULLSCREEN_VERTEX_GLSL,
        ShaderStage::Vertex,
    )
}

/// Minimal full-screen triangle vertex shader.
///
/// `v_uv` follows texture orientation: `(0, 0)` is the top-left texel.
pub(crate) const FULLSCREEN_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = vec2(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// Box filter over the `views x views` tile grid.
///
/// Layout must match [`AverageUniforms`](crate::gpu::uniforms::AverageUniforms).
pub(crate) const AVERAGE_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 0) uniform texture2D tile_texture;
layout(set = 0, binding = 1) uniform sampler tile_sampler;
layout(std140, set = 0, binding = 2) uniform AverageParams {
    int views;
    float encode_gamma;
    vec2 _padding;
} params;

void main() {
    float n = float(params.views);
    vec4 acc = vec4(0.0);
    for (int j = 0; j < params.views; ++j) {
        for (int i = 0; i < params.views; ++i) {
            vec2 uv = (v_uv + vec2(float(i), float(j))) / n;
            acc += texture(sampler2D(tile_texture, tile_sampler), uv);
        }
    }
    vec4 color = acc / (n * n);
    if (params.encode_gamma > 0.5) {
        color.rgb = pow(max(color.rgb, vec3(0.0)), vec3(1.0 / 2.2));
    }
    out_color = color;
}
";

/// ACES filmic tone map plus optional gamma encode.
///
/// Layout must match [`OutputUniforms`](crate::gpu::uniforms::OutputUniforms).
pub(crate) const OUTPUT_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 0) uniform texture2D source_texture;
layout(set = 0, binding = 1) uniform sampler source_sampler;
layout(std140, set = 0, binding = 2) uniform OutputParams {
    float exposure;
    float encode_gamma;
    vec2 _padding;
} params;

const float ACES_A = 2.51;
const float ACES_B = 0.03;
const float ACES_C = 2.43;
const float ACES_D = 0.59;
const float ACES_E = 0.14;

vec3 aces_filmic(vec3 x) {
    return clamp((x * (ACES_A * x + ACES_B)) / (x * (ACES_C * x + ACES_D) + ACES_E), 0.0, 1.0);
}

void main() {
    vec4 hdr = texture(sampler2D(source_texture, source_sampler), v_uv);
    vec3 color = aces_filmic(max(hdr.rgb, vec3(0.0)) * params.exposure);
    if (params.encode_gamma > 0.5) {
        color = pow(color, vec3(1.0 / 2.2));
    }
    out_color = vec4(color, 1.0);
}
";

/// Instanced cube field used by [`DemoScene`](crate::scene::DemoScene).
pub(crate) const SCENE_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec3 a_normal;
layout(location = 2) in vec4 i_placement;
layout(location = 3) in vec4 i_color;

layout(std140, set = 0, binding = 0) uniform Camera {
    mat4 view_projection;
    vec4 eye;
} camera;

layout(std140, set = 1, binding = 0) uniform SceneParams {
    vec4 light_direction;
    vec4 time;
} scene;

layout(location = 0) out vec3 v_normal;
layout(location = 1) out vec3 v_world;
layout(location = 2) out vec3 v_albedo;

void main() {
    float angle = scene.time.x * i_color.a;
    float c = cos(angle);
    float s = sin(angle);
    mat3 spin = mat3(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c);
    vec3 world = i_placement.xyz + spin * (a_position * i_placement.w);
    v_normal = spin * a_normal;
    v_world = world;
    v_albedo = i_color.rgb;
    gl_Position = camera.view_projection * vec4(world, 1.0);
}
";

pub(crate) const SCENE_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec3 v_normal;
layout(location = 1) in vec3 v_world;
layout(location = 2) in vec3 v_albedo;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Camera {
    mat4 view_projection;
    vec4 eye;
} camera;

layout(std140, set = 1, binding = 0) uniform SceneParams {
    vec4 light_direction;
    vec4 time;
} scene;

void main() {
    vec3 n = normalize(v_normal);
    vec3 l = normalize(-scene.light_direction.xyz);
    vec3 v = normalize(camera.eye.xyz - v_world);
    vec3 h = normalize(l + v);
    float diffuse = max(dot(n, l), 0.0);
    float specular = pow(max(dot(n, h), 0.0), 48.0);
    vec3 color = v_albedo * (0.08 + diffuse * scene.light_direction.w) + vec3(specular * 0.5);
    out_color = vec4(color, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::naga::front::glsl::{Frontend, Options};
    use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

    fn validate(source: &str, stage: ShaderStage) {
        let module = Frontend::default()
            .parse(&Options::from(stage), source)
            .expect("parse glsl");
        Validator::new(ValidationFlags::all(), Capabilities::default())
            .validate(&module)
            .expect("validate module");
    }

    #[test]
    fn fullscreen_vertex_is_valid() {
        validate(FULLSCREEN_VERTEX_GLSL, ShaderStage::Vertex);
    }

    #[test]
    fn compositor_fragments_are_valid() {
        validate(AVERAGE_FRAGMENT_GLSL, ShaderStage::Fragment);
        validate(OUTPUT_FRAGMENT_GLSL, ShaderStage::Fragment);
    }

    #[test]
    fn scene_shaders_are_valid() {
        validate(SCENE_VERTEX_GLSL, ShaderStage::Vertex);
        validate(SCENE_FRAGMENT_GLSL, ShaderStage::Fragment);
    }

    #[test]
    fn averaging_divides_once_after_the_loop() {
        let loop_end = AVERAGE_FRAGMENT_GLSL
            .rfind("acc +=")
            .expect("accumulation");
        let division = AVERAGE_FRAGMENT_GLSL
            .find("acc / (n * n)")
            .expect("division");
        assert!(division > loop_end);
        assert_eq!(AVERAGE_FRAGMENT_GLSL.matches("/ (n * n)").count(), 1);
    }
}
