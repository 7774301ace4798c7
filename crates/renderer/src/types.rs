use dofconfig::LightFieldConfig;

/// Output color handling for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpaceMode {
    /// Prefer an sRGB swapchain and let the hardware encode.
    #[default]
    Auto,
    /// Use a non-sRGB swapchain and gamma-encode in the final shader.
    Gamma,
    /// Use an sRGB swapchain; shaders write linear values.
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Summary of the adapter picked at start-up.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension: u32,
}

impl AdapterProfile {
    pub fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Camera array, lens and output settings.
    pub light_field: LightFieldConfig,
    pub color_space: ColorSpaceMode,
    pub gpu_power: GpuPowerPreference,
    /// Optional FPS cap; None = render every redraw.
    pub target_fps: Option<f32>,
    pub title: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            light_field: LightFieldConfig::default(),
            color_space: ColorSpaceMode::default(),
            gpu_power: GpuPowerPreference::default(),
            target_fps: None,
            title: "dofcam".to_string(),
        }
    }
}
