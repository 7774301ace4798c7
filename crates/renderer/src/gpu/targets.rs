//! Offscreen textures owned by one pipeline generation.

/// HDR color format for the tile texture and the averaged image.
pub(crate) const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub(crate) struct ColorTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl ColorTarget {
    pub fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HDR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    pub fn release(self) {
        self.texture.destroy();
    }
}

/// Square `resolution x resolution` target holding every sub-camera tile.
pub struct TileTarget {
    pub(crate) color: ColorTarget,
    pub(crate) depth: wgpu::Texture,
    pub(crate) depth_view: wgpu::TextureView,
    resolution: u32,
}

impl TileTarget {
    pub(crate) fn new(device: &wgpu::Device, resolution: u32) -> Self {
        let color = ColorTarget::new(device, "tile color", resolution, resolution);
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tile depth"),
            size: extent(resolution, resolution),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            color,
            depth,
            depth_view,
            resolution,
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub(crate) fn release(self) {
        self.color.release();
        self.depth.destroy();
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    }
}
