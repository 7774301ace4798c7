use dofconfig::LightFieldConfig;
use glam::{Mat4, Vec2, Vec3};

use crate::projector::{FocalPlaneFrame, GeometryError, OffAxisProjector};

/// Pixel rectangle on the tile texture, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ViewportRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// `(x, y, width, height)` for `RenderPass::set_viewport`.
    pub fn to_f32(&self) -> [f32; 4] {
        [
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        ]
    }
}

/// Viewport of grid cell `(x, y)`: floored origin, ceiled extent.
///
/// The union of all cells covers the whole texture and never extends past it.
/// When `resolution` is not a multiple of `views`, adjacent cells overlap by
/// one pixel.
pub fn tile_viewport(x: u32, y: u32, views: u32, resolution: u32) -> ViewportRect {
    let origin = |index: u32| (u64::from(index) * u64::from(resolution) / u64::from(views)) as u32;
    let extent = resolution.div_ceil(views);
    ViewportRect {
        x: origin(x),
        y: origin(y),
        width: extent,
        height: extent,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubCamera {
    /// Grid cell, `(column, row)`.
    pub cell: (u32, u32),
    pub eye_offset: Vec2,
    pub viewport: ViewportRect,
    pub projection: Mat4,
    pub view: Mat4,
    pub local: Mat4,
}

impl SubCamera {
    pub fn eye(&self) -> Vec3 {
        self.eye_offset.extend(0.0)
    }
}

/// `views²` sub-cameras in row-major order sharing one focal plane.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraArray {
    views: u32,
    resolution: u32,
    frame: FocalPlaneFrame,
    cameras: Vec<SubCamera>,
}

impl CameraArray {
    pub fn views(&self) -> u32 {
        self.views
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn frame(&self) -> &FocalPlaneFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SubCamera> {
        self.cameras.iter()
    }

    pub fn cameras(&self) -> &[SubCamera] {
        &self.cameras
    }

    pub fn tile_extent(&self) -> u32 {
        self.resolution.div_ceil(self.views)
    }
}

impl<'a> IntoIterator for &'a CameraArray {
    type Item = &'a SubCamera;
    type IntoIter = std::slice::Iter<'a, SubCamera>;

    fn into_iter(self) -> Self::IntoIter {
        self.cameras.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraArrayBuilder {
    views: u32,
    resolution: u32,
    aperture: f32,
    projector: OffAxisProjector,
    flip_y: bool,
}

impl CameraArrayBuilder {
    pub fn new(views: u32, resolution: u32, aperture: f32) -> Self {
        Self {
            views,
            resolution,
            aperture,
            projector: OffAxisProjector::default(),
            flip_y: false,
        }
    }

    pub fn from_config(config: &LightFieldConfig) -> Self {
        Self::new(
            config.array.views,
            config.array.resolution,
            config.array.aperture,
        )
        .projector(OffAxisProjector::new(config.lens.near, config.lens.far))
        .flip_y(config.lens.flip_y)
    }

    pub fn projector(mut self, projector: OffAxisProjector) -> Self {
        self.projector = projector;
        self
    }

    pub fn flip_y(mut self, flip_y: bool) -> Self {
        self.flip_y = flip_y;
        self
    }

    /// Eye offset of grid cell `(x, y)` relative to the base camera origin.
    pub fn eye_offset(&self, x: u32, y: u32) -> Vec2 {
        let n = self.views as f32;
        Vec2::new(
            (x as f32 / n - 0.5) * self.aperture,
            (y as f32 / n - 0.5) * self.aperture,
        )
    }

    pub fn build(&self, frame: &FocalPlaneFrame) -> Result<CameraArray, GeometryError> {
        if self.views == 0 || self.resolution == 0 {
            return Err(GeometryError::EmptyGrid);
        }

        let mut cameras = Vec::with_capacity((self.views * self.views) as usize);
        for y in 0..self.views {
            for x in 0..self.views {
                let eye_offset = self.eye_offset(x, y);
                let off_axis = self
                    .projector
                    .project(eye_offset.extend(0.0), frame, self.flip_y)?;
                cameras.push(SubCamera {
                    cell: (x, y),
                    eye_offset,
                    viewport: tile_viewport(x, y, self.views, self.resolution),
                    projection: off_axis.projection,
                    view: off_axis.view,
                    local: off_axis.local,
                });
            }
        }

        tracing::debug!(
            views = self.views,
            resolution = self.resolution,
            aperture = self.aperture,
            cameras = cameras.len(),
            "built camera array"
        );

        Ok(CameraArray {
            views: self.views,
            resolution: self.resolution,
            frame: *frame,
            cameras,
        })
    }
}
