//! Generalised (Kooima) off-axis perspective projection.
//!
//! Every camera produced here looks through the same rectangle, so points on
//! that rectangle land on identical normalised device coordinates no matter
//! where the eye sits. Clip-space depth follows wgpu conventions (`0..=1`).

use glam::{Mat3, Mat4, Vec3, Vec4};

/// Smallest eye-to-plane distance accepted before a frame counts as degenerate.
pub const MIN_PLANE_DISTANCE: f32 = 1e-5;

const MIN_EDGE_LENGTH: f32 = 1e-6;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("eye is {distance} units from the focal plane (minimum {MIN_PLANE_DISTANCE})")]
    DegenerateDistance { distance: f32 },
    #[error("focal plane frame has collapsed or parallel edges")]
    DegenerateFrame,
    #[error("camera array needs at least one view and a non-zero resolution")]
    EmptyGrid,
}

/// Three corners of the rectangle every sub-camera frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocalPlaneFrame {
    pub bottom_left: Vec3,
    pub bottom_right: Vec3,
    pub top_left: Vec3,
}

impl FocalPlaneFrame {
    /// Rectangle centred on the base camera's forward axis at `focal_distance`.
    ///
    /// `half_extent` is the half height at unit distance; the width follows
    /// `aspect`.
    pub fn new(aspect: f32, focal_distance: f32, half_extent: f32) -> Self {
        let half_width = half_extent * aspect;
        Self {
            bottom_left: Vec3::new(-half_width, -half_extent, -1.0) * focal_distance,
            bottom_right: Vec3::new(half_width, -half_extent, -1.0) * focal_distance,
            top_left: Vec3::new(-half_width, half_extent, -1.0) * focal_distance,
        }
    }

    pub fn from_corners(bottom_left: Vec3, bottom_right: Vec3, top_left: Vec3) -> Self {
        Self {
            bottom_left,
            bottom_right,
            top_left,
        }
    }

    pub fn top_right(&self) -> Vec3 {
        self.bottom_right + self.top_left - self.bottom_left
    }

    pub fn corners(&self) -> [Vec3; 4] {
        [
            self.bottom_left,
            self.bottom_right,
            self.top_left,
            self.top_right(),
        ]
    }
}

/// Frustum bounds at the near plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumExtents {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl FrustumExtents {
    /// Right-handed perspective frustum mapping depth to `0..=1`.
    pub fn to_projection(&self) -> Mat4 {
        let Self {
            left: l,
            right: r,
            bottom: b,
            top: t,
            near: n,
            far: f,
        } = *self;
        Mat4::from_cols(
            Vec4::new(2.0 * n / (r - l), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 * n / (t - b), 0.0, 0.0),
            Vec4::new((r + l) / (r - l), (t + b) / (t - b), f / (n - f), -1.0),
            Vec4::new(0.0, 0.0, n * f / (n - f), 0.0),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffAxisView {
    pub projection: Mat4,
    /// Parent-space to camera-space.
    pub view: Mat4,
    /// Camera-space to parent-space; the inverse of `view`.
    pub local: Mat4,
    pub extents: FrustumExtents,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffAxisProjector {
    pub near: f32,
    pub far: f32,
}

impl Default for OffAxisProjector {
    fn default() -> Self {
        Self {
            near: 0.1,
            far: 10.0,
        }
    }
}

impl OffAxisProjector {
    pub fn new(near: f32, far: f32) -> Self {
        Self { near, far }
    }

    pub fn project(
        &self,
        eye: Vec3,
        frame: &FocalPlaneFrame,
        flip_y: bool,
    ) -> Result<OffAxisView, GeometryError> {
        let right_edge = frame.bottom_right - frame.bottom_left;
        let up_edge = frame.top_left - frame.bottom_left;
        if right_edge.length() < MIN_EDGE_LENGTH || up_edge.length() < MIN_EDGE_LENGTH {
            return Err(GeometryError::DegenerateFrame);
        }

        let vr = right_edge.normalize();
        let normal = vr.cross(up_edge);
        if normal.length() < MIN_EDGE_LENGTH {
            return Err(GeometryError::DegenerateFrame);
        }
        let vn = normal.normalize();
        let vu = vn.cross(vr);

        let va = frame.bottom_left - eye;
        let vb = frame.bottom_right - eye;
        let vc = frame.top_left - eye;

        let distance = -va.dot(vn);
        if !distance.is_finite() || distance < MIN_PLANE_DISTANCE {
            return Err(GeometryError::DegenerateDistance { distance });
        }

        let scale = self.near / distance;
        let extents = FrustumExtents {
            left: vr.dot(va) * scale,
            right: vr.dot(vb) * scale,
            bottom: vu.dot(va) * scale,
            top: vu.dot(vc) * scale,
            near: self.near,
            far: self.far,
        };

        let mut projection = extents.to_projection();
        if flip_y {
            projection = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * projection;
        }

        let local = Mat4::from_translation(eye) * Mat4::from_mat3(Mat3::from_cols(vr, vu, vn));
        let view = local.inverse();

        if !projection.is_finite() || !view.is_finite() {
            return Err(GeometryError::DegenerateFrame);
        }

        Ok(OffAxisView {
            projection,
            view,
            local,
            extents,
        })
    }
}
