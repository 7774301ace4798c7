use bytemuck::{Pod, Zeroable};
use camarray::CameraPose;

/// Per sub-camera block bound at group 0 with a dynamic offset.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct CameraUniforms {
    pub view_projection: [[f32; 4]; 4],
    pub eye: [f32; 4],
}

impl CameraUniforms {
    pub fn from_pose(pose: &CameraPose) -> Self {
        Self {
            view_projection: pose.view_projection.to_cols_array_2d(),
            eye: pose.eye.extend(1.0).to_array(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct AverageUniforms {
    pub views: i32,
    pub encode_gamma: f32,
    pub _padding: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct OutputUniforms {
    pub exposure: f32,
    pub encode_gamma: f32,
    pub _padding: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct SceneUniforms {
    /// xyz direction the light travels, w intensity.
    pub light_direction: [f32; 4],
    /// x elapsed seconds.
    pub time: [f32; 4],
}

pub(crate) fn gamma_flag(encode: bool) -> f32 {
    if encode {
        1.0
    } else {
        0.0
    }
}

/// Byte distance between consecutive camera blocks in one uniform buffer.
pub(crate) fn camera_stride(min_alignment: u32) -> u64 {
    let size = std::mem::size_of::<CameraUniforms>() as u64;
    let alignment = u64::from(min_alignment.max(1));
    size.div_ceil(alignment) * alignment
}

/// Packs every pose at `stride` intervals for a single `write_buffer`.
pub(crate) fn pack_cameras(poses: &[CameraPose], stride: u64) -> Vec<u8> {
    let stride = stride as usize;
    let mut bytes = vec![0u8; poses.len() * stride];
    for (index, pose) in poses.iter().enumerate() {
        let uniforms = CameraUniforms::from_pose(pose);
        let start = index * stride;
        let block = bytemuck::bytes_of(&uniforms);
        bytes[start..start + block.len()].copy_from_slice(block);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use camarray::ViewportRect;
    use glam::{Mat4, Vec3};

    #[test]
    fn uniform_sizes_match_std140_blocks() {
        assert_eq!(std::mem::size_of::<CameraUniforms>(), 80);
        assert_eq!(std::mem::size_of::<AverageUniforms>(), 16);
        assert_eq!(std::mem::size_of::<OutputUniforms>(), 16);
        assert_eq!(std::mem::size_of::<SceneUniforms>(), 32);
    }

    #[test]
    fn stride_respects_device_alignment() {
        assert_eq!(camera_stride(256), 256);
        assert_eq!(camera_stride(64), 128);
        assert_eq!(camera_stride(16), 80);
    }

    #[test]
    fn packed_cameras_land_on_stride_boundaries() {
        let pose = |x: f32| CameraPose {
            view: Mat4::IDENTITY,
            view_projection: Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
            eye: Vec3::new(x, 0.0, 0.0),
            viewport: ViewportRect {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            },
        };
        let bytes = pack_cameras(&[pose(1.0), pose(2.0)], 256);
        assert_eq!(bytes.len(), 512);
        let second: CameraUniforms = bytemuck::pod_read_unaligned(&bytes[256..256 + 80]);
        assert_eq!(second.eye, [2.0, 0.0, 0.0, 1.0]);
        assert_eq!(second.view_projection[3][0], 2.0);
    }
}
