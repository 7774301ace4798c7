//! Off-axis camera arrays for tiled light-field rendering.
//!
//! A [`CameraArray`] is a grid of pinhole sub-cameras spread over a square
//! aperture, all framing the same [`FocalPlaneFrame`]. Rendering every
//! sub-camera into its own tile and averaging the tiles with
//! [`average_tiles`] approximates a finite-aperture lens.

mod array;
mod composite;
mod projector;
mod rig;

pub use array::{tile_viewport, CameraArray, CameraArrayBuilder, SubCamera, ViewportRect};
pub use composite::{average_tiles, averaged_extent, CompositeError};
pub use projector::{
    FocalPlaneFrame, FrustumExtents, GeometryError, OffAxisProjector, OffAxisView,
    MIN_PLANE_DISTANCE,
};
pub use rig::{ArrayAttachment, CameraPose, CameraRig, NodeId, NodeKind};
