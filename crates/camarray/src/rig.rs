//! Transform tree for the base camera and the sub-cameras hanging off it.
//!
//! Nodes live in an arena and point at their parent by index, so detaching a
//! generation is a matter of freeing its subtree.

use glam::{Mat4, Vec3};

use crate::array::{CameraArray, ViewportRect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Base,
    Array,
    SubCamera(usize),
}

#[derive(Debug, Clone)]
struct RigNode {
    parent: Option<NodeId>,
    kind: NodeKind,
    local: Mat4,
}

/// Nodes created by [`CameraRig::attach_array`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayAttachment {
    pub root: NodeId,
    pub cameras: Vec<NodeId>,
}

/// World-space matrices of one sub-camera for the current base pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub view: Mat4,
    pub view_projection: Mat4,
    pub eye: Vec3,
    pub viewport: ViewportRect,
}

#[derive(Debug, Clone)]
pub struct CameraRig {
    nodes: Vec<Option<RigNode>>,
    free: Vec<usize>,
    base: NodeId,
}

impl CameraRig {
    /// `base_pose` is the base camera's camera-to-world transform.
    pub fn new(base_pose: Mat4) -> Self {
        Self {
            nodes: vec![Some(RigNode {
                parent: None,
                kind: NodeKind::Base,
                local: base_pose,
            })],
            free: Vec::new(),
            base: NodeId(0),
        }
    }

    pub fn base(&self) -> NodeId {
        self.base
    }

    pub fn base_pose(&self) -> Mat4 {
        self.node(self.base)
            .map(|node| node.local)
            .unwrap_or(Mat4::IDENTITY)
    }

    pub fn set_base_pose(&mut self, pose: Mat4) {
        if let Some(Some(node)) = self.nodes.get_mut(self.base.0) {
            node.local = pose;
        }
    }

    pub fn live_nodes(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).map(|node| node.kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    /// Adds a node under `parent`; returns `None` when `parent` is gone.
    pub fn insert(&mut self, parent: NodeId, kind: NodeKind, local: Mat4) -> Option<NodeId> {
        if !self.contains(parent) {
            return None;
        }
        let node = RigNode {
            parent: Some(parent),
            kind,
            local,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        Some(NodeId(id))
    }

    /// Parents an aggregate node under the base camera and one node per sub-camera under it.
    pub fn attach_array(&mut self, array: &CameraArray) -> ArrayAttachment {
        let base = self.base;
        let root = self
            .insert(base, NodeKind::Array, Mat4::IDENTITY)
            .unwrap_or(base);
        let cameras = array
            .iter()
            .enumerate()
            .filter_map(|(index, camera)| {
                self.insert(root, NodeKind::SubCamera(index), camera.local)
            })
            .collect();
        ArrayAttachment { root, cameras }
    }

    /// Removes `id` and everything below it. The base node is never removed.
    pub fn detach(&mut self, id: NodeId) -> usize {
        if id == self.base || !self.contains(id) {
            return 0;
        }
        let doomed: Vec<usize> = (0..self.nodes.len())
            .filter(|&slot| self.is_within(NodeId(slot), id))
            .collect();
        for &slot in &doomed {
            self.nodes[slot] = None;
            self.free.push(slot);
        }
        doomed.len()
    }

    pub fn world_transform(&self, id: NodeId) -> Option<Mat4> {
        let mut node = self.node(id)?;
        let mut transform = node.local;
        while let Some(parent) = node.parent {
            node = self.node(parent)?;
            transform = node.local * transform;
        }
        Some(transform)
    }

    /// Per-frame matrices for every sub-camera of `attachment`.
    pub fn poses(&self, attachment: &ArrayAttachment, array: &CameraArray) -> Vec<CameraPose> {
        attachment
            .cameras
            .iter()
            .zip(array.iter())
            .filter_map(|(&id, camera)| {
                let world = self.world_transform(id)?;
                let view = world.inverse();
                Some(CameraPose {
                    view,
                    view_projection: camera.projection * view,
                    eye: world.w_axis.truncate(),
                    viewport: camera.viewport,
                })
            })
            .collect()
    }

    fn node(&self, id: NodeId) -> Option<&RigNode> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    fn is_within(&self, candidate: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(candidate);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }
}

impl Default for CameraRig {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::CameraArrayBuilder;
    use crate::projector::FocalPlaneFrame;

    fn array(views: u32) -> CameraArray {
        let frame = FocalPlaneFrame::new(1.0, 1.73, 0.6);
        CameraArrayBuilder::new(views, 256 * views, 0.05)
            .build(&frame)
            .expect("array")
    }

    #[test]
    fn attach_creates_aggregate_and_children() {
        let mut rig = CameraRig::default();
        let attachment = rig.attach_array(&array(3));
        assert_eq!(attachment.cameras.len(), 9);
        assert_eq!(rig.live_nodes(), 11);
        assert_eq!(rig.parent(attachment.root), Some(rig.base()));
        assert_eq!(rig.kind(attachment.cameras[4]), Some(NodeKind::SubCamera(4)));
        assert!(attachment
            .cameras
            .iter()
            .all(|&id| rig.parent(id) == Some(attachment.root)));
    }

    #[test]
    fn detach_frees_the_whole_generation() {
        let mut rig = CameraRig::default();
        let first = rig.attach_array(&array(4));
        assert_eq!(rig.detach(first.root), 17);
        assert_eq!(rig.live_nodes(), 1);
        assert!(!rig.contains(first.cameras[0]));

        let second = rig.attach_array(&array(2));
        assert_eq!(rig.live_nodes(), 6);
        assert!(rig.world_transform(second.cameras[3]).is_some());
    }

    #[test]
    fn base_node_cannot_be_detached() {
        let mut rig = CameraRig::default();
        assert_eq!(rig.detach(rig.base()), 0);
        assert_eq!(rig.live_nodes(), 1);
    }

    #[test]
    fn sub_cameras_follow_the_base_pose() {
        let mut rig = CameraRig::default();
        let cameras = array(2);
        let attachment = rig.attach_array(&cameras);
        let before = rig.poses(&attachment, &cameras);

        let offset = Vec3::new(1.0, 2.0, 3.0);
        rig.set_base_pose(Mat4::from_translation(offset));
        let after = rig.poses(&attachment, &cameras);

        for (old, new) in before.iter().zip(&after) {
            assert!((new.eye - (old.eye + offset)).length() < 1e-5);
            let point = Vec3::new(0.1, -0.2, -1.0);
            let a = old.view_projection.project_point3(point);
            let b = new.view_projection.project_point3(point + offset);
            assert!((a - b).length() < 1e-4);
        }
    }
}
