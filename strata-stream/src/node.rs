//! Node view consumed by the scheduler.

use crate::octree::{NodeId, Octree};
use strata_data::Aabb;

/// Read-only topology the scheduler walks each tick.
///
/// Residency and activity are not part of the contract: the scheduler keeps
/// them in its own state table and changes them only from its entry points.
pub trait NodeContract {
    fn roots(&self) -> &[NodeId];
    fn bounds(&self, node: NodeId) -> Aabb;
    fn level(&self, node: NodeId) -> u32;
    fn estimated_points(&self, node: NodeId) -> usize;
    fn children(&self, node: NodeId) -> &[NodeId];
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Whether a load request for this node would fetch anything.
    fn is_loadable(&self, node: NodeId) -> bool {
        self.children(node).is_empty() && self.estimated_points(node) > 0
    }
}

impl NodeContract for Octree {
    fn roots(&self) -> &[NodeId] {
        Octree::roots(self)
    }

    fn bounds(&self, node: NodeId) -> Aabb {
        self.node(node).map_or(Aabb::EMPTY, |n| n.bounds)
    }

    fn level(&self, node: NodeId) -> u32 {
        self.node(node).map_or(0, |n| n.level)
    }

    fn estimated_points(&self, node: NodeId) -> usize {
        self.node(node).map_or(0, |n| n.estimated_points)
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        self.node(node)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent)
    }
}
