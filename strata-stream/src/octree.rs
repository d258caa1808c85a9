//! Octree over point ids, stored as a flat arena.
//!
//! Nodes are addressed by [`NodeId`] and never removed. A node is a leaf
//! while its children list is empty; splitting a leaf creates all eight
//! octant children at once and discards the parent's own id list.

use crate::cache::CacheNodeEntry;
use crate::config::OctreeConfig;
use crate::view::ViewState;
use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;
use strata_data::{Aabb, GpuPoint, PointId};
use tracing::{debug, trace};

/// Stable index of a node in its [`Octree`].
pub type NodeId = u32;

/// Resolves point ids to positions.
pub trait PositionLookup {
    /// `None` when the id has no known position.
    fn position(&self, id: PointId) -> Option<glam::Vec3>;
}

impl<F> PositionLookup for F
where
    F: Fn(PointId) -> Option<glam::Vec3>,
{
    fn position(&self, id: PointId) -> Option<glam::Vec3> {
        self(id)
    }
}

/// Positions for a sorted set of sampled ids.
#[derive(Debug, Clone, Default)]
pub struct SampleLookup {
    ids: Vec<PointId>,
    positions: Vec<glam::Vec3>,
}

impl SampleLookup {
    /// `ids` must be sorted ascending and parallel to `positions`.
    pub fn new(ids: Vec<PointId>, positions: Vec<glam::Vec3>) -> Self {
        debug_assert_eq!(ids.len(), positions.len());
        debug_assert!(ids.windows(2).all(|w| w[0] <= w[1]));
        Self { ids, positions }
    }

    pub fn ids(&self) -> &[PointId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl PositionLookup for SampleLookup {
    fn position(&self, id: PointId) -> Option<glam::Vec3> {
        self.ids
            .binary_search(&id)
            .ok()
            .map(|index| self.positions[index])
    }
}

#[derive(Debug, Clone)]
pub struct OctreeNode {
    pub id: NodeId,
    pub level: u32,
    pub bounds: Aabb,
    pub parent: Option<NodeId>,
    /// Empty for leaves, otherwise the eight octant children in octant order.
    pub children: Vec<NodeId>,
    /// Ids held while this node is a leaf. Cleared on subdivision.
    pub ids: Vec<PointId>,
    /// Ids held when the node was created; kept after subdivision.
    pub estimated_points: usize,
}

impl OctreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Octree {
    nodes: Vec<OctreeNode>,
    roots: Vec<NodeId>,
    config: OctreeConfig,
}

impl Octree {
    pub fn new(config: OctreeConfig) -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Register a new root leaf holding every sampled id.
    ///
    /// The root box is the exact bounds of the sample positions. Ids with no
    /// known position are left out.
    pub fn build_initial(
        &mut self,
        sample_ids: Vec<PointId>,
        lookup: &impl PositionLookup,
    ) -> NodeId {
        let mut bounds = Aabb::EMPTY;
        let mut ids = Vec::with_capacity(sample_ids.len());
        for id in sample_ids {
            if let Some(p) = lookup.position(id) {
                bounds.expand(p);
                ids.push(id);
            }
        }
        let root = self.push_node(0, bounds, None, ids);
        self.roots.push(root);
        debug!(
            "Built root {} over {} ids, bounds {:?}..{:?}",
            root, self.nodes[root as usize].estimated_points, bounds.min, bounds.max
        );
        root
    }

    /// Whether [`subdivide`](Self::subdivide) would attempt a split.
    pub fn can_subdivide(&self, node: NodeId) -> bool {
        self.node(node).is_some_and(|n| {
            n.is_leaf()
                && n.level + 1 < self.config.max_depth
                && n.ids.len() >= self.config.min_points_per_node
        })
    }

    /// Split a leaf into its eight octants.
    ///
    /// Each id goes to the first octant containing it, or to the octant with
    /// the nearest center when none does. Each child accepts at most
    /// `max_points_per_node` ids; the rest are dropped. Returns `None` and
    /// leaves the node untouched when it cannot be split or when every child
    /// would be empty.
    pub fn subdivide(
        &mut self,
        node: NodeId,
        lookup: &impl PositionLookup,
    ) -> Option<[NodeId; 8]> {
        if !self.can_subdivide(node) {
            return None;
        }
        let parent = &self.nodes[node as usize];
        let level = parent.level + 1;
        let octants: [Aabb; 8] = std::array::from_fn(|i| parent.bounds.octant(i));
        let cap = self.config.max_points_per_node;

        let mut buckets: [Vec<PointId>; 8] = Default::default();
        let mut dropped = 0usize;
        let mut unknown = 0usize;
        for &id in &parent.ids {
            let Some(p) = lookup.position(id) else {
                unknown += 1;
                continue;
            };
            let slot = octants
                .iter()
                .position(|b| b.contains(p))
                .unwrap_or_else(|| nearest_center(&octants, p));
            if buckets[slot].len() < cap {
                buckets[slot].push(id);
            } else {
                dropped += 1;
            }
        }
        if buckets.iter().all(Vec::is_empty) {
            return None;
        }

        let mut children = [0; 8];
        for (i, ids) in buckets.into_iter().enumerate() {
            children[i] = self.push_node(level, octants[i], Some(node), ids);
        }
        let parent = &mut self.nodes[node as usize];
        parent.children = children.to_vec();
        parent.ids = Vec::new();

        debug!(
            "Subdivided node {} at level {}: children {:?}, {} ids dropped, {} without position",
            node,
            level - 1,
            children,
            dropped,
            unknown
        );
        Some(children)
    }

    /// Recompute boxes bottom-up: leaves from the ids they hold, internal
    /// nodes from their children. Leaves with no positioned ids keep their
    /// box.
    pub fn refit(&mut self, lookup: &impl PositionLookup) {
        // Children always have larger ids than their parent.
        for index in (0..self.nodes.len()).rev() {
            let node = &self.nodes[index];
            let bounds = if node.is_leaf() {
                let mut bounds = Aabb::EMPTY;
                for p in node.ids.iter().filter_map(|id| lookup.position(*id)) {
                    bounds.expand(p);
                }
                bounds
            } else {
                node.children
                    .iter()
                    .map(|c| self.nodes[*c as usize].bounds)
                    .fold(Aabb::EMPTY, |acc, b| acc.union(&b))
            };
            if !bounds.is_empty() {
                self.nodes[index].bounds = bounds;
            }
        }
        trace!("Refit {} nodes", self.nodes.len());
    }

    /// Budgeted visible-node query.
    ///
    /// Walks from the roots in descending screen error. Nodes outside the
    /// frustum are skipped with their whole subtree. A node at or below
    /// `threshold`, or a leaf, is selected; otherwise its children are
    /// queued. Stops once selecting the next node would exceed
    /// `point_budget`.
    pub fn select_visible<F>(
        &self,
        view: &ViewState,
        screen_error: F,
        threshold: f32,
        point_budget: usize,
    ) -> Vec<NodeId>
    where
        F: Fn(&Aabb) -> f32,
    {
        let frustum = view.frustum();
        let mut queue: BinaryHeap<(OrderedFloat<f32>, NodeId)> = BinaryHeap::new();
        for &root in &self.roots {
            let node = &self.nodes[root as usize];
            queue.push((OrderedFloat(screen_error(&node.bounds)), root));
        }

        let mut selected = Vec::new();
        let mut total = 0usize;
        while let Some((OrderedFloat(error), id)) = queue.pop() {
            let node = &self.nodes[id as usize];
            if !frustum.intersects(&node.bounds) {
                continue;
            }
            if error <= threshold || node.is_leaf() {
                if node.estimated_points == 0 {
                    continue;
                }
                if total + node.estimated_points > point_budget {
                    break;
                }
                total += node.estimated_points;
                selected.push(id);
            } else {
                for &child in &node.children {
                    let bounds = &self.nodes[child as usize].bounds;
                    queue.push((OrderedFloat(screen_error(bounds)), child));
                }
            }
        }
        selected
    }

    /// Flatten the arena into baked-cache node entries. Offsets address a
    /// packed blob of [`GpuPoint`] records in node order.
    pub fn cache_table(&self) -> Vec<CacheNodeEntry> {
        let record = std::mem::size_of::<GpuPoint>() as u64;
        let mut offset = 0u64;
        self.nodes
            .iter()
            .map(|node| {
                let size = node.estimated_points as u64 * record;
                let entry = CacheNodeEntry {
                    node: node.id,
                    level: node.level,
                    bounds: node.bounds,
                    offset,
                    size,
                    point_count: node.estimated_points as u64,
                };
                offset += size;
                entry
            })
            .collect()
    }

    pub fn node(&self, id: NodeId) -> Option<&OctreeNode> {
        self.nodes.get(id as usize)
    }

    pub fn nodes(&self) -> &[OctreeNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &OctreeNode> {
        self.nodes.iter().filter(|n| n.is_leaf())
    }

    fn push_node(
        &mut self,
        level: u32,
        bounds: Aabb,
        parent: Option<NodeId>,
        ids: Vec<PointId>,
    ) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(OctreeNode {
            id,
            level,
            bounds,
            parent,
            children: Vec::new(),
            estimated_points: ids.len(),
            ids,
        });
        id
    }
}

fn nearest_center(octants: &[Aabb; 8], p: glam::Vec3) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, b) in octants.iter().enumerate() {
        let d = b.center().distance_squared(p);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    /// Deterministic points spread over `[0, 10)^3`.
    fn scattered(n: usize) -> SampleLookup {
        let mut state = 0x2545_f491u32;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 10_000) as f32 / 1000.0
        };
        let positions = (0..n).map(|_| Vec3::new(next(), next(), next())).collect();
        SampleLookup::new((0..n as PointId).collect(), positions)
    }

    fn build(n: usize, config: OctreeConfig) -> (Octree, SampleLookup) {
        let lookup = scattered(n);
        let mut tree = Octree::new(config);
        tree.build_initial(lookup.ids().to_vec(), &lookup);
        (tree, lookup)
    }

    fn assert_leaf_containment(tree: &Octree, lookup: &SampleLookup) {
        for leaf in tree.leaves() {
            for id in &leaf.ids {
                let p = lookup.position(*id).unwrap();
                assert!(leaf.bounds.contains(p), "id {id} outside leaf {}", leaf.id);
            }
        }
    }

    #[test]
    fn test_root_bounds_are_exact() {
        let (tree, lookup) = build(500, OctreeConfig::default());
        let root = tree.node(0).unwrap();
        let positions: Vec<Vec3> = lookup.ids().iter().filter_map(|i| lookup.position(*i)).collect();
        assert_eq!(root.bounds, Aabb::from_points(&positions));
        assert_eq!(root.ids.len(), 500);
        assert!(root.is_leaf());
    }

    #[test]
    fn test_thousand_samples_split_under_cap() {
        let config = OctreeConfig::default()
            .with_max_points_per_node(100)
            .with_min_points_per_node(1);
        let (mut tree, lookup) = build(1000, config);

        let children = tree.subdivide(0, &lookup).expect("root splits");
        assert!(!tree.node(0).unwrap().is_leaf());
        assert!(tree.leaves().all(|leaf| leaf.ids.len() <= 100));
        // More than 800 ids cannot fit under the cap, so some were dropped.
        let kept: usize = children.iter().map(|c| tree.node(*c).unwrap().ids.len()).sum();
        assert!(kept <= 800);
        assert_leaf_containment(&tree, &lookup);
    }

    #[test]
    fn test_children_partition_parent_box() {
        let (mut tree, lookup) = build(2000, OctreeConfig::default().with_min_points_per_node(1));
        tree.subdivide(0, &lookup).unwrap();
        let second = tree.node(0).unwrap().children[5];
        tree.subdivide(second, &lookup).unwrap();

        for parent in tree.nodes().iter().filter(|n| !n.is_leaf()) {
            let boxes: Vec<Aabb> = parent
                .children
                .iter()
                .map(|c| tree.node(*c).unwrap().bounds)
                .collect();
            let union = boxes.iter().fold(Aabb::EMPTY, |acc, b| acc.union(b));
            assert_eq!(union, parent.bounds);
            let volume: f32 = boxes.iter().map(|b| b.size().x * b.size().y * b.size().z).sum();
            let s = parent.bounds.size();
            assert!((volume - s.x * s.y * s.z).abs() < 1e-3 * s.x * s.y * s.z);
            for child in &parent.children {
                assert_eq!(tree.node(*child).unwrap().parent, Some(parent.id));
                assert_eq!(tree.node(*child).unwrap().level, parent.level + 1);
            }
            assert!(parent.ids.is_empty());
        }
        assert_leaf_containment(&tree, &lookup);
    }

    #[test]
    fn test_depth_and_size_limits() {
        let config = OctreeConfig::default()
            .with_max_depth(2)
            .with_min_points_per_node(50);
        let (mut tree, lookup) = build(400, config);
        let children = tree.subdivide(0, &lookup).unwrap();
        for child in children {
            assert!(tree.subdivide(child, &lookup).is_none(), "level 2 would exceed depth");
        }

        let (mut small, lookup) = build(10, OctreeConfig::default().with_min_points_per_node(50));
        assert!(small.subdivide(0, &lookup).is_none());
        assert_eq!(small.len(), 1);
    }

    #[test]
    fn test_subdivide_fails_when_all_children_empty() {
        let lookup = |_: PointId| -> Option<Vec3> { None };
        let known = scattered(10);
        let mut tree = Octree::new(OctreeConfig::default().with_min_points_per_node(1));
        tree.build_initial((0..10).collect(), &known);
        assert!(tree.subdivide(0, &lookup).is_none());
        assert!(tree.node(0).unwrap().is_leaf());
        assert_eq!(tree.node(0).unwrap().ids.len(), 10);
    }

    #[test]
    fn test_out_of_box_point_goes_to_nearest_center() {
        let inside = SampleLookup::new(
            vec![0, 1],
            vec![Vec3::ZERO, Vec3::splat(4.0)],
        );
        let mut tree = Octree::new(OctreeConfig::default().with_min_points_per_node(1));
        tree.build_initial(vec![0, 1], &inside);
        // Point 1 moves just past the +x+y+z corner.
        let moved = SampleLookup::new(vec![0, 1], vec![Vec3::ZERO, Vec3::splat(4.001)]);
        let children = tree.subdivide(0, &moved).unwrap();
        assert_eq!(tree.node(children[7]).unwrap().ids, vec![1]);
        assert_eq!(tree.node(children[0]).unwrap().ids, vec![0]);
    }

    #[test]
    fn test_refit_shrinks_to_held_ids() {
        let (mut tree, lookup) = build(1000, OctreeConfig::default().with_min_points_per_node(1));
        let children = tree.subdivide(0, &lookup).unwrap();
        let before = tree.node(children[0]).unwrap().bounds;
        tree.refit(&lookup);
        let leaf = tree.node(children[0]).unwrap();
        let positions: Vec<Vec3> = leaf.ids.iter().filter_map(|i| lookup.position(*i)).collect();
        assert_eq!(leaf.bounds, Aabb::from_points(&positions));
        assert!(before.contains(leaf.bounds.min) && before.contains(leaf.bounds.max));
        let union = children
            .iter()
            .map(|c| tree.node(*c).unwrap().bounds)
            .fold(Aabb::EMPTY, |acc, b| acc.union(&b));
        assert_eq!(tree.node(0).unwrap().bounds, union);
    }

    #[test]
    fn test_select_visible_respects_budget_and_threshold() {
        let (mut tree, lookup) = build(4000, OctreeConfig::default().with_min_points_per_node(1));
        for child in tree.subdivide(0, &lookup).unwrap() {
            tree.subdivide(child, &lookup);
        }
        let view = ViewState::look_at(
            Vec3::new(5.0, 5.0, 40.0),
            Vec3::splat(5.0),
            60f32.to_radians(),
            1.0,
            1000.0,
            0.1,
            1000.0,
        );

        // A huge threshold accepts the root outright.
        let coarse = tree.select_visible(&view, |b| view.screen_error(b), f32::MAX, usize::MAX);
        assert_eq!(coarse, vec![0]);

        // A zero threshold refines down to leaves.
        let fine = tree.select_visible(&view, |b| view.screen_error(b), 0.0, usize::MAX);
        assert!(fine.iter().all(|id| tree.node(*id).unwrap().is_leaf()));
        let total: usize = fine.iter().map(|id| tree.node(*id).unwrap().estimated_points).sum();
        assert_eq!(total, tree.leaves().map(|l| l.estimated_points).sum::<usize>());

        let budget = 1000;
        let limited = tree.select_visible(&view, |b| view.screen_error(b), 0.0, budget);
        let total: usize = limited.iter().map(|id| tree.node(*id).unwrap().estimated_points).sum();
        assert!(total <= budget);
        assert!(!limited.is_empty());
    }

    #[test]
    fn test_select_visible_prunes_subtrees_outside_frustum() {
        let (mut tree, lookup) = build(1000, OctreeConfig::default().with_min_points_per_node(1));
        tree.subdivide(0, &lookup).unwrap();
        let away = ViewState::look_at(
            Vec3::new(5.0, 5.0, 40.0),
            Vec3::new(5.0, 5.0, 80.0),
            60f32.to_radians(),
            1.0,
            1000.0,
            0.1,
            1000.0,
        );
        assert!(tree.select_visible(&away, |b| away.screen_error(b), 0.0, usize::MAX).is_empty());
    }

    #[test]
    fn test_cache_table_offsets_are_contiguous() {
        let (mut tree, lookup) = build(300, OctreeConfig::default().with_min_points_per_node(1));
        tree.subdivide(0, &lookup).unwrap();
        let table = tree.cache_table();
        assert_eq!(table.len(), 9);
        for pair in table.windows(2) {
            assert_eq!(pair[0].offset + pair[0].size, pair[1].offset);
        }
        assert_eq!(table[0].point_count, 300);
        assert_eq!(table[1].level, 1);
    }
}
