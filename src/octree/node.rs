use crate::octree::aabb::Aabb;
use crate::octree::grid::Grid;
use crate::octree::NodeId;
use crate::point::PointData;

#[derive(Clone, Debug)]
pub struct OctreeNode {
    /// Octant code used for the node name, `None` for the root.
    pub index: Option<u8>,
    pub level: u32,
    pub spacing: f64,
    pub bounding_box: Aabb,
    /// Tight bound of the points accepted by this node's grid.
    pub accepted_aabb: Aabb,
    pub grid: Grid,
    /// Point buffer while the node is a leaf.
    pub store: Vec<PointData>,
    /// Accepted points once the node has children.
    pub cache: Vec<PointData>,
    pub parent: Option<NodeId>,
    /// Child slots keyed by geometric octant.
    pub children: [Option<NodeId>; 8],
    pub has_children: bool,
    pub added_since_last_flush: bool,
    pub add_called_since_last_flush: bool,
    pub num_accepted: u64,
}

impl OctreeNode {
    pub fn new(
        index: Option<u8>,
        level: u32,
        spacing: f64,
        bounding_box: Aabb,
        parent: Option<NodeId>,
    ) -> Self {
        Self {
            index,
            level,
            spacing,
            grid: Grid::new(bounding_box, spacing),
            bounding_box,
            accepted_aabb: Aabb::empty(),
            store: Vec::new(),
            cache: Vec::new(),
            parent,
            children: [None; 8],
            has_children: false,
            added_since_last_flush: true,
            add_called_since_last_flush: false,
            num_accepted: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !self.has_children
    }

    /// Points this node owns directly.
    pub fn points_count(&self) -> u64 {
        if self.num_accepted == 0 {
            self.store.len() as u64
        } else {
            self.num_accepted
        }
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().flatten().copied()
    }
}
