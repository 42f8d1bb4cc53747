pub mod aabb;
pub mod flush;
pub mod grid;
pub mod node;

use crate::config::OctreeConfig;
use crate::point::PointData;
use aabb::{create_child_aabb, node_index, Aabb};
use node::OctreeNode;
use slab::Slab;
use tracing::trace;

#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Slab arena of tree nodes. Node ids stay valid because nodes are never removed.
#[derive(Clone, Debug)]
pub struct NodeArena<T> {
    storage: Slab<T>,
    root_id: NodeId,
}

impl<T> NodeArena<T> {
    pub fn with_root(root: T) -> Self {
        let mut storage = Slab::new();
        let root_id = NodeId(storage.insert(root));

        Self { storage, root_id }
    }

    pub(crate) fn root_id(&self) -> NodeId {
        self.root_id
    }

    pub(crate) fn get(&self, node_id: NodeId) -> Option<&T> {
        self.storage.get(node_id.0)
    }

    pub(crate) fn get_mut(&mut self, node_id: NodeId) -> Option<&mut T> {
        self.storage.get_mut(node_id.0)
    }

    pub(crate) fn push(&mut self, node: T) -> NodeId {
        NodeId(self.storage.insert(node))
    }

    pub(crate) fn len(&self) -> usize {
        self.storage.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.storage.iter().map(|(key, node)| (NodeId(key), node))
    }
}

/// Single-pass LOD octree.
///
/// Leaves buffer points until `max_store_size` is reached, then turn into
/// internal nodes that keep a spacing-filtered subset and push the rest down
/// into lazily created children.
#[derive(Clone, Debug)]
pub struct Octree {
    nodes: NodeArena<OctreeNode>,
    spacing: f64,
    config: OctreeConfig,
    dropped: u64,
}

impl Octree {
    pub fn new(bounding_box: Aabb, spacing: f64, config: OctreeConfig) -> Self {
        let root = OctreeNode::new(None, 0, spacing, bounding_box, None);

        Self {
            nodes: NodeArena::with_root(root),
            spacing,
            config,
            dropped: 0,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.nodes.root_id()
    }

    pub fn root(&self) -> Option<&OctreeNode> {
        self.nodes.get(self.root_id())
    }

    pub fn node(&self, node_id: NodeId) -> Option<&OctreeNode> {
        self.nodes.get(node_id)
    }

    pub(crate) fn node_mut(&mut self, node_id: NodeId) -> Option<&mut OctreeNode> {
        self.nodes.get_mut(node_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &OctreeNode)> {
        self.nodes.iter()
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Root spacing.
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn spacing_at(&self, level: u32) -> f64 {
        self.spacing / 2f64.powi(level as i32)
    }

    /// Points refused by the depth limit, including those redistributed by a split.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// `"r"` for the root, otherwise the parent's name followed by the node index.
    pub fn name(&self, node_id: NodeId) -> String {
        let mut digits = Vec::new();
        let mut current = self.nodes.get(node_id);

        while let Some(node) = current {
            match (node.index, node.parent) {
                (Some(index), Some(parent)) => {
                    digits.push(char::from(b'0' + index));
                    current = self.nodes.get(parent);
                }
                _ => break,
            }
        }

        let mut name = String::with_capacity(digits.len() + 1);
        name.push('r');
        name.extend(digits.iter().rev());
        name
    }

    pub fn points_count(&self, node_id: NodeId) -> u64 {
        self.nodes
            .get(node_id)
            .map(OctreeNode::points_count)
            .unwrap_or(0)
    }

    /// Points held by the tree, summed over every node.
    pub fn num_points(&self) -> u64 {
        self.iter().map(|(_, node)| node.points_count()).sum()
    }

    /// Bounds of the points held by the tree: the accepted boxes of internal
    /// nodes plus whatever is still buffered in leaves. Only meaningful before
    /// a flush empties the leaf buffers.
    pub fn tight_aabb(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        for (_, node) in self.iter() {
            aabb.update_aabb(&node.accepted_aabb);
            for point in &node.store {
                aabb.update(point.position);
            }
        }
        aabb
    }

    /// Inserts a point, returning the node that ends up owning it or `None`
    /// when the depth limit drops it.
    pub fn add(&mut self, point: PointData) -> Option<NodeId> {
        self.add_at(self.root_id(), point)
    }

    fn add_at(&mut self, mut node_id: NodeId, point: PointData) -> Option<NodeId> {
        let max_store_size = self.config.max_store_size;
        let max_depth = self.config.max_depth;

        loop {
            let node = self.nodes.get_mut(node_id)?;
            node.add_called_since_last_flush = true;

            if node.is_leaf() {
                node.store.push(point);
                node.added_since_last_flush = true;

                if node.store.len() >= max_store_size {
                    return self.split(node_id);
                }
                return Some(node_id);
            }

            if node.grid.add(point.position) {
                node.accepted_aabb.update(point.position);
                node.cache.push(point);
                node.num_accepted += 1;
                node.added_since_last_flush = true;
                return Some(node_id);
            }

            if max_depth.is_some_and(|depth| node.level >= depth) {
                trace!(level = node.level, "point dropped at depth limit");
                self.dropped += 1;
                return None;
            }

            let octant = node_index(&node.bounding_box, point.position);
            let child = node.children[octant];
            node_id = match child {
                Some(child) => child,
                None => self.create_child(node_id, octant)?,
            };
        }
    }

    /// Turns a leaf into an internal node and redistributes its buffer.
    /// Returns the owner of the last buffered point, the one that triggered the split.
    fn split(&mut self, node_id: NodeId) -> Option<NodeId> {
        let store = {
            let node = self.nodes.get_mut(node_id)?;
            node.has_children = true;
            std::mem::take(&mut node.store)
        };

        trace!(points = store.len(), "splitting leaf");

        let mut owner = None;
        for point in store {
            owner = self.add_at(node_id, point);
        }
        owner
    }

    fn create_child(&mut self, parent_id: NodeId, octant: usize) -> Option<NodeId> {
        let (bounding_box, level) = {
            let parent = self.nodes.get(parent_id)?;
            (create_child_aabb(&parent.bounding_box, octant), parent.level + 1)
        };

        // even levels name their octant in reverse order
        let index = if level % 2 == 0 { 7 - octant } else { octant };

        let child = OctreeNode::new(
            Some(index as u8),
            level,
            self.spacing_at(level),
            bounding_box,
            Some(parent_id),
        );
        let child_id = self.nodes.push(child);

        let parent = self.nodes.get_mut(parent_id)?;
        parent.children[octant] = Some(child_id);

        Some(child_id)
    }
}
