use crate::metadata::HierarchyEntry;
use crate::octree::{NodeId, Octree};
use std::collections::VecDeque;
use tracing::{span, trace, Level};

/// Breadth-first walk of `node_id` and its descendants whose level is below
/// `node.level + levels`. Children are visited in octant order.
pub fn get_hierarchy(octree: &Octree, node_id: NodeId, levels: u32) -> Vec<NodeId> {
    let Some(start) = octree.node(node_id) else {
        return Vec::new();
    };
    let max_level = start.level + levels;

    let mut hierarchy = Vec::new();
    let mut queue = VecDeque::from([node_id]);

    while let Some(id) = queue.pop_front() {
        let Some(node) = octree.node(id) else {
            continue;
        };

        // level order: everything after this is at least as deep
        if node.level >= max_level {
            break;
        }

        hierarchy.push(id);
        queue.extend(node.children());
    }

    hierarchy
}

/// Metadata pass: walks the tree in batches of `step_size` levels and lists
/// `[name, points]` for every node of each batch that saw new points.
///
/// Each node is listed once. A node `step_size` levels below its batch root
/// starts the next batch and is listed there only, not as the last level of
/// the batch above it.
pub fn collect_hierarchy(octree: &Octree, step_size: u32) -> Vec<HierarchyEntry> {
    let span = span!(Level::DEBUG, "collect_hierarchy", step_size);
    let _enter = span.enter();

    let mut entries = Vec::new();
    let mut batch_roots = VecDeque::from([octree.root_id()]);
    let mut batches = 0usize;
    let mut flushed = 0usize;

    while let Some(batch_root) = batch_roots.pop_front() {
        let Some(root) = octree.node(batch_root) else {
            continue;
        };
        let next_level = root.level + step_size;
        batches += 1;

        let batch = get_hierarchy(octree, batch_root, step_size + 1);
        let mut needs_flush = false;
        let mut members = Vec::with_capacity(batch.len());

        for id in batch {
            let Some(node) = octree.node(id) else {
                continue;
            };
            needs_flush |= node.added_since_last_flush;

            if node.level == next_level {
                batch_roots.push_back(id);
            } else {
                members.push(id);
            }
        }

        if needs_flush {
            flushed += 1;
            entries.extend(
                members
                    .into_iter()
                    .map(|id| HierarchyEntry(octree.name(id), octree.points_count(id))),
            );
        }
    }

    trace!(batches, flushed, entries = entries.len(), "hierarchy collected");

    entries
}
