use crate::octree::{NodeId, Octree};
use crate::writer::write_chunk;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FlushError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub files_written: usize,
    pub points_written: u64,
}

impl Octree {
    /// Writes the buffers of the whole tree to `<output_dir>/<name>.bin`.
    pub fn flush(&mut self, output_dir: impl AsRef<Path>) -> Result<FlushStats, FlushError> {
        self.flush_node(self.root_id(), output_dir)
    }

    /// Flushes `node_id` and all of its descendants.
    ///
    /// Leaves write their store when a point reached them since the previous
    /// flush and drop it otherwise; internal nodes write and clear their cache.
    pub fn flush_node(
        &mut self,
        node_id: NodeId,
        output_dir: impl AsRef<Path>,
    ) -> Result<FlushStats, FlushError> {
        let output_dir = output_dir.as_ref();
        let mut stats = FlushStats::default();
        let mut stack = vec![node_id];

        while let Some(id) = stack.pop() {
            let name = self.name(id);
            let Some(node) = self.node_mut(id) else {
                continue;
            };

            let written = if node.is_leaf() {
                if node.add_called_since_last_flush {
                    write_points(output_dir, &name, &node.store)?
                } else {
                    node.store.clear();
                    0
                }
            } else if node.add_called_since_last_flush {
                let written = write_points(output_dir, &name, &node.cache)?;
                node.cache.clear();
                written
            } else {
                0
            };

            if written > 0 {
                debug!(node = %name, points = written, "flushed node");
                stats.files_written += 1;
                stats.points_written += written;
            }

            node.add_called_since_last_flush = false;
            node.added_since_last_flush = false;

            stack.extend(node.children());
        }

        Ok(stats)
    }
}

fn write_points(
    output_dir: &Path,
    name: &str,
    points: &[crate::point::PointData],
) -> std::io::Result<u64> {
    if points.is_empty() {
        return Ok(0);
    }
    write_chunk(output_dir.join(format!("{name}.bin")), points)
}
