pub use crate::config::{ConverterConfig, OctreeConfig};
pub use crate::converter::{ConversionSummary, Converter};
pub use crate::hierarchy::{collect_hierarchy, get_hierarchy};
pub use crate::metadata::{BoundingBox, HierarchyEntry, Metadata};
pub use crate::octree::aabb::Aabb;
pub use crate::octree::{NodeId, Octree};
pub use crate::ply::{read_ply, PlyReader, PointCloud};
pub use crate::point::PointData;
pub use crate::writer::{read_chunk, write_chunk, PointWriter};

// Error types
pub use crate::config::ConfigError;
pub use crate::converter::ConvertError;
pub use crate::octree::flush::FlushError;
pub use crate::ply::ReadPlyError;
pub use crate::writer::ReadChunkError;
