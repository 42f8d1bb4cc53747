use crate::octree::aabb::Aabb;
use crate::octree::flush::FlushError;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const METADATA_FILE_NAME: &str = "meta.json";

/// Contents of `meta.json`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
    pub spacing: f64,
    pub bounding_box: BoundingBox,
    pub hierarchy: Vec<HierarchyEntry>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    #[serde(rename = "Lx")]
    pub lx: f64,
    #[serde(rename = "Ly")]
    pub ly: f64,
    #[serde(rename = "Lz")]
    pub lz: f64,
    #[serde(rename = "Ux")]
    pub ux: f64,
    #[serde(rename = "Uy")]
    pub uy: f64,
    #[serde(rename = "Uz")]
    pub uz: f64,
}

/// `[name, pointCount]` pair.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HierarchyEntry(pub String, pub u64);

impl HierarchyEntry {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn num_points(&self) -> u64 {
        self.1
    }
}

impl From<Aabb> for BoundingBox {
    fn from(aabb: Aabb) -> Self {
        Self {
            lx: aabb.min.x,
            ly: aabb.min.y,
            lz: aabb.min.z,
            ux: aabb.max.x,
            uy: aabb.max.y,
            uz: aabb.max.z,
        }
    }
}

impl From<BoundingBox> for Aabb {
    fn from(bounding_box: BoundingBox) -> Self {
        Aabb::new(
            DVec3::new(bounding_box.lx, bounding_box.ly, bounding_box.lz),
            DVec3::new(bounding_box.ux, bounding_box.uy, bounding_box.uz),
        )
    }
}

impl Metadata {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        Ok(buf)
    }

    /// Writes `meta.json` into `output_dir`, replacing any previous one.
    pub fn write(&self, output_dir: impl AsRef<Path>) -> Result<(), FlushError> {
        let json = self.to_json()?;
        std::fs::write(output_dir.as_ref().join(METADATA_FILE_NAME), json)?;
        Ok(())
    }

    pub fn read(output_dir: impl AsRef<Path>) -> Result<Self, FlushError> {
        let bytes = std::fs::read(output_dir.as_ref().join(METADATA_FILE_NAME))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Total number of points referenced by the hierarchy.
    pub fn points(&self) -> u64 {
        self.hierarchy.iter().map(HierarchyEntry::num_points).sum()
    }
}
