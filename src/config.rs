use crate::octree::aabb::Aabb;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_MAX_STORE_SIZE: usize = 10_000;
pub const DEFAULT_DIAGONAL_FRACTION: f64 = 200.0;
pub const DEFAULT_HIERARCHY_STEP_SIZE: u32 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Limits applied while building the tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OctreeConfig {
    /// Deepest level allowed to receive points; `None` means unlimited.
    pub max_depth: Option<u32>,
    /// Leaf buffer size that triggers a split.
    pub max_store_size: usize,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_store_size: DEFAULT_MAX_STORE_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConverterConfig {
    /// Root spacing; derived from the bounding box diagonal when absent.
    pub spacing: Option<f64>,
    pub diagonal_fraction: f64,
    /// Depth of each node batch in the metadata pass.
    pub hierarchy_step_size: u32,
    /// Expand the root box into a cube before building.
    pub cubic: bool,
    pub octree: OctreeConfig,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            spacing: None,
            diagonal_fraction: DEFAULT_DIAGONAL_FRACTION,
            hierarchy_step_size: DEFAULT_HIERARCHY_STEP_SIZE,
            cubic: false,
            octree: OctreeConfig::default(),
        }
    }
}

impl ConverterConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(spacing) = self.spacing {
            if !(spacing.is_finite() && spacing > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "spacing must be a positive number, got {spacing}"
                )));
            }
        }
        if !(self.diagonal_fraction.is_finite() && self.diagonal_fraction > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "diagonalFraction must be a positive number, got {}",
                self.diagonal_fraction
            )));
        }
        if self.hierarchy_step_size == 0 {
            return Err(ConfigError::Invalid(
                "hierarchyStepSize must be at least 1".to_string(),
            ));
        }
        if self.octree.max_store_size == 0 {
            return Err(ConfigError::Invalid(
                "maxStoreSize must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Explicit spacing wins, otherwise `diagonal / diagonal_fraction`.
    pub fn resolve_spacing(&self, bounding_box: &Aabb) -> f64 {
        if let Some(spacing) = self.spacing {
            return spacing;
        }

        let diagonal = bounding_box.diagonal();
        if diagonal.is_finite() {
            diagonal / self.diagonal_fraction
        } else {
            0.0
        }
    }
}
