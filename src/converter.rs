use crate::config::{ConfigError, ConverterConfig};
use crate::hierarchy::collect_hierarchy;
use crate::metadata::Metadata;
use crate::octree::aabb::Aabb;
use crate::octree::flush::FlushError;
use crate::octree::Octree;
use crate::ply::{PlyReader, ReadPlyError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, span, warn, Level};

const PROGRESS_INTERVAL: u64 = 100_000;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Error reading input: {0}")]
    Read(#[from] ReadPlyError),

    #[error("Output directory {} does not exist", .0.display())]
    OutputDirectoryMissing(PathBuf),

    #[error("Error writing output: {0}")]
    Flush(#[from] FlushError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Outcome of a conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionSummary {
    pub spacing: f64,
    pub input_points: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub nodes: usize,
    /// Bounds of the points that made it into the tree.
    pub tight_aabb: Aabb,
}

pub struct Converter {
    input: PathBuf,
    output_dir: PathBuf,
    config: ConverterConfig,
}

impl Converter {
    pub fn new(
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        config: ConverterConfig,
    ) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            config,
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Reads the input twice (bounds, then points), builds the octree and
    /// writes `meta.json` followed by the node chunks.
    pub fn convert(&self) -> Result<ConversionSummary, ConvertError> {
        let span = span!(Level::INFO, "convert", input = %self.input.display());
        let _enter = span.enter();

        self.config.validate()?;
        self.prepare_output_dir()?;

        let (input_points, mut aabb) = self.scan_bounds()?;
        info!(points = input_points, "read input bounds");

        if self.config.cubic {
            aabb.make_cubic();
        }

        let spacing = self.config.resolve_spacing(&aabb);
        if input_points == 0 {
            warn!("input contains no points");
        }
        info!(spacing, "building octree");

        let mut octree = Octree::new(aabb, spacing, self.config.octree.clone());

        let mut reader = PlyReader::open(&self.input)?;
        while let Some(point) = reader.read_point()? {
            octree.add(point);

            if reader.points_read() % PROGRESS_INTERVAL == 0 {
                debug!(
                    points = reader.points_read(),
                    nodes = octree.len(),
                    "inserting points"
                );
            }
        }

        // a split at the depth limit can drop points `add` had already buffered
        let tight_aabb = octree.tight_aabb();
        let accepted = octree.num_points();
        info!(
            accepted,
            dropped = octree.dropped(),
            nodes = octree.len(),
            "octree built"
        );

        self.flush(&mut octree, &tight_aabb)?;

        Ok(ConversionSummary {
            spacing,
            input_points: reader.points_read(),
            accepted,
            dropped: octree.dropped(),
            nodes: octree.len(),
            tight_aabb,
        })
    }

    fn prepare_output_dir(&self) -> Result<(), ConvertError> {
        // creation failures surface through the check below
        if let Err(error) = std::fs::create_dir_all(&self.output_dir) {
            debug!(%error, "could not create output directory");
        }
        if !self.output_dir.is_dir() {
            return Err(ConvertError::OutputDirectoryMissing(self.output_dir.clone()));
        }
        Ok(())
    }

    fn scan_bounds(&self) -> Result<(u64, Aabb), ConvertError> {
        let mut reader = PlyReader::open(&self.input)?;
        while reader.read_point()?.is_some() {}
        Ok((reader.points_read(), reader.aabb()))
    }

    /// Metadata pass, then data pass: the hierarchy reads the flags the data
    /// flush resets.
    fn flush(&self, octree: &mut Octree, tight_aabb: &Aabb) -> Result<(), ConvertError> {
        let metadata = Metadata {
            spacing: octree.spacing(),
            bounding_box: (*tight_aabb).into(),
            hierarchy: collect_hierarchy(octree, self.config.hierarchy_step_size),
        };
        metadata.write(&self.output_dir)?;
        info!(entries = metadata.hierarchy.len(), "saved meta.json");

        let stats = octree.flush(&self.output_dir)?;
        info!(
            files = stats.files_written,
            points = stats.points_written,
            "saved node chunks"
        );

        Ok(())
    }
}
