use anyhow::{Context, Result};
use clap::Parser;
use potree_converter::prelude::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Converts a binary PLY point cloud into a chunked LOD octree.
#[derive(Parser, Debug)]
#[command(name = "potree-converter", version)]
struct Args {
    /// Input PLY file.
    input: PathBuf,

    /// Output directory for meta.json and the node chunks.
    output: PathBuf,

    /// JSON configuration file; flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root spacing, instead of deriving it from the bounding box.
    #[arg(long)]
    spacing: Option<f64>,

    #[arg(long)]
    diagonal_fraction: Option<f64>,

    /// Deepest level allowed; points rejected there are dropped.
    #[arg(long)]
    max_depth: Option<u32>,

    /// Points a leaf buffers before it splits.
    #[arg(long)]
    store_size: Option<usize>,

    /// Levels per hierarchy batch.
    #[arg(long)]
    step_size: Option<u32>,

    /// Make the root bounding box a cube.
    #[arg(long)]
    cubic: bool,
}

impl Args {
    fn converter_config(&self) -> Result<ConverterConfig> {
        let mut config = match &self.config {
            Some(path) => ConverterConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ConverterConfig::default(),
        };

        if self.spacing.is_some() {
            config.spacing = self.spacing;
        }
        if let Some(fraction) = self.diagonal_fraction {
            config.diagonal_fraction = fraction;
        }
        if self.max_depth.is_some() {
            config.octree.max_depth = self.max_depth;
        }
        if let Some(store_size) = self.store_size {
            config.octree.max_store_size = store_size;
        }
        if let Some(step_size) = self.step_size {
            config.hierarchy_step_size = step_size;
        }
        config.cubic |= self.cubic;

        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.converter_config()?;

    info!("ply file to octree point cloud chunk converter");

    let summary = Converter::new(&args.input, &args.output, config)
        .convert()
        .with_context(|| format!("converting {}", args.input.display()))?;

    info!(
        points = summary.input_points,
        accepted = summary.accepted,
        dropped = summary.dropped,
        nodes = summary.nodes,
        spacing = summary.spacing,
        "conversion finished"
    );

    Ok(())
}
