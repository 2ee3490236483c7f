//! Optimize command - re-encode a ROM from optimized data
//!
//! Payloads that render identically are merged, which frees space in
//! pointer tables. The result is decoded again and must render the same as
//! the optimized data before it is written.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::project::{Project, ProjectArgs};
use crate::roundtrip::{compare, render};

/// Arguments for the optimize command
#[derive(Args, Debug)]
pub struct OptimizeArgs {
    /// ROM image to optimize
    pub rom: PathBuf,

    /// Where to write the optimized ROM (defaults to overwriting the input)
    #[arg(long)]
    pub save_as: Option<PathBuf>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Execute the optimize command
pub fn execute(args: OptimizeArgs) -> Result<()> {
    let project = Project::open(&args.project)?;
    let rom = project.read_rom(&args.rom)?;

    let mut schema = project.schema()?;
    let data = schema
        .decode(&mut rom.clone())
        .with_context(|| format!("Failed to decode {}", args.rom.display()))?;
    let optimized = schema.optimize(&data).context("Failed to optimize data")?;

    let texts = schema.format(&optimized).context("Failed to format optimized data")?;
    let parsed = schema.parse(&texts).context("Failed to parse optimized data")?;
    let mut rebuilt = schema.encode(&parsed, &rom).context("Failed to encode optimized data")?;

    tracing::info!("Testing optimized data after encoding...");
    compare(&texts, &render(&project, &rebuilt)?, &project.dir)?;

    if project.manifest.rom.checksum {
        romkit::checksum::apply(&mut rebuilt).context("Failed to update checksum")?;
    }
    project.write_rom(args.save_as.as_ref().unwrap_or(&args.rom), &rebuilt)
}
