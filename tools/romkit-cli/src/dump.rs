//! Dump command - decode a ROM into editable section files

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::project::{Project, ProjectArgs, write_texts};

/// Arguments for the dump command
#[derive(Args, Debug)]
pub struct DumpArgs {
    /// ROM image to read
    pub rom: PathBuf,

    /// Output directory (defaults to the manifest's dump directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Execute the dump command
pub fn execute(args: DumpArgs) -> Result<()> {
    let project = Project::open(&args.project)?;
    let mut rom = project.read_rom(&args.rom)?;
    let mut schema = project.schema()?;

    let data = schema
        .decode(&mut rom)
        .with_context(|| format!("Failed to decode {}", args.rom.display()))?;
    let texts = schema.format(&data).context("Failed to format decoded data")?;

    let output = match &args.output {
        Some(output) => project.path(output),
        None => project.dump_dir(),
    };
    write_texts(&output, &texts, &schema.extensions()?)?;

    tracing::info!("Dumped {} sections to {}", texts.len(), output.display());
    Ok(())
}
