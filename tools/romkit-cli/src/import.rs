//! Import command - parse edited section files and write a patched ROM

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::project::{Project, ProjectArgs, read_texts};

/// Arguments for the import command
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// ROM image to patch
    pub rom: PathBuf,

    /// Where to write the patched ROM (defaults to overwriting the input)
    #[arg(long)]
    pub save_as: Option<PathBuf>,

    /// Directory with the edited files (defaults to the manifest's dump directory)
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Execute the import command
pub fn execute(args: ImportArgs) -> Result<()> {
    let project = Project::open(&args.project)?;
    let data_dir = match &args.data {
        Some(data) => project.path(data),
        None => project.dump_dir(),
    };

    let texts = read_texts(&data_dir)?;
    let mut schema = project.schema()?;
    let data = schema
        .parse(&texts)
        .with_context(|| format!("Failed to parse files in {}", data_dir.display()))?;

    let rom = project.read_rom(&args.rom)?;
    let mut patched = schema
        .encode(&data, &rom)
        .context("Failed to encode edited data")?;

    if project.manifest.rom.checksum {
        romkit::checksum::apply(&mut patched).context("Failed to update checksum")?;
    }

    project.write_rom(args.save_as.as_ref().unwrap_or(&args.rom), &patched)
}
