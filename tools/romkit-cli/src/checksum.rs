//! Checksum command - show or fix the HiROM header checksum

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use romkit::checksum;

use crate::project::{Project, ProjectArgs};

/// Arguments for the checksum command
#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// ROM image to check
    pub rom: PathBuf,

    /// Write the correct checksum into the image
    #[arg(long)]
    pub fix: bool,

    /// Where to write the fixed ROM (defaults to overwriting the input)
    #[arg(long, requires = "fix")]
    pub save_as: Option<PathBuf>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Execute the checksum command
pub fn execute(args: ChecksumArgs) -> Result<()> {
    let project = Project::open(&args.project)?;
    let mut rom = project.read_rom(&args.rom)?;

    let stored = checksum::stored(&mut rom).context("Failed to read stored checksum")?;
    let expected = checksum::expected(&rom).context("Failed to compute checksum")?;
    println!(
        "stored:   {:#06X} / {:#06X}\nexpected: {:#06X} / {:#06X}",
        stored.checksum, stored.complement, expected.checksum, expected.complement
    );

    if stored == expected {
        println!("Checksum OK");
        return Ok(());
    }
    if !args.fix {
        anyhow::bail!("Checksum mismatch (run with --fix to update it)");
    }

    checksum::apply(&mut rom).context("Failed to update checksum")?;
    project.write_rom(args.save_as.as_ref().unwrap_or(&args.rom), &rom)
}
