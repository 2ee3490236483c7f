//! Test command - check that a schema round-trips a ROM
//!
//! Decodes the ROM, renders every section, parses the renderings back,
//! encodes them onto a copy of the ROM and decodes that copy with a fresh
//! schema. Both renderings must match section by section.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use indexmap::IndexMap;
use romkit::Rom;

use crate::project::{Project, ProjectArgs};

/// Arguments for the test command
#[derive(Args, Debug)]
pub struct TestArgs {
    /// ROM image to test against
    pub rom: PathBuf,

    /// Where to write both renderings of a mismatching section
    #[arg(long)]
    pub diff_dir: Option<PathBuf>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Execute the test command
pub fn execute(args: TestArgs) -> Result<()> {
    let project = Project::open(&args.project)?;
    let rom = project.read_rom(&args.rom)?;

    let mut schema = project.schema()?;
    let data = schema
        .decode(&mut rom.clone())
        .with_context(|| format!("Failed to decode {}", args.rom.display()))?;
    let texts = schema.format(&data).context("Failed to format decoded data")?;
    let parsed = schema.parse(&texts).context("Failed to parse rendered data")?;
    let rebuilt = schema.encode(&parsed, &rom).context("Failed to encode parsed data")?;

    let diff_dir = match &args.diff_dir {
        Some(dir) => project.path(dir),
        None => project.dir.clone(),
    };
    let again = render(&project, &rebuilt)?;
    compare(&texts, &again, &diff_dir)?;

    println!("Schema passed ({} sections)", texts.len());
    Ok(())
}

/// Decode and render `rom` with a fresh schema.
pub fn render(project: &Project, rom: &Rom) -> Result<IndexMap<String, String>> {
    let mut schema = project.schema()?;
    let data = schema
        .decode(&mut rom.clone())
        .context("Failed to decode rebuilt ROM")?;
    schema.format(&data).context("Failed to format rebuilt data")
}

/// Fail on the first section whose renderings differ, writing both
/// renderings to `diff_dir` for inspection.
pub fn compare(
    before: &IndexMap<String, String>,
    after: &IndexMap<String, String>,
    diff_dir: &Path,
) -> Result<()> {
    for (name, expected) in before {
        let actual = after.get(name).map(String::as_str).unwrap_or_default();
        if expected != actual {
            std::fs::create_dir_all(diff_dir)
                .with_context(|| format!("Failed to create {}", diff_dir.display()))?;
            let first = diff_dir.join(format!("{name}.before.txt"));
            let second = diff_dir.join(format!("{name}.after.txt"));
            std::fs::write(&first, expected)
                .with_context(|| format!("Failed to write {}", first.display()))?;
            std::fs::write(&second, actual)
                .with_context(|| format!("Failed to write {}", second.display()))?;
            anyhow::bail!(
                "Test failed: section {name:?} changed after a round trip\n  see {} and {}",
                first.display(),
                second.display()
            );
        }
    }
    Ok(())
}
