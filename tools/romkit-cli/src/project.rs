//! Project directory helpers: ROM, schema and data files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use indexmap::IndexMap;
use romkit::{Library, Rom, Schema, SectionDef};

use crate::manifest::RomkitManifest;

/// Largest image accepted: 8 MiB of banks plus a copier header, with room
/// for expanded hacks.
pub const MAX_ROM_BYTES: u64 = 16 * 1024 * 1024;
/// Largest schema or section file accepted.
pub const MAX_TEXT_BYTES: u64 = 16 * 1024 * 1024;

/// Read a ROM image or project file, refusing anything over `max_bytes`.
pub fn read_capped(path: &Path, what: &str, max_bytes: u64) -> Result<Vec<u8>> {
    let len = std::fs::metadata(path)
        .with_context(|| format!("Failed to open {what}: {}", path.display()))?
        .len();
    if len > max_bytes {
        anyhow::bail!(
            "{what} {} is {len} bytes, over the {max_bytes} byte limit",
            path.display()
        );
    }
    std::fs::read(path).with_context(|| format!("Failed to read {what}: {}", path.display()))
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = read_capped(path, "Project file", MAX_TEXT_BYTES)?;
    String::from_utf8(bytes).with_context(|| format!("Not valid UTF-8: {}", path.display()))
}

/// Files directly inside `dir`, keyed by name without extension, sorted.
fn files_by_stem(dir: &Path) -> Result<IndexMap<String, PathBuf>> {
    let mut files: Vec<(String, PathBuf)> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?.to_string();
            Some((stem, path))
        })
        .collect();
    files.sort();

    let mut by_stem = IndexMap::new();
    for (stem, path) in files {
        if let Some(previous) = by_stem.insert(stem.clone(), path.clone()) {
            anyhow::bail!(
                "Two files for section {stem:?}: {} and {}",
                previous.display(),
                path.display()
            );
        }
    }
    Ok(by_stem)
}

/// Read every section text in `dir`.
pub fn read_texts(dir: &Path) -> Result<IndexMap<String, String>> {
    files_by_stem(dir)?
        .into_iter()
        .map(|(name, path)| Ok((name, read_text(&path)?)))
        .collect()
}

/// Write each section text as `name.ext` into `dir`.
pub fn write_texts(
    dir: &Path,
    texts: &IndexMap<String, String>,
    extensions: &IndexMap<String, &'static str>,
) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    for (name, text) in texts {
        let ext = extensions.get(name).copied().unwrap_or("txt");
        let path = dir.join(format!("{name}.{ext}"));
        std::fs::write(&path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Path to project directory (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Path to romkit.toml manifest file (relative to project directory)
    #[arg(short, long, default_value = "romkit.toml")]
    pub manifest: PathBuf,

    /// Schema directory (overrides the manifest)
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
}

/// A loaded project: manifest, shared library and directory layout.
pub struct Project {
    pub dir: PathBuf,
    pub manifest: RomkitManifest,
    schema_dir: PathBuf,
    library: Arc<Library>,
}

impl Project {
    pub fn open(args: &ProjectArgs) -> Result<Self> {
        let dir = match &args.project {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        let manifest = RomkitManifest::load_or_default(&dir.join(&args.manifest))?;
        let schema_dir = match &args.schema {
            Some(schema) => schema.clone(),
            None => dir.join(&manifest.paths.schema),
        };
        let library = Arc::new(manifest.library()?);
        Ok(Self {
            dir,
            manifest,
            schema_dir,
            library,
        })
    }

    /// Resolve a path given on the command line against the project.
    pub fn path(&self, path: &Path) -> PathBuf {
        self.dir.join(path)
    }

    pub fn dump_dir(&self) -> PathBuf {
        self.dir.join(&self.manifest.paths.dump)
    }

    /// Build a fresh schema from the section definition files.
    ///
    /// Each `.toml` or `.json` file in the schema directory is one section,
    /// named after the file. Sections run in file name order.
    pub fn schema(&self) -> Result<Schema> {
        let mut sections = IndexMap::new();
        for (name, path) in files_by_stem(&self.schema_dir)? {
            let text = read_text(&path)?;
            let def = match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => SectionDef::from_toml(&text),
                Some("json") => SectionDef::from_json(&text),
                _ => {
                    tracing::debug!("Skipping {}", path.display());
                    continue;
                }
            }
            .with_context(|| format!("Invalid section definition: {}", path.display()))?;
            sections.insert(name, def);
        }
        if sections.is_empty() {
            anyhow::bail!("No section definitions in {}", self.schema_dir.display());
        }
        tracing::debug!(sections = sections.len(), "Loaded schema definitions");
        Ok(self.library.schema(sections))
    }

    pub fn read_rom(&self, path: &Path) -> Result<Rom> {
        let bytes = read_capped(&self.path(path), "ROM", MAX_ROM_BYTES)?;
        Ok(Rom::new(bytes, self.manifest.rom.mode))
    }

    pub fn write_rom(&self, path: &Path, rom: &Rom) -> Result<()> {
        let path = self.path(path);
        std::fs::write(&path, rom.as_bytes())
            .with_context(|| format!("Failed to write ROM: {}", path.display()))?;
        tracing::info!("Wrote {}", path.display());
        Ok(())
    }
}
