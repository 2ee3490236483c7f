//! romkit.toml manifest parsing

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use romkit::{AddressMode, Library, TableDef, TypeDef};
use serde::Deserialize;

/// romkit.toml manifest structure
#[derive(Debug, Default, Deserialize)]
pub struct RomkitManifest {
    #[serde(default)]
    pub rom: RomSection,
    #[serde(default)]
    pub paths: PathsSection,
    /// Lookup tables shared by every section definition
    #[serde(default)]
    pub tables: IndexMap<String, TableDef>,
    /// Nodes shared by several sections, such as index tables
    #[serde(default)]
    pub shared: IndexMap<String, TypeDef>,
}

/// Image settings
#[derive(Debug, Default, Deserialize)]
pub struct RomSection {
    /// Address mapping of the image.
    /// Default: hirom
    #[serde(default)]
    pub mode: AddressMode,

    /// Rewrite the header checksum after importing.
    /// Default: false
    #[serde(default)]
    pub checksum: bool,
}

/// Directory layout, relative to the project directory
#[derive(Debug, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_schema_dir")]
    pub schema: String,
    #[serde(default = "default_dump_dir")]
    pub dump: String,
}

fn default_schema_dir() -> String {
    "schema".to_string()
}

fn default_dump_dir() -> String {
    "dump".to_string()
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            schema: default_schema_dir(),
            dump: default_dump_dir(),
        }
    }
}

impl RomkitManifest {
    /// Load manifest from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Load the manifest if present, otherwise use defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No manifest at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parse manifest from string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse romkit.toml")
    }

    /// Build the shared tables and nodes
    pub fn library(&self) -> Result<Library> {
        Library::new(&self.tables, &self.shared).context("Invalid tables or shared nodes in manifest")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_manifest() {
        let manifest = RomkitManifest::parse(
            r#"
[rom]
mode = "lorom"
checksum = true

[paths]
schema = "defs"

[tables.font]
"0x41" = "A"
"0x42" = "B"

[tables.kinds]
0 = "junk"

[shared.name]
kind = "text"
table = "font"
terminator = 0
"#,
        )
        .unwrap();

        assert_eq!(manifest.rom.mode, AddressMode::LoRom);
        assert!(manifest.rom.checksum);
        assert_eq!(manifest.paths.schema, "defs");
        assert_eq!(manifest.paths.dump, "dump");
        assert_eq!(manifest.tables.len(), 2);

        let library = manifest.library().unwrap();
        assert_eq!(library.table("font").unwrap().value("B").unwrap(), 0x42);
        assert!(library.shared("name").is_ok());
    }

    #[test]
    fn test_empty_manifest_uses_defaults() {
        let manifest = RomkitManifest::parse("").unwrap();
        assert_eq!(manifest.rom.mode, AddressMode::HiRom);
        assert!(!manifest.rom.checksum);
        assert_eq!(manifest.paths.schema, "schema");
    }

    #[test]
    fn test_bad_table_is_reported() {
        let manifest = RomkitManifest::parse("[tables.font]\n\"0xZZ\" = \"A\"").unwrap();
        let err = manifest.library().unwrap_err();
        assert!(format!("{err:#}").contains("tables.font"));
    }
}
