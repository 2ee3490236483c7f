//! romkit: schema-driven bidirectional codec for cartridge ROM images
//!
//! A schema describes where data lives in a bank-addressed ROM and how it is
//! shown to a human. The same schema decodes the image into editable text
//! files and encodes edited files back into a patched copy of the image.
//!
//! # Key Features
//!
//! - **Four directions per node**: decode, encode, parse and format
//! - **Pointer deduplication**: equal payloads are written once and shared
//! - **Cross-section references**: enums labelled by another section's data
//! - **Declarative schemas**: sections as TOML or JSON definitions
//!
//! # Modules
//!
//! - [`rom`] - Bank-addressed buffer with LoROM/HiROM mapping
//! - [`types`] - Node algebra (scalars, structs, forks, pointers, text, tiles)
//! - [`schema`] - Section orchestrator
//! - [`representation`] - JSON, YAML, tabular and plain text renderings
//! - [`definition`] - Serde definitions that build into nodes
//! - [`checksum`] - HiROM header checksum
//!
//! # Usage
//!
//! ```ignore
//! use romkit::{AddressMode, Rom, Schema};
//!
//! let mut rom = Rom::new(std::fs::read("game.sfc")?, AddressMode::HiRom);
//! let mut schema = build_schema();
//! let data = schema.decode(&mut rom)?;
//! let texts = schema.format(&data)?;
//!
//! // ... edit texts ...
//!
//! let data = schema.parse(&texts)?;
//! let patched = schema.encode(&data, &rom)?;
//! ```

pub mod checksum;
pub mod definition;
pub mod error;
pub mod lookup;
pub mod pass;
pub mod representation;
pub mod rom;
pub mod schema;
pub mod search;
pub mod types;
pub mod value;

pub use definition::{Library, SectionDef, TableDef, TypeDef};
pub use error::{Annotate, CodecError, Result};
pub use lookup::Lookup;
pub use pass::Pass;
pub use representation::Representation;
pub use rom::{AddressMode, Rom, Width};
pub use schema::{Optimizer, Resolver, Schema, Section, State};
pub use search::search;
pub use types::{Codec, TypeRef, node};
pub use value::{Fields, Value};
