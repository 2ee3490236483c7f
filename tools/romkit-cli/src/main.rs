//! romkit CLI - dump ROM data to editable files and build it back
//!
//! # Commands
//!
//! - `romkit dump` - Decode a ROM into one text file per section
//! - `romkit import` - Parse edited files and write a patched ROM
//! - `romkit test` - Check that the schema round-trips a ROM unchanged
//! - `romkit optimize` - Re-encode a ROM with shared payloads merged
//! - `romkit checksum` - Show or fix the HiROM header checksum
//!
//! # Usage
//!
//! In a project directory with romkit.toml:
//! ```bash
//! romkit dump game.sfc
//! # ... edit dump/*.tsv ...
//! romkit import game.sfc --save-as patched.sfc
//! ```
//!
//! # Manifest (romkit.toml)
//!
//! ```toml
//! [rom]
//! mode = "hirom"
//! checksum = true
//!
//! [paths]
//! schema = "schema"
//! dump = "dump"
//!
//! [tables.font]
//! "0x41" = "A"
//! "0x42" = "B"
//! ```
//!
//! Every `.toml` or `.json` file in the schema directory defines one section.

mod checksum;
mod dump;
mod import;
mod manifest;
mod optimize;
mod project;
mod roundtrip;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// romkit CLI - dump ROM data to editable files and build it back
#[derive(Parser)]
#[command(name = "romkit")]
#[command(about = "Schema-driven ROM data editor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a ROM into one text file per section
    Dump(dump::DumpArgs),

    /// Parse edited files and write a patched ROM
    Import(import::ImportArgs),

    /// Check that the schema round-trips a ROM unchanged
    Test(roundtrip::TestArgs),

    /// Re-encode a ROM with shared payloads merged
    Optimize(optimize::OptimizeArgs),

    /// Show or fix the HiROM header checksum
    Checksum(checksum::ChecksumArgs),
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dump(args) => dump::execute(args),
        Commands::Import(args) => import::execute(args),
        Commands::Test(args) => roundtrip::execute(args),
        Commands::Optimize(args) => optimize::execute(args),
        Commands::Checksum(args) => checksum::execute(args),
    }
}
