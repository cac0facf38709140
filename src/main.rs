//! # Artifact Repository CLI
//!
//! This is the binary entry point for the `artifact-repo` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Initialising logging from the `--log-level` flag.
//! - Executing the appropriate command and reporting top-level errors.
//!
//! The core logic lives in the `artifact_repo` library crate; the binary is a
//! thin wrapper around it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
