//! # Deploy Command Implementation
//!
//! Stores a local file into a hosted repository.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use artifact_repo::output::{emoji, human_size, OutputConfig};

use super::load_registry;

/// Store a file into a hosted repository
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Hosted repository id
    pub repository: String,

    /// Target item path
    pub path: String,

    /// File to upload
    pub file: PathBuf,
}

/// Execute the `deploy` command.
pub fn execute(args: DeployArgs, config: &Path, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let content = fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let length = content.len();

    let registry = load_registry(config)?;
    registry
        .store_item(&args.repository, &args.path, content)
        .with_context(|| format!("Failed to deploy to {}:{}", args.repository, args.path))?;

    println!(
        "{} Deployed {}:{} ({})",
        emoji(&out, "📦", "[OK]"),
        args.repository,
        args.path,
        human_size(length as u64)
    );
    Ok(())
}
