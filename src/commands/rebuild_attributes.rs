//! # Rebuild Attributes Command Implementation
//!
//! Recomputes the length, digest and MIME type of every stored file from its
//! content, without contacting any origin.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use artifact_repo::output::{count_noun, emoji, OutputConfig};

use super::load_registry;

/// Rebuild item attributes
#[derive(Args, Debug)]
pub struct RebuildAttributesArgs {
    /// Repository id (a group rebuilds its members)
    pub repository: String,
}

/// Execute the `rebuild-attributes` command.
pub fn execute(args: RebuildAttributesArgs, config: &Path, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let registry = load_registry(config)?;
    let rebuilt = registry
        .rebuild_attributes(&args.repository)
        .with_context(|| format!("Failed to rebuild attributes of {}", args.repository))?;
    println!(
        "{} Rebuilt attributes of {} in {}",
        emoji(&out, "🔧", "[OK]"),
        count_noun(rebuilt, "item", "items"),
        args.repository
    );
    Ok(())
}
