//! # Expire Command Implementation
//!
//! Marks proxied items under a path as expired, so the next request
//! revalidates them against the origin, and forgets remembered absences
//! under that path.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use artifact_repo::output::{count_noun, emoji, OutputConfig};

use super::load_registry;

/// Expire proxied items
#[derive(Args, Debug)]
pub struct ExpireArgs {
    /// Proxy or group repository id
    pub repository: String,

    /// Expire items at or below this path
    #[arg(default_value = "/")]
    pub path: String,
}

/// Execute the `expire` command.
pub fn execute(args: ExpireArgs, config: &Path, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let registry = load_registry(config)?;
    let expired = registry
        .expire_caches(&args.repository, &args.path)
        .with_context(|| format!("Failed to expire {}:{}", args.repository, args.path))?;
    println!(
        "{} Expired {} under {}:{}",
        emoji(&out, "⏳", "[OK]"),
        count_noun(expired, "item", "items"),
        args.repository,
        args.path
    );
    Ok(())
}
