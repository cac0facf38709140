//! # Purge NFC Command Implementation
//!
//! Drops the negative cache (remembered remote absences) of a proxy, or of
//! every proxy member of a group.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use artifact_repo::output::{count_noun, emoji, OutputConfig};

use super::load_registry;

/// Purge the negative cache
#[derive(Args, Debug)]
pub struct PurgeNfcArgs {
    /// Proxy or group repository id
    pub repository: String,
}

/// Execute the `purge-nfc` command.
pub fn execute(args: PurgeNfcArgs, config: &Path, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let registry = load_registry(config)?;
    let purged = registry
        .purge_not_found_cache(&args.repository)
        .with_context(|| format!("Failed to purge negative cache of {}", args.repository))?;
    println!(
        "{} Purged {} from {}",
        emoji(&out, "🧽", "[OK]"),
        count_noun(purged, "negative cache entry", "negative cache entries"),
        args.repository
    );
    Ok(())
}
