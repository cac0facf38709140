//! # Delete Command Implementation
//!
//! Deletes an item, or a collection with everything under it, from a hosted
//! repository or from a proxy's local cache.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use artifact_repo::output::{emoji, OutputConfig};

use super::load_registry;

/// Delete an item
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Repository id
    pub repository: String,

    /// Item or collection path
    pub path: String,
}

/// Execute the `delete` command.
pub fn execute(args: DeleteArgs, config: &Path, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let registry = load_registry(config)?;
    let deleted = registry
        .delete_item(&args.repository, &args.path)
        .with_context(|| format!("Failed to delete {}:{}", args.repository, args.path))?;

    if deleted {
        println!("{} Deleted {}:{}", emoji(&out, "🗑️", "[OK]"), args.repository, args.path);
    } else {
        println!(
            "{} Nothing stored at {}:{}",
            emoji(&out, "ℹ️", "[INFO]"),
            args.repository,
            args.path
        );
    }
    Ok(())
}
