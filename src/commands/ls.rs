//! # Ls Command Implementation
//!
//! Lists the children of a collection. For a group, the listing is the
//! union of its members' listings.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use artifact_repo::request::ResourceStoreRequest;

use super::load_registry;

/// List a collection
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Repository id
    pub repository: String,

    /// Collection path
    #[arg(default_value = "/")]
    pub path: String,

    /// Only list what is stored locally in group members
    #[arg(long)]
    pub group_local_only: bool,
}

/// Execute the `ls` command.
pub fn execute(args: LsArgs, config: &Path) -> Result<()> {
    let registry = load_registry(config)?;
    let request = ResourceStoreRequest::new(&args.path)?.group_local_only(args.group_local_only);
    let children = registry
        .list(&args.repository, request)
        .with_context(|| format!("Failed to list {}:{}", args.repository, args.path))?;
    for child in children {
        println!("{}", child);
    }
    Ok(())
}
