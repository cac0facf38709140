//! # Get Command Implementation
//!
//! Resolves an item through a repository (hosted, proxy or group) and writes
//! its content to stdout or to a file. Resolving a collection prints the
//! names of its children, one per line.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use artifact_repo::item::StorageItem;
use artifact_repo::request::ResourceStoreRequest;

use super::load_registry;

/// Resolve an item
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Repository id
    pub repository: String,

    /// Item path, e.g. /org/example/lib/1.0/lib-1.0.jar
    pub path: String,

    /// Only serve what is already stored locally
    #[arg(long, conflicts_with = "remote_only")]
    pub local_only: bool,

    /// Revalidate against the remote origin even if the local copy is fresh
    #[arg(long)]
    pub remote_only: bool,

    /// Treat the local copy as expired and bypass the negative cache
    #[arg(long)]
    pub as_expired: bool,

    /// Ask the members of a group for local content only
    #[arg(long)]
    pub group_local_only: bool,

    /// Write the content to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Execute the `get` command.
pub fn execute(args: GetArgs, config: &Path) -> Result<()> {
    let registry = load_registry(config)?;
    let request = ResourceStoreRequest::new(&args.path)?
        .local_only(args.local_only)
        .remote_only(args.remote_only)
        .as_expired(args.as_expired)
        .group_local_only(args.group_local_only);

    let item = registry
        .retrieve_item(&args.repository, request)
        .with_context(|| format!("Failed to get {}:{}", args.repository, args.path))?;

    match item {
        StorageItem::File(file) => {
            let content = file.read()?;
            match &args.output {
                Some(path) => fs::write(path, &content)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => io::stdout().write_all(&content)?,
            }
        }
        StorageItem::Collection(collection) => {
            let mut stdout = io::stdout().lock();
            for child in &collection.children {
                writeln!(stdout, "{}", child)?;
            }
        }
    }
    Ok(())
}
