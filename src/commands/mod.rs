//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `artifact-repo` command-line tool. Each subcommand is defined in its own
//! file to keep the logic separated and maintainable.
//!
//! ## Structure
//!
//! Each command module typically contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args`, the configuration
//!   file path and, where it prints status lines, the global `--color` flag.
//!
//! Every invocation builds a fresh [`RepositoryRegistry`] from the
//! configuration file, so in-process state such as negative caches and proxy
//! modes lasts for one command only. Stored items and their attributes
//! persist under the storage root.

use std::path::Path;

use anyhow::{Context, Result};

use artifact_repo::config::{self, Config};
use artifact_repo::repository::RepositoryRegistry;

pub mod completions;
pub mod delete;
pub mod deploy;
pub mod evict;
pub mod expire;
pub mod get;
pub mod info;
pub mod ls;
pub mod purge_nfc;
pub mod rebuild_attributes;
pub mod tree;
pub mod validate;

/// Load and parse the configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    config::from_file(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Load the configuration file and build the registry it describes.
pub fn load_registry(path: &Path) -> Result<RepositoryRegistry> {
    let config = load_config(path)?;
    RepositoryRegistry::from_config(&config)
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}
