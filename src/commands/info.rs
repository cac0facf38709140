//! # Info Command Implementation
//!
//! This module implements the `info` subcommand, which displays the
//! configured repositories: their kind and storage, the proxy policy of
//! proxies, and the direct and transitive members of groups.
//!
//! This command is a safe, read-only operation that does not modify any files.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{anyhow, Result};
use clap::Args;

use artifact_repo::config::{Config, RepositoryConfig};
use artifact_repo::repository::RepositoryRegistry;

use super::load_config;

/// Show repository details
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Repository id (all repositories when omitted)
    pub repository: Option<String>,
}

/// Execute the `info` command.
pub fn execute(args: InfoArgs, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = RepositoryRegistry::from_config(&config)?;
    println!("📋 Configuration: {}", config_path.display());
    print!("{}", describe(&config, &registry, args.repository.as_deref())?);
    Ok(())
}

fn minutes(value: i64) -> String {
    match value {
        v if v < 0 => "never expires".to_string(),
        0 => "always revalidate".to_string(),
        v => format!("{} min", v),
    }
}

/// Human-readable description of one or all repositories.
fn describe(config: &Config, registry: &RepositoryRegistry, only: Option<&str>) -> Result<String> {
    let selected: Vec<&RepositoryConfig> = match only {
        Some(id) => vec![config
            .repository(id)
            .ok_or_else(|| anyhow!("No repository '{}' in configuration", id))?],
        None => config.repositories.iter().collect(),
    };

    let mut out = String::new();
    writeln!(out, "Storage root: {}", config.storage_root().display())?;
    for repository in selected {
        writeln!(out)?;
        writeln!(out, "{} ({})", repository.id(), repository.kind())?;
        match repository {
            RepositoryConfig::Hosted(hosted) => {
                writeln!(out, "  storage: {:?}", hosted.storage)?;
            }
            RepositoryConfig::Proxy(proxy) => {
                writeln!(out, "  storage: {:?}", proxy.storage)?;
                writeln!(out, "  remote: {}", proxy.remote_url)?;
                for mirror in &proxy.mirrors {
                    writeln!(out, "  mirror {}: {}", mirror.id, mirror.url)?;
                }
                writeln!(out, "  artifact max age: {}", minutes(proxy.artifact_max_age))?;
                writeln!(out, "  metadata max age: {}", minutes(proxy.metadata_max_age))?;
                writeln!(out, "  metadata patterns: {}", proxy.metadata_patterns.join(", "))?;
                writeln!(out, "  not-found cache TTL: {}", minutes(proxy.not_found_cache_ttl))?;
                writeln!(out, "  retry count: {}", proxy.retry_count)?;
                writeln!(out, "  authoritative not-found: {}", proxy.authoritative_not_found)?;
                writeln!(
                    out,
                    "  auto block: {} (retain {} min)",
                    proxy.auto_block, proxy.auto_block_retain
                )?;
                writeln!(
                    out,
                    "  timeouts: connect {}s, read {}s",
                    proxy.connect_timeout_secs, proxy.read_timeout_secs
                )?;
            }
            RepositoryConfig::Group(group) => {
                writeln!(out, "  members: {}", group.members.join(", "))?;
                let transitive = registry.transitive_members(&group.id)?;
                writeln!(out, "  transitive members: {}", transitive.join(", "))?;
                writeln!(out, "  path cache: {}", group.path_cache)?;
            }
        }
    }
    Ok(out)
}
