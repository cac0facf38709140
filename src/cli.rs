//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use artifact_repo::defaults;

/// Artifact Repository - Resolve, cache and maintain repository content
#[derive(Parser, Debug)]
#[command(name = "artifact-repo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        env = defaults::CONFIG_ENV_VAR,
        default_value = defaults::CONFIG_FILE_NAME
    )]
    config: PathBuf,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG overrides it
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve an item and print its content (or a collection's children)
    Get(commands::get::GetArgs),

    /// List the children of a collection
    Ls(commands::ls::LsArgs),

    /// Store a file into a hosted repository
    Deploy(commands::deploy::DeployArgs),

    /// Delete an item or collection
    Delete(commands::delete::DeleteArgs),

    /// Evict proxied items that have not been requested recently
    Evict(commands::evict::EvictArgs),

    /// Mark proxied items expired so they are revalidated
    Expire(commands::expire::ExpireArgs),

    /// Recompute item attributes from stored content
    RebuildAttributes(commands::rebuild_attributes::RebuildAttributesArgs),

    /// Forget remembered remote absences
    PurgeNfc(commands::purge_nfc::PurgeNfcArgs),

    /// Show repository details
    Info(commands::info::InfoArgs),

    /// Show group membership as a tree
    Tree(commands::tree::TreeArgs),

    /// Validate the configuration file
    Validate(commands::validate::ValidateArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(self.log_level.as_str()),
        )
        .init();

        let config = self.config.as_path();
        let color = self.color.as_str();
        match self.command {
            Commands::Get(args) => commands::get::execute(args, config),
            Commands::Ls(args) => commands::ls::execute(args, config),
            Commands::Deploy(args) => commands::deploy::execute(args, config, color),
            Commands::Delete(args) => commands::delete::execute(args, config, color),
            Commands::Evict(args) => commands::evict::execute(args, config, color),
            Commands::Expire(args) => commands::expire::execute(args, config, color),
            Commands::RebuildAttributes(args) => {
                commands::rebuild_attributes::execute(args, config, color)
            }
            Commands::PurgeNfc(args) => commands::purge_nfc::execute(args, config, color),
            Commands::Info(args) => commands::info::execute(args, config),
            Commands::Tree(args) => commands::tree::execute(args, config),
            Commands::Validate(args) => commands::validate::execute(args, config, color),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}
