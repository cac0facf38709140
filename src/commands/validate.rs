//! # Validate Command Implementation
//!
//! This module implements the `validate` subcommand, which checks the
//! `artifact-repo.yaml` configuration file without touching any repository.
//!
//! ## Functionality
//!
//! - **Parsing**: The file must match the configuration schema.
//! - **Relationships**: Repository ids are unique, group members exist and
//!   group nesting has no cycles.
//! - **Syntax**: Remote and mirror URLs parse, metadata patterns compile.
//! - **Warnings**: Settings that are legal but probably unintended, such as
//!   empty groups or a zero retry count. `--strict` turns them into errors.
//!
//! This command is a safe, read-only operation that does not modify any files.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use artifact_repo::config::{self, Config, RepositoryConfig};
use artifact_repo::output::{emoji, OutputConfig};

/// Validate the configuration file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Use strict validation (fail on warnings).
    #[arg(long)]
    pub strict: bool,
}

/// Execute the `validate` command.
///
/// # Arguments
/// * `args` - The command arguments
/// * `config_path` - The configuration file to validate
/// * `color_flag` - The value of the global --color flag ("always", "never", or "auto")
pub fn execute(args: ValidateArgs, config_path: &Path, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    println!(
        "{} Validating configuration: {}",
        emoji(&out, "🔍", "[SCAN]"),
        config_path.display()
    );

    let config = match config::from_file(config_path) {
        Ok(config) => {
            println!(
                "{} Configuration file parsed successfully",
                emoji(&out, "✅", "[OK]")
            );
            config
        }
        Err(e) => {
            println!(
                "{} Configuration parsing failed: {}",
                emoji(&out, "❌", "[ERR]"),
                e
            );
            return Err(anyhow::anyhow!("Configuration parsing failed: {}", e));
        }
    };

    println!("\n{} Configuration Summary:", emoji(&out, "📊", "[INFO]"));
    let count = |kind: &str| config.repositories.iter().filter(|r| r.kind() == kind).count();
    println!("   Hosted repositories: {}", count("hosted"));
    println!("   Proxy repositories: {}", count("proxy"));
    println!("   Group repositories: {}", count("group"));

    if let Err(e) = config::validate(&config) {
        println!("{} {}", emoji(&out, "❌", "[ERR]"), e);
        return Err(anyhow::anyhow!("Configuration is invalid: {}", e));
    }

    let warnings = warnings(&config);
    for warning in &warnings {
        println!("{} {}", emoji(&out, "⚠️", "[WARN]"), warning);
    }

    if !warnings.is_empty() && args.strict {
        return Err(anyhow::anyhow!(
            "Validation failed with {} warning(s) in strict mode",
            warnings.len()
        ));
    }

    println!("\n{} Configuration is valid", emoji(&out, "✅", "[OK]"));
    Ok(())
}

/// Legal settings that are probably mistakes.
fn warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.repositories.is_empty() {
        warnings.push("No repositories are configured".to_string());
    }
    for repository in &config.repositories {
        match repository {
            RepositoryConfig::Group(group) if group.members.is_empty() => {
                warnings.push(format!("Group '{}' has no members", group.id));
            }
            RepositoryConfig::Proxy(proxy) => {
                if proxy.retry_count == 0 {
                    warnings.push(format!(
                        "Proxy '{}' has retry_count 0; each origin is still tried once",
                        proxy.id
                    ));
                }
                if proxy.not_found_cache_ttl <= 0 {
                    warnings.push(format!(
                        "Proxy '{}' does not remember remote absences (not_found_cache_ttl <= 0)",
                        proxy.id
                    ));
                }
            }
            _ => {}
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artifact-repo.yaml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_validate_valid_config() {
        let (_dir, path) = write_config(
            r#"
repositories:
  - { id: releases, kind: hosted }
  - { id: public, kind: group, members: [releases] }
"#,
        );
        assert!(execute(ValidateArgs { strict: true }, &path, "never").is_ok());
    }

    #[test]
    fn test_validate_missing_member_fails() {
        let (_dir, path) = write_config(
            r#"
repositories:
  - { id: public, kind: group, members: [ghost] }
"#,
        );
        let err = execute(ValidateArgs { strict: false }, &path, "never").unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_validate_strict_fails_on_warnings() {
        let (_dir, path) = write_config(
            r#"
repositories:
  - { id: empty, kind: group }
"#,
        );
        assert!(execute(ValidateArgs { strict: false }, &path, "never").is_ok());
        assert!(execute(ValidateArgs { strict: true }, &path, "never").is_err());
    }

    #[test]
    fn test_warnings_for_proxy_settings() {
        let config = config::parse(
            r#"
repositories:
  - id: central
    kind: proxy
    remote_url: https://repo.example.org/
    retry_count: 0
    not_found_cache_ttl: 0
"#,
        )
        .unwrap();
        assert_eq!(warnings(&config).len(), 2);
    }
}
