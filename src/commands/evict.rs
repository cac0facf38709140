//! # Evict Command Implementation
//!
//! Deletes proxied items that have not been requested within a given period,
//! and removes the collections left empty. Without a repository argument
//! every proxy is swept; a group sweeps its proxy members.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use artifact_repo::output::{count_noun, emoji, OutputConfig};

use super::load_registry;

/// Evict unused proxied items
#[derive(Args, Debug)]
pub struct EvictArgs {
    /// Evict items not requested within this period
    ///
    /// Duration format: number followed by unit (s, m, h, d, w)
    /// Examples: "30d", "7d", "1h", "30m", "2w"
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub older_than: Duration,

    /// Repository to sweep (all proxies when omitted)
    pub repository: Option<String>,

    /// Print every evicted item
    #[arg(short, long)]
    pub verbose: bool,
}

/// Execute the `evict` command.
pub fn execute(args: EvictArgs, config: &Path, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let registry = load_registry(config)?;
    let evicted = registry
        .evict_unused_items(args.older_than, args.repository.as_deref())
        .context("Eviction failed")?;

    if args.verbose {
        for uid in &evicted {
            println!("  {}", uid);
        }
    }
    println!(
        "{} Evicted {}",
        emoji(&out, "🧹", "[OK]"),
        count_noun(evicted.len(), "unused item", "unused items")
    );
    Ok(())
}

/// Parse a duration string into a Duration
///
/// Format: whole number followed by unit (s, m, h, d, w)
/// Examples: "30d", "7d", "1h", "30m", "2w"
pub fn parse_duration(duration_str: &str) -> std::result::Result<Duration, String> {
    let duration_str = duration_str.trim().to_lowercase();
    if duration_str.is_empty() {
        return Err("Duration string cannot be empty".to_string());
    }

    let split_idx = duration_str
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(duration_str.len());
    if split_idx == 0 {
        return Err("Duration must start with a number".to_string());
    }

    let (number_str, unit_str) = duration_str.split_at(split_idx);
    let number: u64 = number_str
        .parse()
        .map_err(|e| format!("Invalid number in duration '{}': {}", number_str, e))?;

    let unit_secs = match unit_str {
        "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hr" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86400,
        "w" | "week" | "weeks" => 604800,
        "" => return Err("Duration needs a unit: s, m, h, d, w".to_string()),
        _ => {
            return Err(format!(
                "Invalid duration unit: '{}'. Valid units: s, m, h, d, w",
                unit_str
            ))
        }
    };

    number
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration '{}' is too large", duration_str))
}
