//! Default values for artifact-repo configuration.
//!
//! This module provides centralized default values used by the configuration
//! layer, the proxy policy and the CLI, ensuring consistency and avoiding
//! duplication.

use std::path::PathBuf;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "artifact-repo.yaml";

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV_VAR: &str = "ARTIFACT_REPO_CONFIG";

/// Max age in minutes of release artifacts before revalidation (one day).
pub const ARTIFACT_MAX_AGE: i64 = 1440;

/// Max age in minutes of metadata items before revalidation.
pub const METADATA_MAX_AGE: i64 = 30;

/// Paths matching these patterns use the metadata max age.
pub const METADATA_PATTERNS: &[&str] = &[r"maven-metadata\.xml$"];

/// Minutes a confirmed remote absence is remembered.
pub const NOT_FOUND_CACHE_TTL: i64 = 1440;

/// Attempts per origin before moving to the next one.
pub const RETRY_COUNT: u32 = 3;

/// Minutes an auto-blocked proxy stays blocked before probing the origin again.
pub const AUTO_BLOCK_RETAIN: i64 = 5;

/// Minutes a failing mirror is skipped.
pub const MIRROR_BLACKLIST: i64 = 30;

pub const CONNECT_TIMEOUT_SECS: u64 = 10;

pub const READ_TIMEOUT_SECS: u64 = 60;

/// Returns the default storage root directory.
///
/// Uses the platform-appropriate data directory:
/// - Linux: `~/.local/share/artifact-repo` (XDG Base Directory)
/// - macOS: `~/Library/Application Support/artifact-repo`
/// - Windows: `{FOLDERID_RoamingAppData}\artifact-repo`
///
/// Falls back to `.artifact-repo` in the current directory if the platform
/// data directory cannot be determined.
///
/// This can be overridden by `storage_root` in the configuration file.
pub fn default_storage_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".artifact-repo"))
        .join("artifact-repo")
}
