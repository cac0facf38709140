//! # Configuration Schema and Parsing
//!
//! This module defines the data structures that represent the
//! `artifact-repo.yaml` configuration file, and the logic for parsing,
//! validating and saving it.
//!
//! ## Key Components
//!
//! - **`Config`**: The whole file: an optional storage root and the list of
//!   repositories.
//!
//! - **`RepositoryConfig`**: One repository, tagged by `kind:` as `hosted`,
//!   `proxy` or `group`. Each kind has its own struct (`HostedConfig`,
//!   `ProxyConfig`, `GroupConfig`) holding its settings; omitted settings take
//!   the values in [`crate::defaults`].
//!
//! ## Example
//!
//! ```yaml
//! storage_root: /var/lib/artifact-repo
//! repositories:
//!   - id: releases
//!     kind: hosted
//!   - id: central
//!     kind: proxy
//!     remote_url: https://repo.example.org/maven2/
//!     mirrors:
//!       - { id: eu, url: https://eu.example.org/maven2/ }
//!   - id: public
//!     kind: group
//!     members: [releases, central]
//! ```
//!
//! Parsing only checks the shape of the file. [`validate`] checks the
//! relationships between repositories (unique ids, existing members, no
//! cycles) and the syntax of URLs and patterns.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::path::PathClassifier;
use crate::proxy::ProxyPolicy;
use crate::remote::Mirror;
use crate::storage::write_atomic;

/// Where a repository keeps its items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Under `<storage_root>/<id>/`.
    #[default]
    Filesystem,
    /// In process memory; lost on exit.
    Memory,
}

/// A repository holding deployed content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedConfig {
    pub id: String,
    #[serde(default)]
    pub storage: StorageBackend,
}

/// A repository caching a remote origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub id: String,
    /// Canonical origin, tried after every mirror.
    pub remote_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<Mirror>,
    #[serde(default)]
    pub storage: StorageBackend,
    /// Minutes; `-1` never expires, `0` always revalidates.
    #[serde(default = "default_artifact_max_age")]
    pub artifact_max_age: i64,
    #[serde(default = "default_metadata_max_age")]
    pub metadata_max_age: i64,
    /// Regular expressions selecting paths that use `metadata_max_age`.
    #[serde(default = "default_metadata_patterns")]
    pub metadata_patterns: Vec<String>,
    #[serde(default = "default_not_found_cache_ttl")]
    pub not_found_cache_ttl: i64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default)]
    pub authoritative_not_found: bool,
    #[serde(default = "default_true")]
    pub auto_block: bool,
    #[serde(default = "default_auto_block_retain")]
    pub auto_block_retain: i64,
    #[serde(default = "default_mirror_blacklist")]
    pub mirror_blacklist: i64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

/// A read-only aggregate of other repositories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    /// Member ids in resolution order.
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub path_cache: bool,
}

/// One configured repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepositoryConfig {
    Hosted(HostedConfig),
    Proxy(ProxyConfig),
    Group(GroupConfig),
}

/// The configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of filesystem-backed repositories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_root: Option<PathBuf>,
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

fn default_artifact_max_age() -> i64 {
    defaults::ARTIFACT_MAX_AGE
}

fn default_metadata_max_age() -> i64 {
    defaults::METADATA_MAX_AGE
}

fn default_metadata_patterns() -> Vec<String> {
    defaults::METADATA_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_not_found_cache_ttl() -> i64 {
    defaults::NOT_FOUND_CACHE_TTL
}

fn default_retry_count() -> u32 {
    defaults::RETRY_COUNT
}

fn default_true() -> bool {
    true
}

fn default_auto_block_retain() -> i64 {
    defaults::AUTO_BLOCK_RETAIN
}

fn default_mirror_blacklist() -> i64 {
    defaults::MIRROR_BLACKLIST
}

fn default_connect_timeout_secs() -> u64 {
    defaults::CONNECT_TIMEOUT_SECS
}

fn default_read_timeout_secs() -> u64 {
    defaults::READ_TIMEOUT_SECS
}

impl ProxyConfig {
    /// A proxy with every setting at its default.
    pub fn new(id: &str, remote_url: &str) -> Self {
        Self {
            id: id.to_string(),
            remote_url: remote_url.to_string(),
            mirrors: Vec::new(),
            storage: StorageBackend::default(),
            artifact_max_age: default_artifact_max_age(),
            metadata_max_age: default_metadata_max_age(),
            metadata_patterns: default_metadata_patterns(),
            not_found_cache_ttl: default_not_found_cache_ttl(),
            retry_count: default_retry_count(),
            authoritative_not_found: false,
            auto_block: true,
            auto_block_retain: default_auto_block_retain(),
            mirror_blacklist: default_mirror_blacklist(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }

    /// The proxy policy these settings describe.
    pub fn policy(&self) -> Result<ProxyPolicy> {
        Ok(ProxyPolicy {
            artifact_max_age: self.artifact_max_age,
            metadata_max_age: self.metadata_max_age,
            metadata: PathClassifier::new(&self.metadata_patterns)?,
            not_found_cache_ttl: self.not_found_cache_ttl,
            retry_count: self.retry_count,
            authoritative_not_found: self.authoritative_not_found,
            auto_block: self.auto_block,
            auto_block_retain: self.auto_block_retain,
            mirror_blacklist: self.mirror_blacklist,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl RepositoryConfig {
    pub fn id(&self) -> &str {
        match self {
            RepositoryConfig::Hosted(c) => &c.id,
            RepositoryConfig::Proxy(c) => &c.id,
            RepositoryConfig::Group(c) => &c.id,
        }
    }

    /// `hosted`, `proxy` or `group`.
    pub fn kind(&self) -> &'static str {
        match self {
            RepositoryConfig::Hosted(_) => "hosted",
            RepositoryConfig::Proxy(_) => "proxy",
            RepositoryConfig::Group(_) => "group",
        }
    }
}

impl Config {
    /// The configured storage root, or the platform default.
    pub fn storage_root(&self) -> PathBuf {
        self.storage_root
            .clone()
            .unwrap_or_else(defaults::default_storage_root)
    }

    pub fn repository(&self, id: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|r| r.id() == id)
    }

    /// Members of group `id`, `None` if `id` is not a configured group.
    fn group_members(&self, id: &str) -> Option<&[String]> {
        match self.repository(id) {
            Some(RepositoryConfig::Group(group)) => Some(&group.members),
            _ => None,
        }
    }
}

/// Parses a YAML string into a `Config`.
pub fn parse(yaml_content: &str) -> Result<Config> {
    if yaml_content.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(yaml_content).map_err(|e| Error::ConfigParse {
        message: e.to_string(),
        hint: Some(
            "each repository needs an 'id' and a 'kind' of hosted, proxy or group".to_string(),
        ),
    })
}

/// Parse a Config from a YAML file path
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Write `config` to `path`, replacing the file atomically.
pub fn save<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let yaml = serde_yaml::to_string(config)?;
    write_atomic(path.as_ref(), yaml.as_bytes())
}

fn invalid(message: String, hint: Option<&str>) -> Error {
    Error::ConfigParse {
        message,
        hint: hint.map(str::to_string),
    }
}

fn check_url(id: &str, url: &str) -> Result<()> {
    url::Url::parse(url)
        .map(|_| ())
        .map_err(|e| invalid(format!("Repository '{}' has invalid URL '{}': {}", id, url, e), None))
}

/// Check the relationships between repositories and the syntax of URLs and
/// patterns.
pub fn validate(config: &Config) -> Result<()> {
    let mut ids = BTreeSet::new();
    for repository in &config.repositories {
        let id = repository.id();
        if id.trim().is_empty() {
            return Err(invalid(
                "Repository with empty id".to_string(),
                Some("Give every repository a non-empty 'id'"),
            ));
        }
        if !ids.insert(id) {
            return Err(invalid(
                format!("Duplicate repository id '{}'", id),
                Some("Repository ids must be unique"),
            ));
        }
    }

    for repository in &config.repositories {
        match repository {
            RepositoryConfig::Hosted(_) => {}
            RepositoryConfig::Proxy(proxy) => {
                check_url(&proxy.id, &proxy.remote_url)?;
                let mut mirror_ids = BTreeSet::new();
                for mirror in &proxy.mirrors {
                    check_url(&proxy.id, &mirror.url)?;
                    if !mirror_ids.insert(mirror.id.as_str()) {
                        return Err(invalid(
                            format!("Proxy '{}' has duplicate mirror id '{}'", proxy.id, mirror.id),
                            None,
                        ));
                    }
                }
                PathClassifier::new(&proxy.metadata_patterns).map_err(|e| {
                    invalid(
                        format!("Proxy '{}' has an invalid metadata pattern: {}", proxy.id, e),
                        Some("metadata_patterns are regular expressions"),
                    )
                })?;
            }
            RepositoryConfig::Group(group) => {
                let mut seen = BTreeSet::new();
                for member in &group.members {
                    if !ids.contains(member.as_str()) {
                        return Err(invalid(
                            format!("Group '{}' references unknown repository '{}'", group.id, member),
                            Some("Define the member repository or remove it from 'members'"),
                        ));
                    }
                    if !seen.insert(member.as_str()) {
                        return Err(invalid(
                            format!("Group '{}' lists member '{}' twice", group.id, member),
                            None,
                        ));
                    }
                }
            }
        }
    }

    check_cycles(config)
}

/// Depth-first search for a group reaching itself through its members.
fn check_cycles(config: &Config) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        config: &'a Config,
        id: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Result<()> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                stack.push(id);
                return Err(invalid(
                    format!("Group membership cycle: {}", stack.join(" -> ")),
                    Some("A group cannot contain itself, directly or through other groups"),
                ));
            }
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        stack.push(id);
        for member in config.group_members(id).unwrap_or_default() {
            visit(config, member, marks, stack)?;
        }
        stack.pop();
        marks.insert(id, Mark::Done);
        Ok(())
    }

    let mut marks = BTreeMap::new();
    for repository in &config.repositories {
        if let RepositoryConfig::Group(group) = repository {
            visit(config, &group.id, &mut marks, &mut Vec::new())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FULL: &str = r#"
storage_root: /var/lib/artifact-repo
repositories:
  - id: releases
    kind: hosted
  - id: central
    kind: proxy
    remote_url: https://repo.example.org/maven2/
    mirrors:
      - { id: eu, url: "https://eu.example.org/maven2/" }
    artifact_max_age: -1
    retry_count: 5
    storage: memory
  - id: public
    kind: group
    members: [releases, central]
    path_cache: true
"#;

    #[test]
    fn test_parse_full_config() {
        let config = parse(FULL).unwrap();
        assert_eq!(config.storage_root, Some(PathBuf::from("/var/lib/artifact-repo")));
        assert_eq!(config.repositories.len(), 3);

        match &config.repositories[0] {
            RepositoryConfig::Hosted(hosted) => {
                assert_eq!(hosted.id, "releases");
                assert_eq!(hosted.storage, StorageBackend::Filesystem);
            }
            other => panic!("Expected hosted repository, got {:?}", other),
        }

        match &config.repositories[1] {
            RepositoryConfig::Proxy(proxy) => {
                assert_eq!(proxy.remote_url, "https://repo.example.org/maven2/");
                assert_eq!(proxy.mirrors.len(), 1);
                assert_eq!(proxy.mirrors[0].id, "eu");
                assert_eq!(proxy.artifact_max_age, -1);
                assert_eq!(proxy.metadata_max_age, defaults::METADATA_MAX_AGE);
                assert_eq!(proxy.retry_count, 5);
                assert!(proxy.auto_block);
                assert_eq!(proxy.storage, StorageBackend::Memory);
            }
            other => panic!("Expected proxy repository, got {:?}", other),
        }

        match &config.repositories[2] {
            RepositoryConfig::Group(group) => {
                assert_eq!(group.members, vec!["releases", "central"]);
                assert!(group.path_cache);
            }
            other => panic!("Expected group repository, got {:?}", other),
        }

        validate(&config).unwrap();
    }

    #[test]
    fn test_proxy_policy_from_config() {
        let mut proxy = ProxyConfig::new("central", "https://repo.example.org/");
        proxy.metadata_max_age = 5;
        let policy = proxy.policy().unwrap();
        assert_eq!(policy.max_age_for("/g/a/maven-metadata.xml"), 5);
        assert_eq!(policy.max_age_for("/g/a/1.0/a-1.0.jar"), defaults::ARTIFACT_MAX_AGE);
        assert_eq!(proxy.connect_timeout(), Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS));
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse("").unwrap();
        assert!(config.repositories.is_empty());
        assert_eq!(config.storage_root(), defaults::default_storage_root());
    }

    #[test]
    fn test_parse_unknown_kind_has_hint() {
        let yaml = r#"
repositories:
  - id: odd
    kind: virtual
"#;
        match parse(yaml) {
            Err(Error::ConfigParse { hint, .. }) => assert!(hint.is_some()),
            other => panic!("Expected ConfigParse error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut config = parse(FULL).unwrap();
        config.repositories.push(RepositoryConfig::Hosted(HostedConfig {
            id: "central".to_string(),
            storage: StorageBackend::Memory,
        }));
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("Duplicate repository id 'central'"));
    }

    #[test]
    fn test_validate_rejects_unknown_member() {
        let yaml = r#"
repositories:
  - id: public
    kind: group
    members: [missing]
"#;
        let err = validate(&parse(yaml).unwrap()).unwrap_err();
        assert!(err.to_string().contains("unknown repository 'missing'"));
    }

    #[test]
    fn test_validate_rejects_cycles() {
        let yaml = r#"
repositories:
  - id: a
    kind: group
    members: [b]
  - id: b
    kind: group
    members: [c]
  - id: c
    kind: group
    members: [a]
"#;
        let err = validate(&parse(yaml).unwrap()).unwrap_err();
        assert!(err.to_string().contains("cycle: a -> b -> c -> a"));
    }

    #[test]
    fn test_validate_rejects_bad_url_and_pattern() {
        let mut proxy = ProxyConfig::new("central", "not a url");
        let config = Config {
            storage_root: None,
            repositories: vec![RepositoryConfig::Proxy(proxy.clone())],
        };
        assert!(validate(&config).unwrap_err().to_string().contains("invalid URL"));

        proxy.remote_url = "https://repo.example.org/".to_string();
        proxy.metadata_patterns = vec!["(unclosed".to_string()];
        let config = Config {
            storage_root: None,
            repositories: vec![RepositoryConfig::Proxy(proxy)],
        };
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("invalid metadata pattern"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(defaults::CONFIG_FILE_NAME);
        let config = parse(FULL).unwrap();

        save(&config, &path).unwrap();

        assert_eq!(from_file(&path).unwrap(), config);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != path)
            .collect();
        assert!(leftovers.is_empty());
    }
}
