//! Shared test utilities for integration and E2E tests.
//!
//! This module provides fixtures for a temporary workspace holding an
//! `artifact-repo.yaml`, a storage root and one or more local origin
//! directories served through `file://` URLs, plus an instrumented origin
//! transport for library-level tests.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new()
//!         .with_origin_file("origin", "/org/lib/1.0/lib-1.0.jar", "jar");
//!     let config = configs::proxy(&fixture, "origin");
//!     let fixture = fixture.with_config(&config);
//!     // ... test code
//! }
//! ```

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use assert_fs::prelude::*;
use parking_lot::Mutex;

use artifact_repo::error::{Error, Result};
use artifact_repo::remote::{FetchContext, FetchOutcome, FileRemoteStorage, RemoteStorage};

/// Re-export commonly used test dependencies for convenience.
#[allow(unused_imports)]
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    pub use super::configs;
    pub use super::{file_url, InstrumentedRemote, TestFixture};
}

/// Configuration YAML builders for testing.
pub mod configs {
    use super::TestFixture;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "repositories: [ { id: ";

    /// A single hosted repository stored under the fixture's storage root.
    pub fn hosted(fixture: &TestFixture) -> String {
        format!(
            "storage_root: {}\nrepositories:\n  - {{ id: releases, kind: hosted }}\n",
            fixture.storage_root().display()
        )
    }

    /// A proxy `central` of the given origin directory, a hosted `releases`
    /// and a group `public` over both.
    pub fn proxy(fixture: &TestFixture, origin: &str) -> String {
        format!(
            r#"storage_root: {root}
repositories:
  - id: releases
    kind: hosted
  - id: central
    kind: proxy
    remote_url: "{url}"
  - id: public
    kind: group
    members: [releases, central]
"#,
            root = fixture.storage_root().display(),
            url = fixture.origin_url(origin),
        )
    }
}

/// `file://` URL of a directory, with a trailing slash.
pub fn file_url(dir: &Path) -> String {
    url::Url::from_directory_path(dir)
        .expect("origin directory must be absolute")
        .to_string()
}

/// A test fixture that provides a temporary workspace.
///
/// Layout: `artifact-repo.yaml` at the root, repository content under
/// `storage/`, origins under `origins/<name>/`.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write `artifact-repo.yaml` with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child("artifact-repo.yaml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    /// Add a file to an origin directory.
    pub fn with_origin_file(self, origin: &str, path: &str, content: &str) -> Self {
        self.write_origin_file(origin, path, content);
        self
    }

    /// Add or replace a file in an origin directory.
    pub fn write_origin_file(&self, origin: &str, path: &str, content: &str) {
        self.origin_dir(origin)
            .child(path.trim_start_matches('/'))
            .write_str(content)
            .expect("Failed to write origin file");
    }

    /// Remove a file from an origin directory.
    pub fn remove_origin_file(&self, origin: &str, path: &str) {
        std::fs::remove_file(self.origin_dir(origin).path().join(path.trim_start_matches('/')))
            .expect("Failed to remove origin file");
    }

    /// Add a plain file to the workspace.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    pub fn origin_dir(&self, origin: &str) -> assert_fs::fixture::ChildPath {
        let dir = self.temp_dir.child("origins").child(origin);
        dir.create_dir_all().expect("Failed to create origin directory");
        dir
    }

    pub fn origin_url(&self, origin: &str) -> String {
        file_url(self.origin_dir(origin).path())
    }

    pub fn storage_root(&self) -> PathBuf {
        self.temp_dir.path().join("storage")
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join("artifact-repo.yaml")
    }

    /// Create a child path in the temp directory.
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    /// Create a command configured to run in this fixture's directory.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("artifact-repo");
        cmd.current_dir(self.path())
            .env_remove("ARTIFACT_REPO_CONFIG")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Create a command with the config file path argument.
    pub fn command_with_config(&self) -> assert_cmd::Command {
        let mut cmd = self.command();
        cmd.arg("--config").arg(self.config_path());
        cmd
    }
}

/// A `file://` origin that counts fetches per URL, can delay each fetch and
/// can fail the first attempts against a URL transiently.
#[derive(Default)]
pub struct InstrumentedRemote {
    inner: FileRemoteStorage,
    delay: Option<Duration>,
    failures: Mutex<HashMap<String, VecDeque<()>>>,
    calls: Mutex<Vec<String>>,
    fetches: AtomicUsize,
}

impl InstrumentedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every fetch for `delay` before reading the file.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `times` fetches of `url` with a transient error.
    pub fn fail_next(&self, url: &str, times: usize) {
        let mut failures = self.failures.lock();
        let queue = failures.entry(url.to_string()).or_default();
        queue.extend(std::iter::repeat(()).take(times));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl RemoteStorage for InstrumentedRemote {
    fn fetch(&self, url: &str, context: &FetchContext<'_>) -> Result<FetchOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(url.to_string());
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let injected = self
            .failures
            .lock()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
            .is_some();
        if injected {
            return Err(Error::RemoteTransient {
                url: url.to_string(),
                message: "503 Service Unavailable".to_string(),
            });
        }
        self.inner.fetch(url, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.path().exists());
    }

    #[test]
    fn test_fixture_origin_url_is_file_url() {
        let fixture = TestFixture::new().with_origin_file("origin", "/a/b.txt", "x");
        let url = fixture.origin_url("origin");
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("/origin/"));
        assert!(fixture.origin_dir("origin").path().join("a/b.txt").exists());
    }

    #[test]
    fn test_configs_are_valid() {
        let fixture = TestFixture::new();
        for yaml in [configs::hosted(&fixture), configs::proxy(&fixture, "origin")] {
            let config = artifact_repo::config::parse(&yaml).expect("config should parse");
            artifact_repo::config::validate(&config).expect("config should validate");
        }
    }

    #[test]
    fn test_invalid_yaml_is_actually_invalid() {
        assert!(artifact_repo::config::parse(configs::INVALID_YAML).is_err());
    }
}
