//! End-to-end tests for the `artifact-repo info` command.

mod common;
use common::prelude::*;

#[test]
fn test_info_help() {
    let mut cmd = cargo_bin_cmd!("artifact-repo");
    cmd.arg("info")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Show repository details"));
}

#[test]
fn test_info_all_repositories() {
    let fixture = TestFixture::new();
    let config = configs::proxy(&fixture, "origin");
    let fixture = fixture.with_config(&config);

    fixture
        .command()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("releases (hosted)"))
        .stdout(predicate::str::contains("central (proxy)"))
        .stdout(predicate::str::contains("public (group)"))
        .stdout(predicate::str::contains("members: releases, central"))
        .stdout(predicate::str::contains("retry count: 3"));
}

#[test]
fn test_info_single_repository() {
    let fixture = TestFixture::new();
    let config = configs::proxy(&fixture, "origin");
    let fixture = fixture.with_config(&config);

    fixture
        .command()
        .args(["info", "central"])
        .assert()
        .success()
        .stdout(predicate::str::contains("remote: file://"))
        .stdout(predicate::str::contains("releases (hosted)").not());
}

#[test]
fn test_info_unknown_repository() {
    let fixture = TestFixture::new();
    let config = configs::hosted(&fixture);
    let fixture = fixture.with_config(&config);

    fixture
        .command()
        .args(["info", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No repository 'nope'"));
}

#[test]
fn test_info_missing_config() {
    TestFixture::new()
        .command()
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}
