//! Integration tests for group resolution over hosted and proxy members
//! backed by the filesystem store.

mod common;

use std::sync::Arc;

use artifact_repo::config::{self, HostedConfig, ProxyConfig, RepositoryConfig};
use artifact_repo::events::RepositoryEvent;
use artifact_repo::item::StorageItem;
use artifact_repo::remote::RemoteStorage;
use artifact_repo::repository::{Repository, RepositoryRegistry};
use artifact_repo::request::ResourceStoreRequest;

use common::{configs, InstrumentedRemote, TestFixture};

fn request(path: &str) -> ResourceStoreRequest {
    ResourceStoreRequest::new(path).unwrap()
}

fn content(item: &StorageItem) -> String {
    String::from_utf8(item.as_file().unwrap().read().unwrap()).unwrap()
}

fn registry(fixture: &TestFixture, remote: Arc<InstrumentedRemote>) -> RepositoryRegistry {
    let config = config::parse(&configs::proxy(fixture, "origin")).unwrap();
    RepositoryRegistry::from_config_with(&config, |_| Ok(remote.clone() as Arc<dyn RemoteStorage>))
        .unwrap()
}

#[test]
fn test_first_member_holding_the_item_wins() {
    let fixture = TestFixture::new()
        .with_origin_file("origin", "/shared.txt", "proxied")
        .with_origin_file("origin", "/only-remote.txt", "remote");
    let remote = Arc::new(InstrumentedRemote::new());
    let registry = registry(&fixture, remote.clone());
    registry
        .store_item("releases", "/shared.txt", b"hosted".to_vec())
        .unwrap();

    let item = registry.retrieve_item("public", request("/shared.txt")).unwrap();
    assert_eq!(content(&item), "hosted");
    assert_eq!(item.uid().repository_id(), "releases");
    assert_eq!(remote.fetch_count(), 0);

    let item = registry
        .retrieve_item("public", request("/only-remote.txt"))
        .unwrap();
    assert_eq!(content(&item), "remote");
    assert_eq!(item.uid().repository_id(), "central");
}

#[test]
fn test_group_local_only_does_not_reach_origins() {
    let fixture = TestFixture::new().with_origin_file("origin", "/a.txt", "remote");
    let remote = Arc::new(InstrumentedRemote::new());
    let registry = registry(&fixture, remote.clone());

    let err = registry
        .retrieve_item("public", request("/a.txt").group_local_only(true))
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(remote.fetch_count(), 0);
}

#[test]
fn test_missing_everywhere_is_not_found_with_member_causes() {
    let fixture = TestFixture::new();
    let registry = registry(&fixture, Arc::new(InstrumentedRemote::new()));

    let err = registry.retrieve_item("public", request("/nope.txt")).unwrap_err();
    assert!(err.is_not_found());
    let message = err.to_string();
    assert!(message.contains("releases"));
    assert!(message.contains("central"));
}

#[test]
fn test_group_listing_merges_members() {
    let fixture = TestFixture::new().with_origin_file("origin", "/lib/b.jar", "b");
    let registry = registry(&fixture, Arc::new(InstrumentedRemote::new()));
    registry
        .store_item("releases", "/lib/a.jar", b"a".to_vec())
        .unwrap();
    registry.retrieve_item("central", request("/lib/b.jar")).unwrap();

    let listing = registry.list("public", request("/lib")).unwrap();
    assert_eq!(listing, vec!["a.jar".to_string(), "b.jar".to_string()]);
}

#[test]
fn test_member_removal_publishes_event_and_changes_resolution() {
    let fixture = TestFixture::new().with_origin_file("origin", "/x.txt", "proxied");
    let yaml = format!(
        r#"storage_root: {root}
repositories:
  - {{ id: releases, kind: hosted }}
  - {{ id: central, kind: proxy, remote_url: "{url}" }}
  - {{ id: public, kind: group, members: [releases, central], path_cache: true }}
"#,
        root = fixture.storage_root().display(),
        url = fixture.origin_url("origin"),
    );
    let config = config::parse(&yaml).unwrap();
    let remote = Arc::new(InstrumentedRemote::new());
    let registry = RepositoryRegistry::from_config_with(&config, |_| {
        Ok(remote.clone() as Arc<dyn RemoteStorage>)
    })
    .unwrap();
    registry.store_item("releases", "/x.txt", b"hosted".to_vec()).unwrap();
    let events = registry.events().subscribe();

    assert_eq!(
        content(&registry.retrieve_item("public", request("/x.txt")).unwrap()),
        "hosted"
    );
    assert!(registry.remove_member("public", "releases").unwrap());

    let removed: Vec<RepositoryEvent> = events.try_iter().collect();
    assert!(removed.contains(&RepositoryEvent::MemberRemoved {
        group: "public".to_string(),
        member: "releases".to_string(),
        paths: vec!["/x.txt".to_string()],
    }));
    assert_eq!(
        content(&registry.retrieve_item("public", request("/x.txt")).unwrap()),
        "proxied"
    );
}

#[test]
fn test_nested_groups_and_cycle_rejection() {
    let fixture = TestFixture::new();
    let mut config = config::parse(&configs::hosted(&fixture)).unwrap();
    config
        .repositories
        .push(RepositoryConfig::Hosted(HostedConfig {
            id: "snapshots".to_string(),
            storage: Default::default(),
        }));
    config.repositories.push(RepositoryConfig::Proxy(ProxyConfig::new(
        "central",
        &fixture.origin_url("origin"),
    )));
    let registry = RepositoryRegistry::from_config(&config).unwrap();

    registry
        .add(Repository::Group(
            registry.new_group("inner", vec!["snapshots".to_string(), "central".to_string()]),
        ))
        .unwrap();
    registry
        .add(Repository::Group(
            registry.new_group("outer", vec!["releases".to_string(), "inner".to_string()]),
        ))
        .unwrap();

    assert_eq!(
        registry.transitive_members("outer").unwrap(),
        vec!["releases", "snapshots", "central"]
    );
    assert!(registry.add_member("inner", "outer").is_err());
    assert!(registry.add_member("inner", "inner").is_err());
    assert_eq!(
        registry.list_members("inner").unwrap(),
        vec!["snapshots", "central"]
    );

    registry
        .store_item("snapshots", "/s.txt", b"snap".to_vec())
        .unwrap();
    assert_eq!(
        content(&registry.retrieve_item("outer", request("/s.txt")).unwrap()),
        "snap"
    );
}
