//! # Artifact Repository Library
//!
//! This library provides the content-resolution core of an artifact
//! repository manager: local storage of items, proxying and caching of remote
//! origins, and aggregation of several repositories behind a group. It is
//! designed to be used by the `artifact-repo` command-line tool but can also
//! be embedded by a server that maps its requests onto
//! [`repository::RepositoryRegistry`].
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use artifact_repo::repository::{Repository, RepositoryRegistry};
//! use artifact_repo::request::ResourceStoreRequest;
//! use artifact_repo::storage::MemoryItemStore;
//!
//! let registry = RepositoryRegistry::new();
//! let releases = registry.new_hosted("releases", Arc::new(MemoryItemStore::new("releases")));
//! registry.add(Repository::Hosted(releases)).unwrap();
//! let public = registry.new_group("public", vec!["releases".to_string()]);
//! registry.add(Repository::Group(public)).unwrap();
//!
//! registry.store_item("releases", "/org/a/1.0/a-1.0.jar", b"jar".to_vec()).unwrap();
//!
//! let request = ResourceStoreRequest::new("/org/a/1.0/a-1.0.jar").unwrap();
//! let item = registry.retrieve_item("public", request).unwrap();
//! assert_eq!(item.as_file().unwrap().read().unwrap(), b"jar");
//! ```
//!
//! ## Core Concepts
//!
//! - **Items (`uid`, `item`)**: An item is addressed by a
//!   [`uid::RepositoryItemUid`], a repository id plus a normalized path, and
//!   is either a file (content plus attributes) or a collection.
//! - **Storage (`storage`, `attributes`)**: An [`storage::ItemStore`] keeps
//!   the items of one repository; attributes are kept separately by an
//!   [`attributes::AttributeManager`] so they can be rebuilt from content.
//! - **Locking (`lock`)**: [`lock::PathLockRegistry`] serializes work on one
//!   UID across threads, so a proxy fetches each item at most once at a time.
//! - **Proxies (`proxy`, `remote`, `nfc`)**: A proxy serves fresh local
//!   copies, fetches missing or stale ones from its mirrors and origin, and
//!   remembers confirmed absences for a while.
//! - **Groups (`group`)**: A group answers from the first member that has an
//!   item and merges member listings.
//! - **Walking (`walker`, `maintenance`)**: Maintenance sweeps (eviction,
//!   expiry, attribute rebuild) are walker processors.
//! - **Configuration (`config`, `defaults`)**: Repositories are described in
//!   a YAML file.

pub mod attributes;
pub mod config;
pub mod defaults;
pub mod error;
pub mod events;
pub mod group;
pub mod item;
pub mod lock;
pub mod maintenance;
pub mod nfc;
pub mod output;
pub mod path;
pub mod proxy;
pub mod remote;
pub mod repository;
pub mod request;
pub mod storage;
pub mod uid;
pub mod walker;

#[cfg(test)]
mod path_proptest;
