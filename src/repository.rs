//! # Repository Registry
//!
//! This module provides the `RepositoryRegistry`, the entry point through
//! which items are requested, deployed and maintained. It owns every
//! configured repository together with the state they share: the path lock
//! registry, the event bus and the access manager.
//!
//! ## Design
//!
//! Repositories come in three kinds, modelled as the variants of
//! [`Repository`] rather than as a hierarchy:
//!
//! - **`Hosted`**: local read-write storage for deployed content.
//! - **`Proxy`**: a cache of a remote origin (see [`crate::proxy`]).
//! - **`Group`**: a read-only aggregate of other repositories (see
//!   [`crate::group`]). The registry implements
//!   [`MemberAccess`](crate::group::MemberAccess), so group resolution runs
//!   as free functions over the registry.
//!
//! Access control is a trait seam: an [`AccessManager`] is consulted once,
//! at the registry entry point, for the repository the caller named.
//! Requests a group issues to its members are not authorized again. The
//! default implementation, [`DefaultAccessManager`], allows everything; tests
//! and embedding applications substitute their own.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use crate::attributes::FsAttributeManager;
use crate::config::{self, Config, ProxyConfig, RepositoryConfig, StorageBackend};
use crate::error::{Error, Result};
use crate::events::{EventBus, RepositoryEvent};
use crate::group::{self, GroupRepository, MemberAccess};
use crate::item::{now_millis, FileItem, StorageItem};
use crate::lock::PathLockRegistry;
use crate::maintenance;
use crate::path::encode_repository_id;
use crate::proxy::{ProxyMode, ProxyRepository};
use crate::remote::{DefaultRemoteStorage, RemoteStorage};
use crate::request::ResourceStoreRequest;
use crate::storage::{FsItemStore, ItemStore, MemoryItemStore};
use crate::uid::RepositoryItemUid;

/// What a caller wants to do with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Delete,
    /// Maintenance sweeps (eviction, expiry, attribute rebuild).
    Maintain,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Maintain => "maintain",
        };
        f.write_str(name)
    }
}

/// Trait for access decisions - allows substituting policies in tests
pub trait AccessManager: Send + Sync {
    /// Returns `Error::Authorization` if the caller may not perform `action`
    /// on `path` in `repository`.
    fn authorize(&self, repository: &str, path: &str, action: Action) -> Result<()>;
}

/// Allows every action.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAccessManager;

impl AccessManager for DefaultAccessManager {
    fn authorize(&self, _repository: &str, _path: &str, _action: Action) -> Result<()> {
        Ok(())
    }
}

/// A repository holding deployed content.
pub struct HostedRepository {
    id: String,
    store: Arc<dyn ItemStore>,
    locks: Arc<PathLockRegistry>,
}

impl HostedRepository {
    pub fn new(id: &str, store: Arc<dyn ItemStore>, locks: Arc<PathLockRegistry>) -> Self {
        Self {
            id: id.to_string(),
            store,
            locks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    fn uid(&self, path: &str) -> Result<RepositoryItemUid> {
        RepositoryItemUid::new(&self.id, path)
    }

    pub fn retrieve_item(&self, request: &ResourceStoreRequest) -> Result<StorageItem> {
        request.cancellation.check("retrieve")?;
        self.store.retrieve(&self.uid(request.path())?)
    }

    /// Store `content` at `path`, replacing any previous file.
    pub fn store_item(&self, path: &str, content: Vec<u8>) -> Result<()> {
        let uid = self.uid(path)?;
        if uid.is_root() {
            return Err(Error::UnsupportedOperation {
                repository: self.id.clone(),
                message: "cannot store a file at the repository root".to_string(),
            });
        }
        let _lock = self.locks.lock(&uid);
        self.store.store(&FileItem::new(uid, content))
    }

    pub fn delete_item(&self, path: &str) -> Result<bool> {
        let uid = self.uid(path)?;
        let _lock = self.locks.lock(&uid);
        self.store.delete(&uid)
    }

    pub fn list(&self, request: &ResourceStoreRequest) -> Result<Vec<String>> {
        self.store.list(&self.uid(request.path())?)
    }
}

/// A registered repository.
pub enum Repository {
    Hosted(HostedRepository),
    Proxy(ProxyRepository),
    Group(GroupRepository),
}

impl Repository {
    pub fn id(&self) -> &str {
        match self {
            Repository::Hosted(r) => r.id(),
            Repository::Proxy(r) => r.id(),
            Repository::Group(r) => r.id(),
        }
    }

    /// `hosted`, `proxy` or `group`.
    pub fn kind(&self) -> &'static str {
        match self {
            Repository::Hosted(_) => "hosted",
            Repository::Proxy(_) => "proxy",
            Repository::Group(_) => "group",
        }
    }

    pub fn as_proxy(&self) -> Option<&ProxyRepository> {
        match self {
            Repository::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupRepository> {
        match self {
            Repository::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Local storage, if the repository owns items.
    pub fn store(&self) -> Option<&Arc<dyn ItemStore>> {
        match self {
            Repository::Hosted(r) => Some(r.store()),
            Repository::Proxy(r) => Some(r.store()),
            Repository::Group(_) => None,
        }
    }
}

/// Builds the item store of a repository.
fn store_for(id: &str, backend: StorageBackend, storage_root: &Path) -> Arc<dyn ItemStore> {
    match backend {
        StorageBackend::Memory => Arc::new(MemoryItemStore::new(id)),
        StorageBackend::Filesystem => {
            let base = storage_root.join(encode_repository_id(id));
            Arc::new(FsItemStore::new(
                id,
                base.join("content"),
                Arc::new(FsAttributeManager::new(base.join("attributes"))),
            ))
        }
    }
}

fn default_remote(proxy: &ProxyConfig) -> Result<Arc<dyn RemoteStorage>> {
    Ok(Arc::new(DefaultRemoteStorage::new(
        proxy.connect_timeout(),
        proxy.read_timeout(),
    )?))
}

/// The set of repositories and the state they share.
pub struct RepositoryRegistry {
    repositories: RwLock<BTreeMap<String, Arc<Repository>>>,
    locks: Arc<PathLockRegistry>,
    events: EventBus,
    access: Arc<dyn AccessManager>,
    /// Serializes membership changes so cycle checks see a stable graph.
    membership: Mutex<()>,
}

impl Default for RepositoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self {
            repositories: RwLock::new(BTreeMap::new()),
            locks: Arc::new(PathLockRegistry::new()),
            events: EventBus::new(),
            access: Arc::new(DefaultAccessManager),
            membership: Mutex::new(()),
        }
    }

    pub fn with_access_manager(mut self, access: Arc<dyn AccessManager>) -> Self {
        self.access = access;
        self
    }

    /// Build a registry holding the repositories of a validated `config`,
    /// reaching proxy origins over HTTP(S) or `file://`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::from_config_with(config, default_remote)
    }

    /// Like [`from_config`](Self::from_config), with the remote storage of
    /// each proxy supplied by `remote_for`.
    pub fn from_config_with(
        config: &Config,
        remote_for: impl Fn(&ProxyConfig) -> Result<Arc<dyn RemoteStorage>>,
    ) -> Result<Self> {
        config::validate(config)?;
        let registry = Self::new();
        let storage_root = config.storage_root();

        for repository in &config.repositories {
            let built = match repository {
                RepositoryConfig::Hosted(hosted) => Repository::Hosted(
                    registry.new_hosted(&hosted.id, store_for(&hosted.id, hosted.storage, &storage_root)),
                ),
                RepositoryConfig::Proxy(proxy) => Repository::Proxy(
                    registry
                        .new_proxy(
                            &proxy.id,
                            &proxy.remote_url,
                            store_for(&proxy.id, proxy.storage, &storage_root),
                            remote_for(proxy)?,
                        )
                        .with_policy(proxy.policy()?)
                        .with_mirrors(proxy.mirrors.clone()),
                ),
                RepositoryConfig::Group(group) => Repository::Group(
                    registry
                        .new_group(&group.id, group.members.clone())
                        .with_path_cache(group.path_cache),
                ),
            };
            registry.add(built)?;
        }
        debug!("registry built with {} repositories", registry.ids().len());
        Ok(registry)
    }

    pub fn locks(&self) -> &Arc<PathLockRegistry> {
        &self.locks
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// A hosted repository sharing this registry's locks.
    pub fn new_hosted(&self, id: &str, store: Arc<dyn ItemStore>) -> HostedRepository {
        HostedRepository::new(id, store, self.locks.clone())
    }

    /// A proxy sharing this registry's locks and events.
    pub fn new_proxy(
        &self,
        id: &str,
        remote_url: &str,
        store: Arc<dyn ItemStore>,
        remote: Arc<dyn RemoteStorage>,
    ) -> ProxyRepository {
        ProxyRepository::new(id, remote_url, store, remote, self.locks.clone())
            .with_events(self.events.clone())
    }

    /// A group publishing on this registry's events.
    pub fn new_group(&self, id: &str, members: Vec<String>) -> GroupRepository {
        GroupRepository::new(id, members).with_events(self.events.clone())
    }

    /// Register a repository; ids are unique.
    pub fn add(&self, repository: Repository) -> Result<()> {
        let mut repositories = self.repositories.write();
        let id = repository.id().to_string();
        if repositories.contains_key(&id) {
            return Err(Error::UnsupportedOperation {
                repository: id,
                message: "a repository with this id is already registered".to_string(),
            });
        }
        info!("registered {} repository {}", repository.kind(), id);
        repositories.insert(id, Arc::new(repository));
        Ok(())
    }

    /// Unregister a repository: it leaves every group containing it and its
    /// negative cache is purged.
    pub fn remove(&self, id: &str) -> Result<Arc<Repository>> {
        let _guard = self.membership.lock();
        let removed = self
            .repositories
            .write()
            .remove(id)
            .ok_or_else(|| Error::NoSuchRepository { id: id.to_string() })?;

        let groups: Vec<Arc<Repository>> = self
            .repositories
            .read()
            .values()
            .filter(|r| r.as_group().is_some())
            .cloned()
            .collect();
        for repository in groups {
            if let Some(group) = repository.as_group() {
                group.remove_member(id);
            }
        }
        if let Some(proxy) = removed.as_proxy() {
            self.purge_proxy(proxy);
        }
        info!("removed repository {}", id);
        self.events.publish(RepositoryEvent::RepositoryRemoved {
            repository: id.to_string(),
        });
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Repository>> {
        self.repositories
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NoSuchRepository { id: id.to_string() })
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<String> {
        self.repositories.read().keys().cloned().collect()
    }

    fn authorize(&self, repository: &str, path: &str, action: Action) -> Result<()> {
        self.access.authorize(repository, path, action)
    }

    fn with_group<T>(&self, id: &str, f: impl FnOnce(&GroupRepository) -> Result<T>) -> Result<T> {
        let repository = self.get(id)?;
        match repository.as_group() {
            Some(group) => f(group),
            None => Err(Error::InvalidGrouping {
                group: id.to_string(),
                message: format!("{} is a {} repository, not a group", id, repository.kind()),
            }),
        }
    }

    fn dispatch_retrieve(&self, id: &str, request: &mut ResourceStoreRequest) -> Result<StorageItem> {
        match self.get(id)?.as_ref() {
            Repository::Hosted(hosted) => hosted.retrieve_item(request),
            Repository::Proxy(proxy) => proxy.retrieve_item(request),
            Repository::Group(group) => group::resolve(group, self, request),
        }
    }

    fn dispatch_list(&self, id: &str, request: &mut ResourceStoreRequest) -> Result<Vec<String>> {
        match self.get(id)?.as_ref() {
            Repository::Hosted(hosted) => hosted.list(request),
            Repository::Proxy(proxy) => proxy.list(request),
            Repository::Group(group) => group::list_merged(group, self, request),
        }
    }

    /// Resolve an item in repository `id`.
    pub fn retrieve_item(&self, id: &str, request: ResourceStoreRequest) -> Result<StorageItem> {
        self.authorize(id, request.path(), Action::Read)?;
        let mut request = request;
        request.mark_processed(id);
        self.dispatch_retrieve(id, &mut request)
    }

    /// Every member's item for a group, the single item otherwise.
    pub fn retrieve_items(&self, id: &str, request: ResourceStoreRequest) -> Result<Vec<StorageItem>> {
        self.authorize(id, request.path(), Action::Read)?;
        let repository = self.get(id)?;
        match repository.as_group() {
            Some(group) => group::retrieve_items(group, self, &request),
            None => Ok(vec![self.retrieve_item(id, request)?]),
        }
    }

    /// Children of a collection; for a group, the union over its members.
    pub fn list(&self, id: &str, request: ResourceStoreRequest) -> Result<Vec<String>> {
        self.authorize(id, request.path(), Action::Read)?;
        let mut request = request;
        self.dispatch_list(id, &mut request)
    }

    /// Deploy `content` to a hosted repository.
    pub fn store_item(&self, id: &str, path: &str, content: Vec<u8>) -> Result<()> {
        self.authorize(id, path, Action::Create)?;
        match self.get(id)?.as_ref() {
            Repository::Hosted(hosted) => hosted.store_item(path, content),
            other => Err(Error::UnsupportedOperation {
                repository: id.to_string(),
                message: format!("cannot deploy to a {} repository", other.kind()),
            }),
        }
    }

    /// Delete an item (or a collection with everything under it).
    pub fn delete_item(&self, id: &str, path: &str) -> Result<bool> {
        self.authorize(id, path, Action::Delete)?;
        match self.get(id)?.as_ref() {
            Repository::Hosted(hosted) => hosted.delete_item(path),
            Repository::Proxy(proxy) => proxy.delete_item(&ResourceStoreRequest::new(path)?),
            Repository::Group(_) => Err(Error::UnsupportedOperation {
                repository: id.to_string(),
                message: "groups own no items".to_string(),
            }),
        }
    }

    pub fn list_members(&self, group: &str) -> Result<Vec<String>> {
        self.with_group(group, |g| Ok(g.members()))
    }

    /// Leaf repositories reachable from `group`.
    pub fn transitive_members(&self, group: &str) -> Result<Vec<String>> {
        self.with_group(group, |_| Ok(group::transitive_members(group, self)))
    }

    /// Append `member` to `group`; returns false if it already was a member.
    pub fn add_member(&self, group: &str, member: &str) -> Result<bool> {
        let _guard = self.membership.lock();
        self.get(member)?;
        self.with_group(group, |g| {
            group::check_member(group, member, self)?;
            Ok(g.add_member(member))
        })
    }

    pub fn remove_member(&self, group: &str, member: &str) -> Result<bool> {
        let _guard = self.membership.lock();
        self.with_group(group, |g| Ok(g.remove_member(member)))
    }

    /// Replace the member list of `group`.
    pub fn set_members(&self, group: &str, members: Vec<String>) -> Result<()> {
        let _guard = self.membership.lock();
        for member in &members {
            self.get(member)?;
            group::check_member(group, member, self)?;
        }
        self.with_group(group, |g| {
            g.set_members(members);
            Ok(())
        })
    }

    /// Repositories a maintenance call on `id` applies to: the repository
    /// itself, or the leaf members of a group.
    fn maintenance_targets(&self, id: &str) -> Result<Vec<Arc<Repository>>> {
        let repository = self.get(id)?;
        if repository.as_group().is_none() {
            return Ok(vec![repository]);
        }
        let mut targets = Vec::new();
        for member in group::transitive_members(id, self) {
            match self.get(&member) {
                Ok(target) => targets.push(target),
                Err(_) => warn!("group {} references missing member {}", id, member),
            }
        }
        Ok(targets)
    }

    fn evict_proxy(&self, proxy: &ProxyRepository, cutoff: i64) -> Result<Vec<RepositoryItemUid>> {
        let paths = maintenance::sweep_unused(
            proxy.store().as_ref(),
            proxy.locks(),
            ResourceStoreRequest::new("/")?,
            cutoff,
        )?;
        if !paths.is_empty() {
            self.events.publish(RepositoryEvent::UnusedItemsEvicted {
                repository: proxy.id().to_string(),
                paths: paths.clone(),
            });
        }
        paths
            .iter()
            .map(|path| RepositoryItemUid::new(proxy.id(), path))
            .collect()
    }

    /// Delete proxied items not requested within `older_than`, in one
    /// repository (a group means its proxy members) or in every proxy.
    pub fn evict_unused_items(
        &self,
        older_than: Duration,
        repository: Option<&str>,
    ) -> Result<Vec<RepositoryItemUid>> {
        let age = i64::try_from(older_than.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_millis().saturating_sub(age);
        let targets = match repository {
            Some(id) => {
                self.authorize(id, "/", Action::Maintain)?;
                self.maintenance_targets(id)?
            }
            None => self.repositories.read().values().cloned().collect(),
        };

        let proxies: Vec<&ProxyRepository> = targets.iter().filter_map(|r| r.as_proxy()).collect();
        let evicted = proxies
            .par_iter()
            .map(|proxy| self.evict_proxy(proxy, cutoff))
            .collect::<Result<Vec<_>>>()?;
        let evicted: Vec<RepositoryItemUid> = evicted.into_iter().flatten().collect();
        info!(
            "evicted {} items unused for {}s from {} proxies",
            evicted.len(),
            older_than.as_secs(),
            proxies.len()
        );
        Ok(evicted)
    }

    /// Recompute content-derived attributes of every stored file.
    pub fn rebuild_attributes(&self, id: &str) -> Result<usize> {
        self.authorize(id, "/", Action::Maintain)?;
        let mut rebuilt = 0;
        for target in self.maintenance_targets(id)? {
            if let Some(store) = target.store() {
                rebuilt += maintenance::sweep_rebuild(
                    store.as_ref(),
                    &self.locks,
                    ResourceStoreRequest::new("/")?,
                )?;
            }
        }
        Ok(rebuilt)
    }

    fn purge_proxy(&self, proxy: &ProxyRepository) -> usize {
        let entries = proxy.not_found_cache().purge();
        self.events.publish(RepositoryEvent::NotFoundCachePurged {
            repository: proxy.id().to_string(),
            entries,
        });
        entries
    }

    /// Drop every negative-cache entry; returns how many were dropped.
    pub fn purge_not_found_cache(&self, id: &str) -> Result<usize> {
        self.authorize(id, "/", Action::Maintain)?;
        Ok(self
            .maintenance_targets(id)?
            .iter()
            .filter_map(|r| r.as_proxy())
            .map(|proxy| self.purge_proxy(proxy))
            .sum())
    }

    /// Mark proxied files under `path` expired and forget confirmed absences
    /// under it; returns how many files were expired.
    pub fn expire_caches(&self, id: &str, path: &str) -> Result<usize> {
        self.authorize(id, path, Action::Maintain)?;
        let request = ResourceStoreRequest::new(path)?;
        let mut expired = 0;
        for target in self.maintenance_targets(id)? {
            let Some(proxy) = target.as_proxy() else {
                continue;
            };
            let items =
                maintenance::sweep_expire(proxy.store().as_ref(), proxy.locks(), request.clone())?;
            proxy.not_found_cache().purge_under(request.path());
            self.events.publish(RepositoryEvent::CachesExpired {
                repository: proxy.id().to_string(),
                path: request.path().to_string(),
                items,
            });
            expired += items;
        }
        Ok(expired)
    }

    /// Operator change of a proxy's mode.
    pub fn set_proxy_mode(&self, id: &str, mode: ProxyMode) -> Result<()> {
        self.authorize(id, "/", Action::Maintain)?;
        match self.get(id)?.as_proxy() {
            Some(proxy) => {
                proxy.set_proxy_mode(mode);
                Ok(())
            }
            None => Err(Error::UnsupportedOperation {
                repository: id.to_string(),
                message: "only proxies have a proxy mode".to_string(),
            }),
        }
    }
}

impl MemberAccess for RepositoryRegistry {
    fn retrieve_member(
        &self,
        member: &str,
        request: &mut ResourceStoreRequest,
    ) -> Result<StorageItem> {
        request.mark_processed(member);
        self.dispatch_retrieve(member, request)
    }

    fn list_member(&self, member: &str, request: &mut ResourceStoreRequest) -> Result<Vec<String>> {
        request.mark_processed(member);
        self.dispatch_list(member, request)
    }

    fn group_members(&self, id: &str) -> Option<Vec<String>> {
        self.get(id).ok().and_then(|r| r.as_group().map(|g| g.members()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{FetchContext, FetchOutcome, RemoteContent};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Origin serving a fixed set of paths.
    #[derive(Default)]
    struct MapRemote {
        items: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
    }

    impl MapRemote {
        fn with(items: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                items: items
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl RemoteStorage for MapRemote {
        fn fetch(&self, url: &str, _context: &FetchContext<'_>) -> Result<FetchOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .items
                .iter()
                .find(|(path, _)| url.ends_with(path.as_str()))
                .map(|(_, content)| FetchOutcome::Found(RemoteContent::new(content.clone())))
                .unwrap_or(FetchOutcome::NotFound))
        }
    }

    struct DenyAll;

    impl AccessManager for DenyAll {
        fn authorize(&self, repository: &str, path: &str, action: Action) -> Result<()> {
            Err(Error::Authorization {
                repository: repository.to_string(),
                path: path.to_string(),
                action: action.to_string(),
            })
        }
    }

    fn request(path: &str) -> ResourceStoreRequest {
        ResourceStoreRequest::new(path).unwrap()
    }

    fn content(item: &StorageItem) -> Vec<u8> {
        item.as_file().unwrap().read().unwrap()
    }

    /// releases (hosted), central (proxy), public = [releases, central]
    fn registry(remote: Arc<MapRemote>) -> RepositoryRegistry {
        let registry = RepositoryRegistry::new();
        let hosted = registry.new_hosted("releases", Arc::new(MemoryItemStore::new("releases")));
        let proxy = registry.new_proxy(
            "central",
            "https://repo.example.org/",
            Arc::new(MemoryItemStore::new("central")),
            remote,
        );
        let group = registry.new_group("public", vec!["releases".to_string(), "central".to_string()]);
        registry.add(Repository::Hosted(hosted)).unwrap();
        registry.add(Repository::Proxy(proxy)).unwrap();
        registry.add(Repository::Group(group)).unwrap();
        registry
    }

    #[test]
    fn test_deploy_and_retrieve_hosted() {
        let registry = registry(MapRemote::with(&[]));
        registry.store_item("releases", "/a/1.0/a.jar", b"jar".to_vec()).unwrap();

        let item = registry.retrieve_item("releases", request("/a/1.0/a.jar")).unwrap();
        assert_eq!(content(&item), b"jar");
        assert_eq!(registry.list("releases", request("/a")).unwrap(), vec!["1.0"]);
        assert!(registry.delete_item("releases", "/a").unwrap());
        assert!(registry
            .retrieve_item("releases", request("/a/1.0/a.jar"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_deploy_to_proxy_or_group_is_unsupported() {
        let registry = registry(MapRemote::with(&[]));
        for id in ["central", "public"] {
            match registry.store_item(id, "/x.jar", Vec::new()) {
                Err(Error::UnsupportedOperation { repository, .. }) => assert_eq!(repository, id),
                other => panic!("Expected UnsupportedOperation, got {:?}", other),
            }
        }
        assert!(matches!(
            registry.store_item("nope", "/x.jar", Vec::new()),
            Err(Error::NoSuchRepository { .. })
        ));
    }

    #[test]
    fn test_group_first_match_and_member_removal() {
        let remote = MapRemote::with(&[("/b.jar", "from central")]);
        let registry = registry(remote.clone());
        let events = registry.events().subscribe();

        let item = registry.retrieve_item("public", request("/b.jar")).unwrap();
        assert_eq!(content(&item), b"from central");
        assert_eq!(item.uid().repository_id(), "central");

        assert!(registry.remove_member("public", "central").unwrap());
        let err = registry.retrieve_item("public", request("/b.jar")).unwrap_err();
        assert!(err.is_not_found());

        let removed: Vec<_> = events
            .try_iter()
            .filter(|e| matches!(e, RepositoryEvent::MemberRemoved { .. }))
            .collect();
        assert_eq!(
            removed,
            vec![RepositoryEvent::MemberRemoved {
                group: "public".to_string(),
                member: "central".to_string(),
                paths: Vec::new(),
            }]
        );
    }

    #[test]
    fn test_group_listing_merges_members() {
        let registry = registry(MapRemote::with(&[("/org/c.jar", "c")]));
        registry.store_item("releases", "/org/a.jar", b"a".to_vec()).unwrap();
        registry.retrieve_item("central", request("/org/c.jar")).unwrap();

        assert_eq!(registry.list("public", request("/org")).unwrap(), vec!["a.jar", "c.jar"]);

        let items = registry.retrieve_items("public", request("/org")).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(StorageItem::is_collection));
    }

    #[test]
    fn test_membership_validation() {
        let registry = registry(MapRemote::with(&[]));
        registry
            .add(Repository::Group(registry.new_group("all", vec!["public".to_string()])))
            .unwrap();

        assert!(matches!(
            registry.add_member("public", "all"),
            Err(Error::InvalidGrouping { .. })
        ));
        assert!(matches!(
            registry.add_member("public", "public"),
            Err(Error::InvalidGrouping { .. })
        ));
        assert!(matches!(
            registry.add_member("public", "ghost"),
            Err(Error::NoSuchRepository { .. })
        ));
        assert!(matches!(
            registry.add_member("releases", "central"),
            Err(Error::InvalidGrouping { .. })
        ));
        assert!(!registry.add_member("public", "central").unwrap());
        assert_eq!(registry.transitive_members("all").unwrap(), vec!["releases", "central"]);
    }

    #[test]
    fn test_remove_repository_leaves_groups() {
        let registry = registry(MapRemote::with(&[]));
        let events = registry.events().subscribe();

        registry.remove("central").unwrap();

        assert_eq!(registry.list_members("public").unwrap(), vec!["releases"]);
        assert!(registry.get("central").is_err());
        let events: Vec<_> = events.try_iter().collect();
        assert!(events.contains(&RepositoryEvent::RepositoryRemoved {
            repository: "central".to_string()
        }));
        assert!(matches!(registry.remove("central"), Err(Error::NoSuchRepository { .. })));
    }

    #[test]
    fn test_authorization_checked_at_entry_point() {
        let registry = registry(MapRemote::with(&[])).with_access_manager(Arc::new(DenyAll));
        match registry.retrieve_item("public", request("/a.jar")) {
            Err(Error::Authorization { action, .. }) => assert_eq!(action, "read"),
            other => panic!("Expected Authorization, got {:?}", other),
        }
        assert!(matches!(
            registry.evict_unused_items(Duration::ZERO, Some("central")),
            Err(Error::Authorization { .. })
        ));
    }

    #[test]
    fn test_maintenance_through_group_reaches_proxies() {
        let remote = MapRemote::with(&[("/a.jar", "a"), ("/b.jar", "b")]);
        let registry = registry(remote.clone());
        registry.retrieve_item("public", request("/a.jar")).unwrap();
        registry.retrieve_item("public", request("/b.jar")).unwrap();
        registry.store_item("releases", "/r.jar", b"r".to_vec()).unwrap();
        assert!(registry.retrieve_item("central", request("/missing.jar")).is_err());
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);

        assert_eq!(registry.expire_caches("public", "/").unwrap(), 2);
        assert_eq!(registry.purge_not_found_cache("public").unwrap(), 0);
        registry.retrieve_item("central", request("/a.jar")).unwrap();
        assert_eq!(remote.calls.load(Ordering::SeqCst), 4);

        assert_eq!(registry.rebuild_attributes("public").unwrap(), 3);

        std::thread::sleep(Duration::from_millis(5));
        let evicted = registry.evict_unused_items(Duration::ZERO, None).unwrap();
        let mut evicted: Vec<String> = evicted.iter().map(|uid| uid.to_string()).collect();
        evicted.sort();
        assert_eq!(evicted, vec!["central:/a.jar", "central:/b.jar"]);
        assert!(registry.retrieve_item("releases", request("/r.jar")).is_ok());
    }

    #[test]
    fn test_proxy_mode_only_on_proxies() {
        let registry = registry(MapRemote::with(&[("/a.jar", "a")]));
        registry.set_proxy_mode("central", ProxyMode::BlockedManual).unwrap();
        assert!(registry.retrieve_item("central", request("/a.jar")).unwrap_err().is_not_found());
        assert!(registry.set_proxy_mode("public", ProxyMode::Allow).is_err());
    }

    #[test]
    fn test_from_config_builds_repositories() {
        let yaml = r#"
repositories:
  - id: releases
    kind: hosted
    storage: memory
  - id: central
    kind: proxy
    remote_url: https://repo.example.org/
    storage: memory
    retry_count: 1
  - id: public
    kind: group
    members: [releases, central]
"#;
        let config = config::parse(yaml).unwrap();
        let remote = MapRemote::with(&[("/x.pom", "pom")]);
        let shared: Arc<dyn RemoteStorage> = remote.clone();
        let registry = RepositoryRegistry::from_config_with(&config, |_| Ok(shared.clone())).unwrap();

        assert_eq!(registry.ids(), vec!["central", "public", "releases"]);
        assert_eq!(registry.get("central").unwrap().as_proxy().unwrap().policy().retry_count, 1);
        let item = registry.retrieve_item("public", request("/x.pom")).unwrap();
        assert_eq!(content(&item), b"pom");
    }
}
