//! # Maintenance sweeps
//!
//! Walker processors behind the maintenance entry points of the registry:
//!
//! - [`EvictUnusedItemsProcessor`] deletes cached files not requested since
//!   a cutoff and removes the collections left empty.
//! - [`ExpireCacheProcessor`] flags files as expired so the next request
//!   revalidates them against the origin.
//! - [`RebuildAttributesProcessor`] recomputes content-derived attributes
//!   (length, digest, MIME type) from the stored bytes, keeping timestamps.
//!
//! Each processor takes the path lock of the item it changes, so a sweep
//! never races a fetch of the same item. The `sweep_*` helpers wire a
//! processor into a walk with the right filter.

use log::{debug, info, warn};

use crate::error::Result;
use crate::item::{CollectionItem, FileItem, StorageItem};
use crate::lock::PathLockRegistry;
use crate::request::ResourceStoreRequest;
use crate::storage::ItemStore;
use crate::walker::{DotFileFilter, WalkScope, Walker, WalkerContext, WalkerProcessor};

/// Deletes files whose `last_requested` is older than a cutoff.
pub struct EvictUnusedItemsProcessor<'a> {
    store: &'a dyn ItemStore,
    locks: &'a PathLockRegistry,
    cutoff: i64,
    evicted: Vec<String>,
}

impl<'a> EvictUnusedItemsProcessor<'a> {
    /// `cutoff` is a timestamp in milliseconds; items requested at or after
    /// it are kept.
    pub fn new(store: &'a dyn ItemStore, locks: &'a PathLockRegistry, cutoff: i64) -> Self {
        Self {
            store,
            locks,
            cutoff,
            evicted: Vec::new(),
        }
    }

    /// Paths deleted so far, in visit order.
    pub fn evicted(&self) -> &[String] {
        &self.evicted
    }

    pub fn into_evicted(self) -> Vec<String> {
        self.evicted
    }
}

impl WalkerProcessor for EvictUnusedItemsProcessor<'_> {
    fn process_item(&mut self, _scope: &WalkScope, item: &FileItem) -> Result<()> {
        let _lock = self.locks.lock(&item.uid);
        // re-read under the lock; a concurrent request may have touched it
        let current = match self.store.peek(&item.uid) {
            Ok(StorageItem::File(file)) => file,
            Ok(StorageItem::Collection(_)) => return Ok(()),
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        if current.attributes.last_requested < self.cutoff && self.store.delete(&item.uid)? {
            debug!("evicted {}", item.uid);
            self.evicted.push(item.uid.path().to_string());
        }
        Ok(())
    }

    fn on_collection_exit(&mut self, _scope: &WalkScope, collection: &CollectionItem) -> Result<()> {
        if collection.uid.is_root() {
            return Ok(());
        }
        let _lock = self.locks.lock(&collection.uid);
        match self.store.list(&collection.uid) {
            Ok(children) if children.is_empty() => {
                self.store.delete(&collection.uid)?;
                debug!("removed empty collection {}", collection.uid);
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// Marks every visited file as expired.
pub struct ExpireCacheProcessor<'a> {
    store: &'a dyn ItemStore,
    locks: &'a PathLockRegistry,
    expired: usize,
}

impl<'a> ExpireCacheProcessor<'a> {
    pub fn new(store: &'a dyn ItemStore, locks: &'a PathLockRegistry) -> Self {
        Self {
            store,
            locks,
            expired: 0,
        }
    }

    pub fn expired(&self) -> usize {
        self.expired
    }
}

impl WalkerProcessor for ExpireCacheProcessor<'_> {
    fn process_item(&mut self, _scope: &WalkScope, item: &FileItem) -> Result<()> {
        let _lock = self.locks.lock(&item.uid);
        let mut attributes = match self.store.peek(&item.uid) {
            Ok(StorageItem::File(file)) => file.attributes,
            Ok(StorageItem::Collection(_)) => return Ok(()),
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        if !attributes.expired {
            attributes.expired = true;
            self.store.update_attributes(&item.uid, &attributes)?;
        }
        self.expired += 1;
        Ok(())
    }
}

/// Recomputes length, digest and MIME type of every visited file from its
/// stored content.
pub struct RebuildAttributesProcessor<'a> {
    store: &'a dyn ItemStore,
    locks: &'a PathLockRegistry,
    rebuilt: usize,
    failed: usize,
}

impl<'a> RebuildAttributesProcessor<'a> {
    pub fn new(store: &'a dyn ItemStore, locks: &'a PathLockRegistry) -> Self {
        Self {
            store,
            locks,
            rebuilt: 0,
            failed: 0,
        }
    }

    pub fn rebuilt(&self) -> usize {
        self.rebuilt
    }

    /// Files whose content could not be read; they are left untouched.
    pub fn failed(&self) -> usize {
        self.failed
    }
}

impl WalkerProcessor for RebuildAttributesProcessor<'_> {
    fn process_item(&mut self, _scope: &WalkScope, item: &FileItem) -> Result<()> {
        let _lock = self.locks.lock(&item.uid);
        let content = match item.read() {
            Ok(content) => content,
            Err(e) => {
                warn!("cannot read {} to rebuild attributes: {}", item.uid, e);
                self.failed += 1;
                return Ok(());
            }
        };
        let mut attributes = item.attributes.clone();
        attributes.length = None;
        attributes.sha256 = None;
        attributes.mime_type = None;
        attributes.describe_content(item.uid.path(), &content);
        self.store.update_attributes(&item.uid, &attributes)?;
        self.rebuilt += 1;
        Ok(())
    }
}

fn walk_with(
    store: &dyn ItemStore,
    request: ResourceStoreRequest,
    processor: &mut dyn WalkerProcessor,
) -> Result<()> {
    let mut context = WalkerContext::new(store.repository_id(), request)
        .with_filter(DotFileFilter)
        .with_processor(processor);
    match Walker::new().walk(store, &mut context) {
        Ok(_) => Ok(()),
        // nothing stored under the path
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Evict files under the request path not requested since `cutoff`.
pub fn sweep_unused(
    store: &dyn ItemStore,
    locks: &PathLockRegistry,
    request: ResourceStoreRequest,
    cutoff: i64,
) -> Result<Vec<String>> {
    let mut processor = EvictUnusedItemsProcessor::new(store, locks, cutoff);
    walk_with(store, request, &mut processor)?;
    info!(
        "evicted {} unused items from {}",
        processor.evicted().len(),
        store.repository_id()
    );
    Ok(processor.into_evicted())
}

/// Expire every file under the request path; returns how many were visited.
pub fn sweep_expire(
    store: &dyn ItemStore,
    locks: &PathLockRegistry,
    request: ResourceStoreRequest,
) -> Result<usize> {
    let mut processor = ExpireCacheProcessor::new(store, locks);
    walk_with(store, request, &mut processor)?;
    info!("expired {} items in {}", processor.expired(), store.repository_id());
    Ok(processor.expired())
}

/// Rebuild attributes of every file under the request path.
pub fn sweep_rebuild(
    store: &dyn ItemStore,
    locks: &PathLockRegistry,
    request: ResourceStoreRequest,
) -> Result<usize> {
    let mut processor = RebuildAttributesProcessor::new(store, locks);
    walk_with(store, request, &mut processor)?;
    info!(
        "rebuilt attributes of {} items in {} ({} unreadable)",
        processor.rebuilt(),
        store.repository_id(),
        processor.failed()
    );
    Ok(processor.rebuilt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::now_millis;
    use crate::storage::{FsItemStore, MemoryItemStore};
    use crate::attributes::FsAttributeManager;
    use crate::uid::RepositoryItemUid;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn uid(path: &str) -> RepositoryItemUid {
        RepositoryItemUid::new("cache", path).unwrap()
    }

    fn put(store: &dyn ItemStore, path: &str, last_requested: i64) {
        store.store(&FileItem::new(uid(path), b"content".to_vec())).unwrap();
        let mut attributes = store.peek(&uid(path)).unwrap().attributes().clone();
        attributes.last_requested = last_requested;
        store.update_attributes(&uid(path), &attributes).unwrap();
    }

    fn root() -> ResourceStoreRequest {
        ResourceStoreRequest::new("/").unwrap()
    }

    #[test]
    fn test_evict_respects_cutoff() {
        let store = MemoryItemStore::new("cache");
        let locks = PathLockRegistry::new();
        let cutoff = now_millis() - 60_000;
        put(&store, "/keep/a.jar", cutoff);
        put(&store, "/keep/b.jar", cutoff + 1);
        put(&store, "/old/c.jar", cutoff - 1);
        put(&store, "/old/d.jar", cutoff - 1000);

        let evicted = sweep_unused(&store, &locks, root(), cutoff).unwrap();

        assert_eq!(evicted, vec!["/old/c.jar", "/old/d.jar"]);
        assert!(store.contains(&uid("/keep/a.jar")));
        assert!(store.contains(&uid("/keep/b.jar")));
        assert!(!store.contains(&uid("/old")));
        assert_eq!(locks.lock_count(), 0);
    }

    #[test]
    fn test_evict_skips_hidden_paths() {
        let store = MemoryItemStore::new("cache");
        let locks = PathLockRegistry::new();
        put(&store, "/.meta/index", 0);
        put(&store, "/a.jar", 0);

        let evicted = sweep_unused(&store, &locks, root(), now_millis()).unwrap();

        assert_eq!(evicted, vec!["/a.jar"]);
        assert!(store.contains(&uid("/.meta/index")));
    }

    #[test]
    fn test_evict_removes_empty_directories_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = FsItemStore::new(
            "cache",
            dir.path().join("content"),
            Arc::new(FsAttributeManager::new(dir.path().join("attributes"))),
        );
        let locks = PathLockRegistry::new();
        put(&store, "/org/x/1.0/x.jar", 0);
        put(&store, "/org/y/y.jar", now_millis());

        let evicted = sweep_unused(&store, &locks, root(), now_millis() - 1000).unwrap();

        assert_eq!(evicted, vec!["/org/x/1.0/x.jar"]);
        assert!(!dir.path().join("content/org/x").exists());
        assert!(dir.path().join("content/org/y/y.jar").exists());
    }

    #[test]
    fn test_evict_on_empty_store_is_noop() {
        let store = MemoryItemStore::new("cache");
        let locks = PathLockRegistry::new();
        let request = ResourceStoreRequest::new("/missing").unwrap();
        assert!(sweep_unused(&store, &locks, request, now_millis()).unwrap().is_empty());
    }

    #[test]
    fn test_expire_flags_items_under_path() {
        let store = MemoryItemStore::new("cache");
        let locks = PathLockRegistry::new();
        put(&store, "/a/1.jar", 0);
        put(&store, "/a/2.jar", 0);
        put(&store, "/b/3.jar", 0);

        let count = sweep_expire(&store, &locks, ResourceStoreRequest::new("/a").unwrap()).unwrap();

        assert_eq!(count, 2);
        assert!(store.peek(&uid("/a/1.jar")).unwrap().attributes().expired);
        assert!(store.peek(&uid("/a/2.jar")).unwrap().attributes().expired);
        assert!(!store.peek(&uid("/b/3.jar")).unwrap().attributes().expired);
    }

    #[test]
    fn test_rebuild_recomputes_content_fields_and_keeps_timestamps() {
        let store = MemoryItemStore::new("cache");
        let locks = PathLockRegistry::new();
        put(&store, "/a/1.pom", 42);
        let mut broken = store.peek(&uid("/a/1.pom")).unwrap().attributes().clone();
        broken.sha256 = Some("bogus".to_string());
        broken.length = Some(1);
        broken.mime_type = Some("text/plain".to_string());
        store.update_attributes(&uid("/a/1.pom"), &broken).unwrap();

        assert_eq!(sweep_rebuild(&store, &locks, root()).unwrap(), 1);

        let rebuilt = store.peek(&uid("/a/1.pom")).unwrap().attributes().clone();
        assert_eq!(rebuilt.length, Some(7));
        assert_eq!(rebuilt.sha256, Some(crate::item::sha256_hex(b"content")));
        assert_eq!(rebuilt.mime_type.as_deref(), Some(crate::item::guess_mime_type("/a/1.pom")));
        assert_eq!(rebuilt.created, broken.created);
        assert_eq!(rebuilt.last_requested, 42);
    }
}
