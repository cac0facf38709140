//! # Attribute storage
//!
//! Item metadata is kept apart from content so it can be rebuilt or migrated
//! without touching the bytes. Every backend has the same semantics:
//! `put_attributes` replaces the whole record (last write wins, no partial
//! updates are ever visible) and a record that cannot be decoded is reported
//! as corruption and then treated as absent.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::item::Attributes;
use crate::storage::{is_absent, write_atomic};
use crate::uid::RepositoryItemUid;

const ATTRIBUTE_SUFFIX: &str = ".attr.json";
const ITEMS_DIR: &str = "items";
const ROOT_RECORD: &str = "root.attr.json";

/// Per-item metadata storage.
pub trait AttributeManager: Send + Sync {
    /// Attributes of `uid`, or `None` if there are none (or they were unreadable).
    fn get_attributes(&self, uid: &RepositoryItemUid) -> Result<Option<Attributes>>;

    /// Replace the attributes of `uid`.
    fn put_attributes(&self, uid: &RepositoryItemUid, attributes: &Attributes) -> Result<()>;

    /// Remove the attributes of `uid`; returns whether a record existed.
    fn delete_attributes(&self, uid: &RepositoryItemUid) -> Result<bool>;
}

/// In-memory attribute storage, used for memory-backed repositories and tests.
#[derive(Debug, Default)]
pub struct MemoryAttributeManager {
    records: RwLock<HashMap<RepositoryItemUid, Attributes>>,
}

impl MemoryAttributeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl AttributeManager for MemoryAttributeManager {
    fn get_attributes(&self, uid: &RepositoryItemUid) -> Result<Option<Attributes>> {
        Ok(self.records.read().get(uid).cloned())
    }

    fn put_attributes(&self, uid: &RepositoryItemUid, attributes: &Attributes) -> Result<()> {
        self.records.write().insert(uid.clone(), attributes.clone());
        Ok(())
    }

    fn delete_attributes(&self, uid: &RepositoryItemUid) -> Result<bool> {
        Ok(self.records.write().remove(uid).is_some())
    }
}

/// Attribute storage as one JSON document per item below a root directory.
///
/// The item `/org/foo.jar` is stored at `<root>/items/org/foo.jar.attr.json`;
/// the repository root's record is `<root>/root.attr.json`, outside the item
/// tree.
/// Writes go through a sibling temporary file and an atomic rename.
#[derive(Debug, Clone)]
pub struct FsAttributeManager {
    root: PathBuf,
}

impl FsAttributeManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, uid: &RepositoryItemUid) -> PathBuf {
        let relative = uid.path().trim_start_matches('/');
        if relative.is_empty() {
            return self.root.join(ROOT_RECORD);
        }
        self.root
            .join(ITEMS_DIR)
            .join(format!("{}{}", relative, ATTRIBUTE_SUFFIX))
    }

    fn read_record(&self, uid: &RepositoryItemUid, path: &Path) -> Result<Option<Attributes>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if is_absent(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::StorageCorruption {
                uid: uid.to_string(),
                message: format!("unreadable attributes at {}: {}", path.display(), e),
            })
    }
}

impl AttributeManager for FsAttributeManager {
    fn get_attributes(&self, uid: &RepositoryItemUid) -> Result<Option<Attributes>> {
        let path = self.record_path(uid);
        match self.read_record(uid, &path) {
            Err(e @ Error::StorageCorruption { .. }) => {
                warn!("{}; treating attributes as absent", e);
                if let Err(remove_err) = fs::remove_file(&path) {
                    warn!(
                        "could not remove corrupt attributes {}: {}",
                        path.display(),
                        remove_err
                    );
                }
                Ok(None)
            }
            other => other,
        }
    }

    fn put_attributes(&self, uid: &RepositoryItemUid, attributes: &Attributes) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(attributes)?;
        write_atomic(&self.record_path(uid), &bytes)
    }

    fn delete_attributes(&self, uid: &RepositoryItemUid) -> Result<bool> {
        match fs::remove_file(self.record_path(uid)) {
            Ok(()) => Ok(true),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
